//! Score rendering and parsing using the Dutch decimal comma.

/// Render a score with one decimal digit and a comma separator.
///
/// Rounds half away from zero, so `7.25` becomes `"7,3"`. Missing and
/// non-finite values render as an empty string.
pub fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let mut rounded = (v * 10.0).round() / 10.0;
            if rounded == 0.0 {
                // collapse -0.0
                rounded = 0.0;
            }
            format!("{rounded:.1}").replace('.', ",")
        }
        _ => String::new(),
    }
}

/// Parse a score typed as text, accepting either `,` or `.` as separator.
///
/// Blank input yields `Ok(None)`.
pub fn parse_score(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.replace(',', ".").parse::<f64>().map(Some)
}
