//! WordprocessingML operations on a parsed part: tables, cells, paragraphs
//! and `{{ key }}` placeholders.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::xml::{XmlDocument, XmlElement, XmlNode};
use super::TemplateError;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"))
}

/// A parsed WordprocessingML part (`document.xml`, headers, footers).
#[derive(Debug, Clone)]
pub struct WordDocument {
    xml: XmlDocument,
}

impl WordDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        Ok(Self {
            xml: XmlDocument::parse(bytes)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        self.xml.to_bytes()
    }

    fn body(&self) -> Option<&XmlElement> {
        self.xml.root().child("body")
    }

    /// Body-level tables in document order.
    pub fn tables(&self) -> Vec<&XmlElement> {
        self.body()
            .map(|body| body.elements().filter(|el| el.is("tbl")).collect())
            .unwrap_or_default()
    }

    /// Number of grid cells per row for every body-level table.
    pub fn table_shapes(&self) -> Vec<Vec<usize>> {
        self.tables()
            .into_iter()
            .map(|tbl| rows(tbl).map(|tr| grid_cells(tr).len()).collect())
            .collect()
    }

    /// Text of a cell: its paragraphs joined with newlines.
    pub fn cell_text(&self, table: usize, row: usize, col: usize) -> Option<String> {
        let tbl = *self.tables().get(table)?;
        let tr = rows(tbl).nth(row)?;
        let tc = *grid_cells(tr).get(col)?;
        Some(cell_text(tc))
    }

    /// Replace the content of a cell with `text` in a single paragraph.
    pub fn set_cell_text(
        &mut self,
        table: usize,
        row: usize,
        col: usize,
        text: &str,
    ) -> Result<(), TemplateError> {
        let missing = || TemplateError::MissingCell { table, row, col };
        let body = self
            .xml
            .root_mut()
            .elements_mut()
            .find(|el| el.is("body"))
            .ok_or_else(missing)?;
        let tbl = body
            .elements_mut()
            .filter(|el| el.is("tbl"))
            .nth(table)
            .ok_or_else(missing)?;
        let tr = tbl
            .elements_mut()
            .filter(|el| el.is("tr"))
            .nth(row)
            .ok_or_else(missing)?;
        let index = {
            let row_ref: &XmlElement = tr;
            grid_cells(row_ref)
                .get(col)
                .and_then(|tc| position_of(row_ref, tc))
                .ok_or_else(missing)?
        };
        let tc = tr.elements_mut().nth(index).ok_or_else(missing)?;
        replace_cell_content(tc, text);
        Ok(())
    }

    /// Placeholder keys present anywhere in the part.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let mut paragraphs = Vec::new();
        self.xml.root().descendants("p", &mut paragraphs);
        paragraphs
            .into_iter()
            .flat_map(|p| {
                placeholder_pattern()
                    .captures_iter(&marker_text(p))
                    .map(|caps| caps[1].to_string())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Replace every `{{ key }}` marker using `lookup`. Returns the number of
    /// markers replaced; unknown keys are an error.
    ///
    /// Only the `w:t` nodes a marker covers are edited: the value goes into
    /// the first of them and the rest of the marker is cut from the others.
    /// Fields, drawings, hyperlinks and bookmarks stay where they are.
    pub fn replace_placeholders<'a>(
        &mut self,
        lookup: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<usize, TemplateError> {
        let mut replaced = 0;
        self.xml
            .root_mut()
            .for_each_mut("p", &mut |p: &mut XmlElement| {
                let mut nodes = Vec::new();
                text_nodes_mut(p, &mut nodes);
                let texts: Vec<String> = nodes.iter().map(|t| t.text()).collect();
                let flat = texts.concat();

                let mut markers = Vec::new();
                let mut unknown = Vec::new();
                for caps in placeholder_pattern().captures_iter(&flat) {
                    let Some(whole) = caps.get(0) else { continue };
                    match lookup(&caps[1]) {
                        Some(value) => markers.push((whole.start(), whole.end(), value)),
                        None => unknown.push(caps[1].to_string()),
                    }
                }
                if !unknown.is_empty() {
                    return Err(TemplateError::UnknownPlaceholders(unknown));
                }
                if markers.is_empty() {
                    return Ok(());
                }

                let mut start = 0;
                for (node, text) in nodes.into_iter().zip(&texts) {
                    let end = start + text.len();
                    let edited = splice_markers(&flat, start, end, &markers);
                    if edited != *text {
                        set_text(node, edited);
                    }
                    start = end;
                }
                replaced += markers.len();
                Ok(())
            })?;
        Ok(replaced)
    }
}

fn rows(tbl: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    tbl.elements().filter(|el| el.is("tr"))
}

/// Cells of a row indexed by grid column: a cell with `w:gridSpan = n`
/// occupies `n` consecutive slots.
fn grid_cells(tr: &XmlElement) -> Vec<&XmlElement> {
    let mut cells = Vec::new();
    for tc in tr.elements().filter(|el| el.is("tc")) {
        let span = tc
            .child("tcPr")
            .and_then(|pr| pr.child("gridSpan"))
            .and_then(|gs| gs.attribute("val"))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        cells.extend(std::iter::repeat(tc).take(span));
    }
    cells
}

/// Index of `tc` among the element children of `tr`.
fn position_of(tr: &XmlElement, tc: &XmlElement) -> Option<usize> {
    tr.elements().position(|el| std::ptr::eq(el, tc))
}

fn cell_text(tc: &XmlElement) -> String {
    tc.elements()
        .filter(|el| el.is("p"))
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of a paragraph as the reader sees it. Only run content counts, so
/// tab-stop definitions inside `w:pPr` are ignored.
pub(crate) fn paragraph_text(p: &XmlElement) -> String {
    let mut out = String::new();
    collect_run_text(p, &mut out);
    out
}

fn collect_run_text(el: &XmlElement, out: &mut String) {
    for child in el.elements() {
        match child.local_name() {
            "pPr" | "rPr" => {}
            "r" => {
                for part in child.elements() {
                    match part.local_name() {
                        "t" => out.push_str(&part.text()),
                        "tab" => out.push('\t'),
                        "br" | "cr" => out.push('\n'),
                        _ => {}
                    }
                }
            }
            _ => collect_run_text(child, out),
        }
    }
}

/// First `w:rPr` found in a run of `el`, depth-first.
fn first_run_properties(el: &XmlElement) -> Option<&XmlElement> {
    for child in el.elements() {
        match child.local_name() {
            "pPr" => {}
            "r" => {
                if let Some(rpr) = child.child("rPr") {
                    return Some(rpr);
                }
            }
            _ => {
                if let Some(rpr) = first_run_properties(child) {
                    return Some(rpr);
                }
            }
        }
    }
    None
}

/// A run carrying `text`, with newlines and tabs as break/tab elements.
fn build_run(template: &XmlElement, rpr: Option<&XmlElement>, text: &str) -> XmlElement {
    let mut run = template.sibling_named("r");
    if let Some(rpr) = rpr {
        run = run.with_child(rpr.clone());
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.with_child(template.sibling_named("br"));
        }
        for (j, chunk) in line.split('\t').enumerate() {
            if j > 0 {
                run = run.with_child(template.sibling_named("tab"));
            }
            if !chunk.is_empty() {
                let mut t = template
                    .sibling_named("t")
                    .with_attribute("xml:space", "preserve");
                t.children.push(XmlNode::Text(chunk.to_string()));
                run = run.with_child(t);
            }
        }
    }
    run
}

/// Concatenated `w:t` content of a paragraph, the text markers are matched
/// against.
fn marker_text(p: &XmlElement) -> String {
    let mut nodes = Vec::new();
    text_nodes(p, &mut nodes);
    nodes.into_iter().map(XmlElement::text).collect()
}

fn text_nodes<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    for child in el.elements() {
        match child.local_name() {
            "t" => out.push(child),
            "pPr" | "rPr" => {}
            _ => text_nodes(child, out),
        }
    }
}

fn text_nodes_mut<'a>(el: &'a mut XmlElement, out: &mut Vec<&'a mut XmlElement>) {
    for child in el.elements_mut() {
        if child.is("t") {
            out.push(child);
        } else if !child.is("pPr") && !child.is("rPr") {
            text_nodes_mut(child, out);
        }
    }
}

/// The slice `flat[start..end]` with every marker overlapping it removed.
/// A marker's value is inserted in the slice where the marker begins.
fn splice_markers(flat: &str, start: usize, end: usize, markers: &[(usize, usize, &str)]) -> String {
    let mut out = String::new();
    let mut pos = start;
    for &(m_start, m_end, value) in markers {
        if m_end <= start || m_start >= end {
            continue;
        }
        out.push_str(&flat[pos..m_start.max(start)]);
        if m_start >= start {
            out.push_str(value);
        }
        pos = m_end.min(end);
    }
    out.push_str(&flat[pos..end]);
    out
}

fn set_text(t: &mut XmlElement, text: String) {
    match t.attributes.iter_mut().find(|(key, _)| key == "xml:space") {
        Some((_, value)) => *value = "preserve".to_string(),
        None => t
            .attributes
            .push(("xml:space".to_string(), "preserve".to_string())),
    }
    t.children.clear();
    if !text.is_empty() {
        t.children.push(XmlNode::Text(text));
    }
}

/// Replace all block content of a cell by one paragraph holding `text`,
/// keeping cell properties and the first paragraph's formatting.
fn replace_cell_content(tc: &mut XmlElement, text: &str) {
    let first_p = tc.elements().find(|el| el.is("p"));
    let ppr = first_p.and_then(|p| p.child("pPr")).cloned();
    let rpr = first_p.and_then(first_run_properties).cloned();

    let mut p = tc.sibling_named("p");
    if let Some(ppr) = ppr {
        p = p.with_child(ppr);
    }
    let run = build_run(tc, rpr.as_ref(), text);
    p = p.with_child(run);

    tc.children
        .retain(|node| matches!(node, XmlNode::Element(el) if el.is("tcPr")));
    tc.children.push(XmlNode::Element(p));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(body: &str) -> WordDocument {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="urn:w"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        );
        WordDocument::parse(xml.as_bytes()).unwrap()
    }

    const TABLE: &str = r#"<w:tbl><w:tblPr/><w:tblGrid><w:gridCol/><w:gridCol/><w:gridCol/></w:tblGrid>
<w:tr><w:tc><w:p><w:r><w:t>Naam</w:t></w:r></w:p></w:tc><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p/></w:tc></w:tr>
<w:tr><w:tc><w:p><w:pPr><w:jc w:val="left"/><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Anamnese </w:t></w:r><w:r><w:t>5,7</w:t></w:r></w:p><w:p><w:r><w:t>regel 2</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc><w:tc><w:p/></w:tc></w:tr>
</w:tbl>"#;

    #[test]
    fn reads_tables_and_cell_text() {
        let d = doc(TABLE);
        assert_eq!(d.tables().len(), 1);
        assert_eq!(d.table_shapes(), vec![vec![3, 3]]);
        assert_eq!(d.cell_text(0, 0, 0).as_deref(), Some("Naam"));
        assert_eq!(d.cell_text(0, 1, 0).as_deref(), Some("Anamnese 5,7\nregel 2"));
        assert_eq!(d.cell_text(0, 0, 2).as_deref(), Some(""));
        assert_eq!(d.cell_text(0, 2, 0), None);
        assert_eq!(d.cell_text(1, 0, 0), None);
    }

    #[test]
    fn grid_span_cells_share_indices() {
        let mut d = doc(TABLE);
        d.set_cell_text(0, 0, 2, "Piet (1)").unwrap();
        assert_eq!(d.cell_text(0, 0, 1).as_deref(), Some("Piet (1)"));
        assert_eq!(d.cell_text(0, 0, 0).as_deref(), Some("Naam"));
    }

    #[test]
    fn set_cell_text_keeps_formatting_and_properties() {
        let mut d = doc(TABLE);
        d.set_cell_text(0, 1, 0, "Anamnese 8,1").unwrap();
        assert_eq!(d.cell_text(0, 1, 0).as_deref(), Some("Anamnese 8,1"));

        let out = String::from_utf8(d.to_bytes().unwrap()).unwrap();
        assert!(out.contains(r#"<w:tcPr><w:gridSpan w:val="2"/></w:tcPr>"#));
        assert!(out.contains(
            r#"<w:p><w:pPr><w:jc w:val="left"/><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Anamnese 8,1</w:t></w:r></w:p>"#
        ));
        assert!(!out.contains("regel 2"));
    }

    #[test]
    fn newlines_and_tabs_become_breaks() {
        let mut d = doc(TABLE);
        d.set_cell_text(0, 1, 1, "a\tb\nc").unwrap();
        assert_eq!(d.cell_text(0, 1, 1).as_deref(), Some("a\tb\nc"));
        let out = String::from_utf8(d.to_bytes().unwrap()).unwrap();
        assert!(out.contains(
            r#"<w:r><w:t xml:space="preserve">a</w:t><w:tab/><w:t xml:space="preserve">b</w:t><w:br/><w:t xml:space="preserve">c</w:t></w:r>"#
        ));
    }

    #[test]
    fn missing_cells_are_reported() {
        let mut d = doc(TABLE);
        let err = d.set_cell_text(0, 5, 0, "x").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MissingCell {
                table: 0,
                row: 5,
                col: 0
            }
        ));
    }

    #[test]
    fn placeholders_split_across_runs_are_found_and_replaced() {
        let mut d = doc(
            r#"<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>Examinator: {{ exam</w:t></w:r><w:r><w:t>inator }}</w:t></w:r></w:p>
<w:p><w:r><w:t>Datum {{datum}}, score {{eindscore}}</w:t></w:r></w:p>"#,
        );
        let keys: Vec<String> = d.placeholders().into_iter().collect();
        assert_eq!(keys, vec!["datum", "eindscore", "examinator"]);

        let replaced = d
            .replace_placeholders(|key| match key {
                "examinator" => Some("Jan de Vries"),
                "datum" => Some("16-10-2026"),
                "eindscore" => Some("7,3"),
                _ => None,
            })
            .unwrap();
        assert_eq!(replaced, 3);
        assert!(d.placeholders().is_empty());

        let out = String::from_utf8(d.to_bytes().unwrap()).unwrap();
        assert!(out.contains(
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve">Examinator: Jan de Vries</w:t></w:r>"#
        ));
        assert!(out.contains("Datum 16-10-2026, score 7,3"));
    }

    #[test]
    fn placeholder_keeps_fields_drawings_and_hyperlinks() {
        let mut d = doc(
            r#"<w:p><w:r><w:t>{{ naam }} - Pagina </w:t></w:r><w:fldSimple w:instr="PAGE"><w:r><w:t>1</w:t></w:r></w:fldSimple><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> NUMPAGES </w:instrText></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r><w:r><w:drawing><w:inline/></w:drawing></w:r><w:hyperlink w:anchor="site"><w:r><w:t>site</w:t></w:r></w:hyperlink></w:p>"#,
        );
        let replaced = d
            .replace_placeholders(|key| (key == "naam").then_some("Piet (1)"))
            .unwrap();
        assert_eq!(replaced, 1);

        let out = String::from_utf8(d.to_bytes().unwrap()).unwrap();
        assert!(out.contains(r#"<w:r><w:t xml:space="preserve">Piet (1) - Pagina </w:t></w:r>"#));
        assert!(out.contains(r#"<w:fldSimple w:instr="PAGE"><w:r><w:t>1</w:t></w:r></w:fldSimple>"#));
        assert!(out.contains(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> NUMPAGES </w:instrText></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r>"#
        ));
        assert!(out.contains(r#"<w:r><w:drawing><w:inline/></w:drawing></w:r>"#));
        assert!(out.contains(r#"<w:hyperlink w:anchor="site"><w:r><w:t>site</w:t></w:r></w:hyperlink>"#));
    }

    #[test]
    fn marker_over_three_runs_keeps_each_run() {
        let mut d = doc(
            r#"<w:p><w:r><w:t>Naam: {{ stu</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>dent_</w:t></w:r><w:r><w:t>naam }} (cohort)</w:t></w:r></w:p>"#,
        );
        d.replace_placeholders(|key| (key == "student_naam").then_some("Piet"))
            .unwrap();

        let out = String::from_utf8(d.to_bytes().unwrap()).unwrap();
        assert!(out.contains(
            r#"<w:r><w:t xml:space="preserve">Naam: Piet</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve"/></w:r><w:r><w:t xml:space="preserve"> (cohort)</w:t></w:r>"#
        ));
        assert!(d.placeholders().is_empty());
    }

    #[test]
    fn cells_outside_the_row_have_no_position() {
        let d = doc(TABLE);
        let tables = d.tables();
        let first_row = rows(tables[0]).next().unwrap();
        let other_row = rows(tables[0]).nth(1).unwrap();
        let foreign = grid_cells(other_row)[0];
        assert_eq!(position_of(first_row, foreign), None);
        assert_eq!(position_of(first_row, grid_cells(first_row)[1]), Some(1));
    }

    #[test]
    fn unknown_placeholders_fail() {
        let mut d = doc(r#"<w:p><w:r><w:t>{{onbekend}}</w:t></w:r></w:p>"#);
        let err = d.replace_placeholders(|_| None).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholders(keys) if keys == vec!["onbekend"]));
    }
}
