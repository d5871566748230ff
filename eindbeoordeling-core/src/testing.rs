//! Builders for small in-memory `.docx` templates, shared by the unit tests
//! and the integration tests of dependent crates.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::docx::DOCUMENT_PART;

pub const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/header1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A paragraph with a single run.
pub fn paragraph_xml(text: &str) -> String {
    if text.is_empty() {
        return "<w:p/>".to_string();
    }
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

/// A table with one paragraph per cell.
pub fn table_xml(rows: &[&[&str]]) -> String {
    let mut out = String::from("<w:tbl><w:tblPr><w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr>");
    for row in rows {
        out.push_str("<w:tr>");
        for cell in row.iter() {
            out.push_str("<w:tc><w:tcPr><w:tcW w:w=\"3000\" w:type=\"dxa\"/></w:tcPr>");
            out.push_str(&paragraph_xml(cell));
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
    out
}

/// Wrap block-level XML in a `w:document`.
pub fn document_xml(blocks: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{WORDML_NS}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        blocks.concat()
    )
}

/// The marker-less assessment form: an info table and a score table.
pub fn table_layout_document_xml() -> String {
    document_xml(&[
        paragraph_xml("Eindbeoordeling KH1 AGZ PvB"),
        table_xml(&[
            &["Naam VioS", ""],
            &["Naam examinator", ""],
            &["Datum beoordeling", ""],
            &["Gelegenheid", ""],
            &["Score", ""],
        ]),
        paragraph_xml(""),
        table_xml(&[
            &["Beoordeling", "", "Score onderdeel"],
            &["Deelbeoordelingen", "Weging", ""],
            &["Anamnese/LO 4,2", "40%", ""],
            &["Verslag", "30%", ""],
            &["Reflectie 6.0", "30%", ""],
            &["Totaal", "", ""],
        ]),
    ])
}

/// The same form using named markers, with a marker in the page header.
pub fn placeholder_document_xml() -> String {
    document_xml(&[
        paragraph_xml("Eindbeoordeling KH1 AGZ PvB"),
        table_xml(&[
            &["Naam VioS", "{{ naam }}"],
            &["Naam examinator", "{{ examinator }}"],
            &["Datum beoordeling", "{{ datum }}"],
            &["Gelegenheid", "{{ gelegenheid }}"],
            &["Score", "{{ eindscore }}"],
        ]),
        table_xml(&[
            &["Anamnese/LO {{ anam_lo }}", "{{ onderdeel_a }}"],
            &["Verslag {{ verslag }}", "{{ onderdeel_b }}"],
            &["Reflectie {{ reflectie }}", "{{ onderdeel_c }}"],
            &["Totaal", "{{ totaal }}"],
        ]),
    ])
}

pub fn header_xml(text: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="{WORDML_NS}">{}</w:hdr>"#,
        paragraph_xml(text)
    )
}

/// Zip parts into a `.docx`, adding content types and package relationships.
pub fn docx_from_parts(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let standard = [("[Content_Types].xml", CONTENT_TYPES), ("_rels/.rels", ROOT_RELS)];
    for (name, body) in standard.iter().chain(parts.iter()) {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(body.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

pub fn table_layout_template() -> Vec<u8> {
    docx_from_parts(&[(DOCUMENT_PART, table_layout_document_xml().as_str())])
}

pub fn placeholder_template() -> Vec<u8> {
    let header = header_xml("{{ student_naam }} - {{ studentnummer }}");
    docx_from_parts(&[
        (DOCUMENT_PART, placeholder_document_xml().as_str()),
        ("word/header1.xml", header.as_str()),
    ])
}
