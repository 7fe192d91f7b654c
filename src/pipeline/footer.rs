//! Footer injection for DOCX packages.
//!
//! A `.docx` file is an OPC zip archive. Injection adds a new footer
//! part rendering a fixed three-equal-column table — name on the left,
//! roll number in the center, and a label plus a live `PAGE` field on
//! the right, all 10 pt serif — then points every section of
//! `word/document.xml` at it, dropping whatever footers the document
//! carried before. The part is registered in `[Content_Types].xml` and
//! the document relationships under collision-free ids.
//!
//! The XML splicing uses compile-time validated patterns via
//! `lazy_regex!`; the package structure of WordprocessingML is regular
//! enough that no full XML parse is needed.

#![allow(clippy::non_std_lazy_statics)]

use crate::error::FooterError;
use lazy_regex::lazy_regex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const FOOTER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
const FOOTER_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";

/// Footer page margin in twips (0.2"), reduced from the usual 0.5".
const FOOTER_MARGIN_TWIPS: u32 = 288;

/// Run properties shared by every footer run: 10 pt serif.
const RUN_PROPS: &str = "<w:rPr>\
    <w:rFonts w:ascii=\"Times New Roman\" w:hAnsi=\"Times New Roman\"/>\
    <w:sz w:val=\"20\"/>\
    </w:rPr>";

/// Existing footer references, dropped before ours goes in.
static RE_FOOTER_REF: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<w:footerReference[^>]*/>");

/// Header references; our footer reference must come after them to
/// keep the `sectPr` child sequence valid.
static RE_HEADER_REF: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<w:headerReference[^>]*/>");

/// A whole section-properties block.
static RE_SECT_BLOCK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?s)<w:sectPr(?:\s[^>]*)?>.*?</w:sectPr>");

/// The footer distance attribute of `w:pgMar`.
static RE_FOOTER_MARGIN: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r#"w:footer="[0-9]+""#);

/// Relationship ids in `document.xml.rels`.
static RE_REL_ID: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r#"Id="rId([0-9]+)""#);

/// Existing footer part names in the package.
static RE_FOOTER_PART: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^word/footer([0-9]+)\.xml$");

/// Rewrite the package at `input` into `output` with the identity
/// footer applied to every section.
///
/// # Errors
///
/// Fails when the input is not a well-formed DOCX package or on any
/// filesystem error; the caller owns deletion of a partial `output`.
pub fn inject_footer(
    input: &Path,
    output: &Path,
    name: &str,
    roll: &str,
) -> Result<(), FooterError> {
    let reader = BufReader::new(File::open(input)?);
    let mut archive = ZipArchive::new(reader)?;
    let entry_names: Vec<String> = archive.file_names().map(ToString::to_string).collect();

    let document_xml = read_part(&mut archive, DOCUMENT_PART)?;
    let rels_xml = read_part(&mut archive, RELS_PART)?;
    let types_xml = read_part(&mut archive, CONTENT_TYPES_PART)?;

    let part_name = next_footer_part(&entry_names);
    let rel_id = next_relationship_id(&rels_xml);

    let document_xml = rewrite_document(&document_xml, &rel_id);
    let rels_xml = add_relationship(&rels_xml, &rel_id, &part_name)?;
    let types_xml = add_content_type(&types_xml, &part_name)?;
    let footer_xml = footer_part_xml(name, roll);

    let writer = BufWriter::new(File::create(output)?);
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        match entry.name() {
            DOCUMENT_PART | RELS_PART | CONTENT_TYPES_PART => {}
            _ => zip.raw_copy_file(entry)?,
        }
    }

    zip.start_file(DOCUMENT_PART, options)?;
    zip.write_all(document_xml.as_bytes())?;
    zip.start_file(RELS_PART, options)?;
    zip.write_all(rels_xml.as_bytes())?;
    zip.start_file(CONTENT_TYPES_PART, options)?;
    zip.write_all(types_xml.as_bytes())?;
    zip.start_file(format!("word/{part_name}"), options)?;
    zip.write_all(footer_xml.as_bytes())?;
    zip.finish()?;

    Ok(())
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, FooterError> {
    let mut part = archive
        .by_name(name)
        .map_err(|_| FooterError::MissingPart(name.to_string()))?;
    let mut buf = String::new();
    part.read_to_string(&mut buf)?;
    Ok(buf)
}

/// First unused `footerN.xml` part name.
fn next_footer_part(entry_names: &[String]) -> String {
    let max = entry_names
        .iter()
        .filter_map(|name| RE_FOOTER_PART.captures(name))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("footer{}.xml", max + 1)
}

/// First unused `rIdN` relationship id.
fn next_relationship_id(rels_xml: &str) -> String {
    let max = RE_REL_ID
        .captures_iter(rels_xml)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// Reset every section's footer region: drop existing references,
/// point each `sectPr` at our footer part, shrink the footer margin.
fn rewrite_document(document_xml: &str, rel_id: &str) -> String {
    let stripped = RE_FOOTER_REF.replace_all(document_xml, "");
    let reference = format!("<w:footerReference w:type=\"default\" r:id=\"{rel_id}\"/>");

    let referenced = RE_SECT_BLOCK.replace_all(&stripped, |caps: &regex::Captures| {
        let block = &caps[0];
        // Schema order: headerReference* then footerReference*
        let insert_at = RE_HEADER_REF
            .find_iter(block)
            .last()
            .map(|m| m.end())
            .or_else(|| block.find('>').map(|i| i + 1))
            .unwrap_or(0);
        format!(
            "{}{}{}",
            &block[..insert_at],
            reference,
            &block[insert_at..]
        )
    });

    RE_FOOTER_MARGIN
        .replace_all(&referenced, format!("w:footer=\"{FOOTER_MARGIN_TWIPS}\""))
        .into_owned()
}

fn add_relationship(
    rels_xml: &str,
    rel_id: &str,
    part_name: &str,
) -> Result<String, FooterError> {
    if !rels_xml.contains("</Relationships>") {
        return Err(FooterError::MissingPart(RELS_PART.to_string()));
    }
    let relationship = format!(
        "<Relationship Id=\"{rel_id}\" Type=\"{FOOTER_REL_TYPE}\" Target=\"{part_name}\"/>"
    );
    Ok(rels_xml.replace(
        "</Relationships>",
        &format!("{relationship}</Relationships>"),
    ))
}

fn add_content_type(types_xml: &str, part_name: &str) -> Result<String, FooterError> {
    if !types_xml.contains("</Types>") {
        return Err(FooterError::MissingPart(CONTENT_TYPES_PART.to_string()));
    }
    let override_entry = format!(
        "<Override PartName=\"/word/{part_name}\" ContentType=\"{FOOTER_CONTENT_TYPE}\"/>"
    );
    Ok(types_xml.replace("</Types>", &format!("{override_entry}</Types>")))
}

/// The footer part: a borderless fixed-layout table spanning the page
/// width, three equal columns, with a live page-number field on the
/// right so the rendered output reflects the true page count.
fn footer_part_xml(name: &str, roll: &str) -> String {
    let name_cell = footer_cell("left", &footer_run(&format!("Name: {}", xml_escape(name))));
    let roll_cell = footer_cell(
        "center",
        &footer_run(&format!("Roll No: {}", xml_escape(roll))),
    );
    let page_cell = footer_cell(
        "right",
        &format!(
            "{}<w:fldSimple w:instr=\" PAGE \">{}</w:fldSimple>",
            footer_run("Page no: "),
            footer_run("1")
        ),
    );

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
        <w:ftr xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" \
        xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
        <w:tbl>\
        <w:tblPr><w:tblW w:w=\"5000\" w:type=\"pct\"/><w:tblLayout w:type=\"fixed\"/></w:tblPr>\
        <w:tblGrid><w:gridCol w:w=\"3117\"/><w:gridCol w:w=\"3117\"/><w:gridCol w:w=\"3117\"/></w:tblGrid>\
        <w:tr>{name_cell}{roll_cell}{page_cell}</w:tr>\
        </w:tbl>\
        </w:ftr>"
    )
}

fn footer_run(text: &str) -> String {
    format!("<w:r>{RUN_PROPS}<w:t xml:space=\"preserve\">{text}</w:t></w:r>")
}

fn footer_cell(justification: &str, content: &str) -> String {
    format!(
        "<w:tc><w:tcPr><w:tcW w:w=\"1667\" w:type=\"pct\"/></w:tcPr>\
        <w:p><w:pPr><w:jc w:val=\"{justification}\"/></w:pPr>{content}</w:p></w:tc>"
    )
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
