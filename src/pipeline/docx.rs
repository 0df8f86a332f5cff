//! Page markers for `.docx` input.
//!
//! Structured converters flatten a word-processor document into one stream of
//! text. To keep page structure, manual page breaks (`<w:br w:type="page"/>`,
//! `<w:lastRenderedPageBreak/>`) are found in `word/document.xml` and a
//! `## PÁGINA N` paragraph is inserted before each paragraph that holds one,
//! with page 1 before the first paragraph.
//!
//! The rewrite goes into a temporary copy. The caller's file is only read,
//! and the copy is deleted when the returned [`NamedTempFile`] drops.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_XML: &str = "word/document.xml";

static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").unwrap());

static RE_PAGE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<w:br\b[^>]*\bw:type="page"[^>]*/>|<w:lastRenderedPageBreak\s*/>"#).unwrap()
});

fn marker(page: usize) -> String {
    format!("<w:p><w:r><w:t>## PÁGINA {page}</w:t></w:r></w:p>")
}

/// Insert page markers into the body XML. Returns the new XML and page count.
pub fn paginate_document_xml(xml: &str) -> (String, usize) {
    let mut out = String::with_capacity(xml.len() + 512);
    let mut last = 0;
    let mut page = 0;

    for para in RE_PARAGRAPH.find_iter(xml) {
        out.push_str(&xml[last..para.start()]);
        if page == 0 {
            page = 1;
            out.push_str(&marker(page));
        }
        if RE_PAGE_BREAK.is_match(para.as_str()) {
            page += 1;
            out.push_str(&marker(page));
        }
        out.push_str(para.as_str());
        last = para.end();
    }
    out.push_str(&xml[last..]);

    if page == 0 {
        // No paragraphs at all: a lone page-1 marker at the end of the body.
        if let Some(pos) = out.find("</w:body>") {
            out.insert_str(pos, &marker(1));
            page = 1;
        }
    }
    (out, page)
}

/// Write a paginated copy of `src` to a temporary `.docx`.
pub async fn paginated_copy(src: &Path) -> Result<NamedTempFile, String> {
    let src: PathBuf = src.to_path_buf();
    tokio::task::spawn_blocking(move || paginated_copy_blocking(&src))
        .await
        .map_err(|e| format!("pagination task panicked: {e}"))?
}

fn paginated_copy_blocking(src: &Path) -> Result<NamedTempFile, String> {
    let file = File::open(src).map_err(|e| format!("open {}: {e}", src.display()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("not a docx container: {e}"))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| format!("{DOCUMENT_XML}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("{DOCUMENT_XML}: {e}"))?;

    let (paginated, pages) = paginate_document_xml(&xml);
    debug!("Inserted {} page markers into {}", pages, src.display());

    let tmp = tempfile::Builder::new()
        .prefix("doc2md-paginated-")
        .suffix(".docx")
        .tempfile()
        .map_err(|e| format!("temp file: {e}"))?;
    let out = tmp.reopen().map_err(|e| format!("temp file: {e}"))?;

    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| format!("entry {i}: {e}"))?;
        if entry.name() == DOCUMENT_XML {
            drop(entry);
            writer
                .start_file(DOCUMENT_XML, options)
                .map_err(|e| format!("{DOCUMENT_XML}: {e}"))?;
            writer
                .write_all(paginated.as_bytes())
                .map_err(|e| format!("{DOCUMENT_XML}: {e}"))?;
        } else {
            writer.raw_copy_file(entry).map_err(|e| format!("entry {i}: {e}"))?;
        }
    }
    writer.finish().map_err(|e| format!("finalising docx: {e}"))?;

    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = concat!(
        r#"<w:document><w:body>"#,
        r#"<w:p><w:r><w:t>Capa</w:t></w:r></w:p>"#,
        r#"<w:p w:rsidR="00A1"><w:r><w:br w:type="page"/><w:t>Segunda</w:t></w:r></w:p>"#,
        r#"<w:p><w:pPr/><w:r><w:t>ainda segunda</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:lastRenderedPageBreak/><w:t>Terceira</w:t></w:r></w:p>"#,
        r#"<w:sectPr/></w:body></w:document>"#
    );

    fn write_docx(path: &Path, body: &str) {
        let mut w = ZipWriter::new(File::create(path).unwrap());
        let opts = SimpleFileOptions::default();
        w.start_file("[Content_Types].xml", opts).unwrap();
        w.write_all(b"<Types/>").unwrap();
        w.start_file(DOCUMENT_XML, opts).unwrap();
        w.write_all(body.as_bytes()).unwrap();
        w.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut s = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn markers_precede_break_paragraphs() {
        let (xml, pages) = paginate_document_xml(BODY);
        assert_eq!(pages, 3);

        let p1 = xml.find("## PÁGINA 1").unwrap();
        let capa = xml.find("Capa").unwrap();
        let p2 = xml.find("## PÁGINA 2").unwrap();
        let segunda = xml.find("Segunda").unwrap();
        let p3 = xml.find("## PÁGINA 3").unwrap();
        let terceira = xml.find("Terceira").unwrap();
        assert!(p1 < capa && capa < p2 && p2 < segunda && segunda < p3 && p3 < terceira);
        assert!(xml.ends_with("<w:sectPr/></w:body></w:document>"));
    }

    #[test]
    fn empty_body_gets_single_marker() {
        let (xml, pages) = paginate_document_xml("<w:document><w:body></w:body></w:document>");
        assert_eq!(pages, 1);
        assert!(xml.contains("## PÁGINA 1</w:t>"));
    }

    #[tokio::test]
    async fn copy_is_paginated_and_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("relatorio.docx");
        write_docx(&src, BODY);
        let before = std::fs::read(&src).unwrap();

        let tmp = paginated_copy(&src).await.unwrap();
        let tmp_path = tmp.path().to_path_buf();
        assert!(read_entry(&tmp_path, DOCUMENT_XML).contains("## PÁGINA 3"));
        assert_eq!(read_entry(&tmp_path, "[Content_Types].xml"), "<Types/>");
        assert_eq!(std::fs::read(&src).unwrap(), before);

        drop(tmp);
        assert!(!tmp_path.exists());
    }

    #[tokio::test]
    async fn non_zip_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("fake.docx");
        std::fs::write(&src, b"not a zip").unwrap();
        assert!(paginated_copy(&src).await.is_err());
    }
}
