//! Text extraction for document-like uploads.
//!
//! - plain text: decoded as UTF-8 (lossy)
//! - PDF: `pdf-extract`
//! - DOCX: the `word/document.xml` part, with paragraph breaks kept
//! - images: OCR through the `tesseract` CLI

use super::DocumentFormat;
use crate::error::{RabbitholeError, Result};
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Extract the text of a document-like upload.
#[instrument(skip(bytes, temp_dir), fields(bytes = bytes.len()))]
pub async fn extract_text(
    format: DocumentFormat,
    file_name: &str,
    bytes: &[u8],
    temp_dir: &Path,
) -> Result<String> {
    let text = match format {
        DocumentFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        DocumentFormat::Pdf => {
            let owned = bytes.to_vec();
            run_blocking(move || extract_pdf(&owned)).await?
        }
        DocumentFormat::Docx => {
            let owned = bytes.to_vec();
            run_blocking(move || extract_docx(&owned)).await?
        }
        DocumentFormat::Image => ocr_image(file_name, bytes, temp_dir).await?,
    };

    debug!("Extracted {} chars from {}", text.len(), file_name);
    Ok(text)
}

async fn run_blocking<F>(f: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RabbitholeError::Extraction(format!("extraction task failed: {}", e)))?
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RabbitholeError::Extraction(format!("PDF: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RabbitholeError::Extraction(format!("DOCX is not a zip archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| RabbitholeError::Extraction(format!("DOCX has no document body: {}", e)))?
        .read_to_string(&mut xml)?;

    docx_xml_to_text(&xml)
}

/// Flatten WordprocessingML into plain text.
fn docx_xml_to_text(xml: &str) -> Result<String> {
    let invalid = |e: regex::Error| RabbitholeError::Extraction(e.to_string());
    let paragraph_end = Regex::new(r"</w:p>").map_err(invalid)?;
    let tab = Regex::new(r"<w:tab\s*/>").map_err(invalid)?;
    let line_break = Regex::new(r"<w:br\s*/>").map_err(invalid)?;
    let tag = Regex::new(r"<[^>]+>").map_err(invalid)?;

    let text = paragraph_end.replace_all(xml, "\n");
    let text = tab.replace_all(&text, "\t");
    let text = line_break.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");

    Ok(unescape_xml(&text)?.trim_end().to_string())
}

/// Decode the predefined XML entities and numeric character references.
fn unescape_xml(text: &str) -> Result<String> {
    let numeric = Regex::new(r"&#(?:x([0-9a-fA-F]+)|([0-9]+));")
        .map_err(|e| RabbitholeError::Extraction(e.to_string()))?;

    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    let text = numeric.replace_all(&text, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // Last, so `&amp;#38;` stays the literal text `&#38;`.
    Ok(text.replace("&amp;", "&"))
}

async fn ocr_image(file_name: &str, bytes: &[u8], temp_dir: &Path) -> Result<String> {
    tokio::fs::create_dir_all(temp_dir).await?;

    let suffix = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let staged = tempfile::Builder::new()
        .prefix("rabbithole-ocr-")
        .suffix(&suffix)
        .tempfile_in(temp_dir)?;
    tokio::fs::write(staged.path(), bytes).await?;

    let result = Command::new("tesseract")
        .arg(staged.path())
        .arg("stdout")
        .arg("--loglevel").arg("ERROR")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(RabbitholeError::ToolFailed(format!("tesseract failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RabbitholeError::ToolNotFound("tesseract".into()))
        }
        Err(e) => Err(RabbitholeError::ToolFailed(format!("tesseract error: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_docx(body: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_plain_text_is_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let text = extract_text(DocumentFormat::PlainText, "a.txt", b"caf\xc3\xa9 \xff", dir.path())
            .await
            .unwrap();
        assert_eq!(text, "café \u{fffd}");
    }

    #[test]
    fn test_docx_paragraphs_and_entities() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Cells &amp; tissues</w:t></w:r></w:p><w:p><w:r><w:t>Mitosis</w:t><w:tab/><w:t>phase</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml).unwrap(), "Cells & tissues\nMitosis\tphase");
    }

    #[test]
    fn test_numeric_character_references() {
        let xml = "<w:p><w:t>It&#8217;s &#x2014; caf&#233; &amp;#38; &#xD800;</w:t></w:p>";
        assert_eq!(
            docx_xml_to_text(xml).unwrap(),
            "It\u{2019}s \u{2014} caf\u{e9} &#38; &#xD800;"
        );
    }

    #[tokio::test]
    async fn test_docx_archive_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let docx = build_docx("<w:p><w:r><w:t>Hello docx</w:t></w:r></w:p>");

        let text = extract_text(DocumentFormat::Docx, "a.docx", &docx, dir.path())
            .await
            .unwrap();
        assert_eq!(text, "Hello docx");
    }

    #[tokio::test]
    async fn test_invalid_docx_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_text(DocumentFormat::Docx, "a.docx", b"not a zip", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, RabbitholeError::Extraction(_)));
    }
}
