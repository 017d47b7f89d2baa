//! Text extraction for uploaded artifacts.
//!
//! PDFs go through `pdf-extract`; every other accepted file is read as
//! UTF-8, replacing invalid sequences. Extraction never panics: a bad file
//! yields an [`ExtractError`] and ingestion moves on to the next one.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain text from the file at `path`, dispatching on extension.
pub fn extract_file(path: &Path) -> Result<(Vec<u8>, String), ExtractError> {
    let bytes = std::fs::read(path)?;
    let text = extract_text(&bytes, is_pdf(path))?;
    Ok((bytes, text))
}

pub fn extract_text(bytes: &[u8], pdf: bool) -> Result<String, ExtractError> {
    if pdf {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}
