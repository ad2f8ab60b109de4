//! PDF text extraction.
//!
//! Uploaded documents arrive as raw bytes; this module turns a batch of them
//! into one plain UTF-8 string. Pages are read in order and concatenated
//! without separators, documents in upload order. Pages without extractable
//! text (scanned images, empty pages) contribute nothing and raise no error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::models::UploadedPdf;

/// Extraction error for a single document.
#[derive(Debug)]
pub enum ExtractError {
    /// The parser rejected the file.
    Pdf { name: String, reason: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf { name, reason } => {
                write!(f, "PDF extraction failed for '{}': {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Text extracted from a batch.
#[derive(Debug, Default)]
pub struct ExtractedText {
    pub text: String,
    /// Files that were skipped because they could not be parsed. Always
    /// empty unless `skip_unreadable` was requested.
    pub skipped: Vec<String>,
    pub pages: usize,
}

/// Extract the text of every page of one PDF, in page order.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    // pdf-extract panics on some malformed font tables; treat that as a
    // parse failure instead of taking the process down.
    match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("parser panicked on malformed input".to_string()),
    }
}

/// Concatenate the text of all pages of all documents.
///
/// With `skip_unreadable = false` the first unparseable file aborts the
/// whole batch. With `skip_unreadable = true` it is logged, recorded in
/// [`ExtractedText::skipped`] and the remaining files are processed.
pub fn extract_documents(
    docs: &[UploadedPdf],
    skip_unreadable: bool,
) -> Result<ExtractedText, ExtractError> {
    let mut out = ExtractedText::default();

    for doc in docs {
        match extract_pdf_pages(&doc.bytes) {
            Ok(pages) => {
                tracing::debug!(file = %doc.name, pages = pages.len(), "extracted pdf");
                out.pages += pages.len();
                for page in pages {
                    out.text.push_str(&page);
                }
            }
            Err(reason) if skip_unreadable => {
                tracing::warn!(file = %doc.name, %reason, "skipping unreadable pdf");
                out.skipped.push(doc.name.clone());
            }
            Err(reason) => {
                return Err(ExtractError::Pdf {
                    name: doc.name.clone(),
                    reason,
                });
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_aborts_batch() {
        let docs = vec![UploadedPdf::new("broken.pdf", b"not a pdf".to_vec())];
        let err = extract_documents(&docs, false).unwrap_err();
        let ExtractError::Pdf { name, .. } = err;
        assert_eq!(name, "broken.pdf");
    }

    #[test]
    fn invalid_pdf_skipped_when_requested() {
        let docs = vec![
            UploadedPdf::new("a.pdf", b"garbage".to_vec()),
            UploadedPdf::new("b.pdf", b"more garbage".to_vec()),
        ];
        let out = extract_documents(&docs, true).unwrap();
        assert!(out.text.is_empty());
        assert_eq!(out.skipped, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
    }

    #[test]
    fn empty_batch_yields_empty_text() {
        let out = extract_documents(&[], false).unwrap();
        assert!(out.text.is_empty());
        assert_eq!(out.pages, 0);
    }
}
