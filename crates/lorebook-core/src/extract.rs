//! Page extraction contract.
//!
//! Extraction turns raw document bytes into ordered pages; everything
//! downstream (chunking, indexing) operates on page text only. PDF text
//! extraction is an external capability injected by the host — the core
//! never parses PDF itself.

use crate::error::ExtractError;
use crate::types::{DocKind, PageText};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// External page-text provider.
///
/// # Contract
///
/// - Pages are emitted in document order with `page_number` starting at 1
///   and strictly increasing.
/// - Unsupported or corrupt input yields an empty sequence, not an error.
/// - For `txt`/`md`, a single page containing the whole text.
/// - For `pdf`, one page per source page with best-effort text.
#[async_trait(?Send)]
pub trait PageExtractor: Send + Sync {
    /// Extracts pages from raw bytes.
    async fn extract(&self, bytes: &[u8], kind: DocKind) -> Result<Vec<PageText>, ExtractError>;
}

/// Built-in extractor for UTF-8 text kinds (`txt`, `md`).
///
/// Non-UTF-8 input is treated as corrupt and yields no pages.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn extract_text(bytes: &[u8]) -> Vec<PageText> {
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => vec![PageText {
                page_number: 1,
                text: text.to_string(),
            }],
            Ok(_) => Vec::new(),
            Err(_) => {
                warn!("Input is not valid UTF-8, treating as corrupt");
                Vec::new()
            }
        }
    }
}

#[async_trait(?Send)]
impl PageExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], kind: DocKind) -> Result<Vec<PageText>, ExtractError> {
        match kind {
            DocKind::Txt | DocKind::Md => Ok(Self::extract_text(bytes)),
            DocKind::Pdf => Ok(Vec::new()),
        }
    }
}

/// Routing extractor: text kinds are handled inline, PDF is delegated to
/// an optional injected provider.
///
/// Without a PDF provider, PDF input yields no pages (the document is
/// still persisted; it just contributes nothing to retrieval).
pub struct CompositeExtractor {
    text: PlainTextExtractor,
    pdf: Option<Arc<dyn PageExtractor>>,
}

impl CompositeExtractor {
    /// Creates an extractor with no PDF provider.
    pub fn new() -> Self {
        Self {
            text: PlainTextExtractor,
            pdf: None,
        }
    }

    /// Attaches a PDF page-text provider.
    pub fn with_pdf_provider(mut self, provider: Arc<dyn PageExtractor>) -> Self {
        self.pdf = Some(provider);
        self
    }
}

impl Default for CompositeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl PageExtractor for CompositeExtractor {
    async fn extract(&self, bytes: &[u8], kind: DocKind) -> Result<Vec<PageText>, ExtractError> {
        match kind {
            DocKind::Txt | DocKind::Md => self.text.extract(bytes, kind).await,
            DocKind::Pdf => match &self.pdf {
                Some(provider) => provider.extract(bytes, kind).await,
                None => {
                    warn!("No PDF provider configured, document will have no pages");
                    Ok(Vec::new())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_txt_is_single_page() {
        let extractor = PlainTextExtractor;
        let pages = extractor
            .extract(b"Hello world.\nSecond line.", DocKind::Txt)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].text, "Hello world.\nSecond line.");
    }

    #[tokio::test]
    async fn test_empty_input_yields_no_pages() {
        let extractor = PlainTextExtractor;
        assert!(extractor.extract(b"", DocKind::Txt).await.unwrap().is_empty());
        assert!(extractor
            .extract(b"  \n\t ", DocKind::Md)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_yields_no_pages() {
        let extractor = PlainTextExtractor;
        let pages = extractor
            .extract(&[0xff, 0xfe, 0x00, 0x80], DocKind::Txt)
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_composite_without_pdf_provider() {
        let extractor = CompositeExtractor::new();
        let pages = extractor
            .extract(b"%PDF-1.4 fake", DocKind::Pdf)
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_composite_delegates_pdf() {
        struct FakePdfExtractor;

        #[async_trait(?Send)]
        impl PageExtractor for FakePdfExtractor {
            async fn extract(
                &self,
                _bytes: &[u8],
                _kind: DocKind,
            ) -> Result<Vec<PageText>, ExtractError> {
                Ok(vec![
                    PageText {
                        page_number: 1,
                        text: "page one".to_string(),
                    },
                    PageText {
                        page_number: 2,
                        text: "page two".to_string(),
                    },
                ])
            }
        }

        let extractor =
            CompositeExtractor::new().with_pdf_provider(Arc::new(FakePdfExtractor));
        let pages = extractor.extract(b"%PDF", DocKind::Pdf).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 2);
    }
}
