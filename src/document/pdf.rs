//! PDF page streaming via `lopdf`.
//!
//! The document is parsed once on the CPU pool, then pages are decoded one
//! at a time so only a single page of text is resident per job at any
//! moment.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DocumentExtractor, ExtractError, PageReader, PageText};
use crate::workers::CpuPool;

/// Streaming PDF extractor.
#[derive(Clone, Debug)]
pub struct PdfExtractor {
    cpu: CpuPool,
}

impl PdfExtractor {
    pub fn new(cpu: CpuPool) -> Self {
        Self { cpu }
    }
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PageReader>, ExtractError> {
        let document = self
            .cpu
            .run(move || lopdf::Document::load_mem(&bytes))
            .await?
            .map_err(|err| ExtractError::Parse {
                message: err.to_string(),
            })?;

        let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        page_numbers.sort_unstable();
        if page_numbers.is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        debug!(total_pages = page_numbers.len(), "pdf opened");
        Ok(Box::new(PdfPageReader {
            document: Arc::new(document),
            page_numbers,
            cursor: 0,
            cpu: self.cpu.clone(),
        }))
    }
}

struct PdfPageReader {
    document: Arc<lopdf::Document>,
    page_numbers: Vec<u32>,
    cursor: usize,
    cpu: CpuPool,
}

#[async_trait]
impl PageReader for PdfPageReader {
    fn total_pages(&self) -> u32 {
        self.page_numbers.len() as u32
    }

    async fn next_page(&mut self) -> Result<Option<PageText>, ExtractError> {
        let Some(&page_number) = self.page_numbers.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let document = Arc::clone(&self.document);
        let text = self
            .cpu
            .run(move || document.extract_text(&[page_number]))
            .await?;

        // A page that fails text decoding is treated as empty rather than
        // failing the whole document; downstream skips empty pages.
        let text = match text {
            Ok(text) => text,
            Err(err) => {
                warn!(page_number, %err, "page text extraction failed; treating as empty");
                String::new()
            }
        };

        Ok(Some(PageText {
            page_number: self.cursor as u32,
            total_pages: self.total_pages(),
            text,
        }))
    }
}
