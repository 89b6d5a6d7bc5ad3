//! Document decoding: streaming page extraction and text chunking.
//!
//! Extraction is a trait seam so the pipeline can stream pages from any
//! source format; [`pdf::PdfExtractor`] is the production implementation.
//! Chunking is a pure function shared by the PDF and plain-text paths.

pub mod chunker;
pub mod pdf;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::workers::WorkerError;

pub use chunker::{APPROX_CHARS_PER_TOKEN, chunk_text};
pub use pdf::PdfExtractor;

/// One page of decoded text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub total_pages: u32,
    pub text: String,
}

/// Errors surfaced while decoding a document.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("failed to parse document: {message}")]
    #[diagnostic(
        code(inkstream::document::parse),
        help("The uploaded bytes may be corrupt or not the declared format.")
    )]
    Parse { message: String },

    #[error("document has no pages")]
    #[diagnostic(code(inkstream::document::empty))]
    EmptyDocument,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Worker(#[from] WorkerError),
}

/// Opens raw bytes into a page-by-page reader.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PageReader>, ExtractError>;
}

/// Streaming page reader: one page of decoded text resident at a time.
///
/// Pages are yielded in page-number order; `total_pages` is fixed for the
/// lifetime of the reader.
#[async_trait]
pub trait PageReader: Send {
    fn total_pages(&self) -> u32;

    /// Decode and return the next page, or `None` after the last one.
    async fn next_page(&mut self) -> Result<Option<PageText>, ExtractError>;
}

impl std::fmt::Debug for dyn PageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReader")
            .field("total_pages", &self.total_pages())
            .finish_non_exhaustive()
    }
}
