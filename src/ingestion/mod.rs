//! Document ingestion: load, split, stamp, persist, index.

pub mod loader;
pub mod pipeline;
pub mod splitter;

pub use loader::{is_accepted_upload, DocumentLoader, FileDocumentLoader, LoadedChunk};
pub use pipeline::{IngestReport, IngestionPipeline};
pub use splitter::RecursiveCharacterSplitter;
