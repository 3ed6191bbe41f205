//! Streaming SHA-256 tee/multi-writer primitives and the checksum store
//! (manifest) that records one digest per archive-relative path.

mod error;
mod reader;
mod store;
mod writer;

pub use error::Error;
pub use reader::ReaderChecksum;
pub use store::ChecksumStore;
pub use writer::WriterChecksum;

pub type Result<T> = std::result::Result<T, Error>;
