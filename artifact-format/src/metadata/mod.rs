//! Typed, JSON-serializable metadata records (spec.md §3.4, §4.4). Every
//! record is a plain serde type plus a `validate()` that returns a list of
//! human-readable reasons instead of bailing on the first problem, and a
//! `write()` that feeds it raw bytes and reports how many were consumed —
//! the streaming-decode operation spec.md asks for, built on
//! `serde_json::Deserializer`'s byte-offset tracking rather than a
//! hand-rolled incremental parser.

mod clears;
mod error;
mod files;
mod header_info;
mod info;
mod names;
mod type_info;

pub use clears::clears_provides_matches;
pub use error::{Error, ValidationErrors};
pub use files::Files;
pub use header_info::{ArtifactDepends, ArtifactProvides, HeaderInfo, HeaderInfoV3, PayloadType};
pub use info::Info;
pub use type_info::{StringOrList, TypeInfo, TypeInfoV3};

pub type Result<T> = std::result::Result<T, Error>;

/// Shared behaviour across every metadata record: self-validation, plain
/// JSON serialization, and a `write` operation that reports how many bytes
/// of its input it actually consumed so a caller reading a tar entry of
/// unknown exact boundary can keep the remainder.
pub trait Record: serde::Serialize + serde::de::DeserializeOwned + Sized {
    fn validate(&self) -> std::result::Result<(), ValidationErrors>;

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn write(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut de = serde_json::Deserializer::from_slice(bytes);
        let value = Self::deserialize(&mut de)?;
        let consumed = de.byte_offset();
        Ok((value, consumed))
    }
}
