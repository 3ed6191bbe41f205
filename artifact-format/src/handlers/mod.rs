//! Payload handlers (spec.md §4.5): a polymorphic set over one capability
//! trait. Variants live in their own modules; `registry` maps a
//! `header-info.payloads[*].type` string to a constructor, falling back to
//! `Generic` for anything unregistered.

mod bootstrap;
mod error;
mod generic;
mod module_image;
mod registry;
mod rootfs_v1;
mod rootfs_v2;
mod rootfs_v3;

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;

pub use bootstrap::BootstrapArtifact;
pub use error::Error;
pub use generic::Generic;
pub use module_image::{AugmentOverlay, ModuleImage};
pub use registry::HandlerRegistry;
pub use rootfs_v1::RootfsV1;
pub use rootfs_v2::RootfsV2;
pub use rootfs_v3::{LegacyChecksumKeyStyle, RootfsV3};

use crate::metadata::StringOrList;

pub type Result<T> = std::result::Result<T, Error>;

/// A tar builder writing into an erased sink, shared by `compose_header`
/// (backed by an in-memory buffer) and `compose_data` (backed by the
/// compressor/checksum chain); handlers never see which.
pub type TarSink<'a> = tar::Builder<&'a mut dyn Write>;

/// A payload data file: a name as it appears inside the data archive (and
/// in `files`/manifest entries), its size, its SHA-256 hex digest (known
/// up front when composing, confirmed on install when reading), and — only
/// when composing, never when reading — the local path the writer reads
/// its bytes from.
#[derive(Debug, Clone)]
pub struct DataFile {
    pub name: String,
    pub size: u64,
    pub checksum: Option<String>,
    pub source: Option<PathBuf>,
}

/// The uniform capability interface every payload type implements
/// (spec.md §4.5).
pub trait Handler: Send {
    fn update_type(&self) -> Option<String>;
    fn files(&self) -> &[DataFile];

    fn compose_header(&self, out: &mut TarSink<'_>, index: usize) -> Result<()>;
    fn compose_data(&self, out: &mut TarSink<'_>, index: usize) -> Result<()>;

    fn read_header(&mut self, relative_path: &str, contents: &[u8], version: u32, augmented: bool) -> Result<()>;
    fn install(&mut self, name: &str, payload: &mut dyn Read, size: u64) -> Result<()>;

    fn get_provides(&self) -> BTreeMap<String, StringOrList>;
    fn get_depends(&self) -> BTreeMap<String, StringOrList>;
    fn get_meta_data(&self) -> serde_json::Value;
    fn get_clears_provides(&self) -> Vec<String>;

    /// Factory for a fresh, empty instance of the same concrete type; used
    /// by the reader when instantiating one handler per payload index.
    fn new_instance(&self) -> Box<dyn Handler>;

    /// Whether this handler instance carries an augmented overlay that
    /// needs a `header-augment.tar` entry composed for it. Only
    /// `ModuleImage` ever returns `true`.
    fn has_augment(&self) -> bool {
        false
    }

    /// Composes this handler's restricted augmented `type-info` (and, for
    /// v3, a `header-info.payloads[i].type` override handled by the writer
    /// engine separately). No-op for handlers without an overlay.
    fn compose_augment_header(&self, _out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        Ok(())
    }

    /// Folds a previously `read_header(..., augmented: true)`-parsed overlay
    /// into the primary handler state, per the recursive per-key merge rule.
    /// No-op for handlers without an overlay.
    fn merge_augment(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether the reader should tolerate a `data/XXXX.tar*` member whose
    /// name is not already present in `files()`, dispatching it to
    /// `install` anyway instead of treating it as fatal. Only `Generic`
    /// returns `true`: a fallback handler for an unregistered type has no
    /// way to know the payload's real file list up front.
    fn accepts_unknown_data_files(&self) -> bool {
        false
    }
}

/// Appends one JSON-serialized metadata record as a tar entry.
pub(crate) fn append_json_entry(out: &mut TarSink<'_>, path: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    out.append_data(&mut header, path, bytes)
}
