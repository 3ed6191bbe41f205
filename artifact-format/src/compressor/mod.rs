//! The compressor registry: a small extensible table mapping a compression
//! identifier (`none`, `gzip`, `lzma`, `zstd`) and a canonical file-suffix to
//! a pair of streaming codec constructors.

mod error;
mod gzip;
mod lzma;
mod none;
mod zstd_codec;

use std::collections::BTreeMap;
use std::io::{Read, Write};

pub use error::Error;
pub use none::IdentitySink;
pub type Result<T> = std::result::Result<T, Error>;

// The engine is single-threaded and stream-oriented by contract (spec §5):
// no internal threads are spawned, so these trait objects need not be `Send`.

/// Any boxed byte source handed to a codec's reader constructor.
pub type DynRead = Box<dyn Read>;
/// Any boxed, explicitly-closeable byte sink handed to a codec's writer
/// constructor.
pub type DynWrite = Box<dyn FinishableWriter>;

/// A writer that must be explicitly finalized (flush trailing compressed
/// blocks, write footers/checksums) before the underlying sink is read back.
/// Dropping without calling `finish` may leave a truncated stream.
pub trait FinishableWriter: Write {
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

/// One registered compression codec.
pub trait Codec: Send + Sync {
    /// Stable identifier, e.g. `"gzip"`. Used in `by_id` lookups and CLI
    /// flags.
    fn id(&self) -> &'static str;

    /// Canonical file-extension suffix, e.g. `".gz"`. Empty for `none`.
    fn suffix(&self) -> &'static str;

    /// Wrap `inner` so that reads from the returned reader yield the
    /// decompressed byte stream. Must return EOF exactly once `inner` is
    /// exhausted and the trailing compressed framing has been consumed.
    fn new_reader(&self, inner: DynRead) -> Result<DynRead>;

    /// Wrap `inner` so that writes to the returned writer compress on the
    /// fly. The caller must call `finish()` on the returned writer before
    /// dropping it.
    fn new_writer(&self, inner: DynWrite) -> Result<DynWrite>;
}

/// Process-wide table of registered codecs, keyed by id. Initialized once at
/// startup with the four built-in codecs; further registration after the
/// registry has started serving lookups is a programmer error.
pub struct Registry {
    order: Vec<&'static str>,
    codecs: BTreeMap<&'static str, Box<dyn Codec>>,
}

impl Registry {
    /// A registry pre-populated with `none`, `gzip`, `lzma`, and `zstd`,
    /// matching the four compressors spec.md names.
    pub fn with_defaults() -> Self {
        let mut reg = Registry {
            order: Vec::new(),
            codecs: BTreeMap::new(),
        };
        reg.register(Box::new(none::NoneCodec)).expect("none is always first registration");
        reg.register(Box::new(gzip::GzipCodec)).expect("gzip registration is unique");
        reg.register(Box::new(lzma::LzmaCodec)).expect("lzma registration is unique");
        reg.register(Box::new(zstd_codec::ZstdCodec)).expect("zstd registration is unique");
        reg
    }

    /// Insert a codec. Duplicate ids are a programmer error surfaced as
    /// `Error::DuplicateId` rather than a panic, so callers assembling a
    /// registry from plugins can report it cleanly.
    pub fn register(&mut self, codec: Box<dyn Codec>) -> Result<()> {
        let id = codec.id();
        if self.codecs.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        self.order.push(id);
        self.codecs.insert(id, codec);
        Ok(())
    }

    pub fn by_id(&self, id: &str) -> Result<&dyn Codec> {
        self.codecs.get(id).map(|c| c.as_ref()).ok_or_else(|| Error::UnsupportedCompressor(id.to_string()))
    }

    /// Longest-matching suffix lookup; a name with no matching suffix (or no
    /// extension at all) resolves to the `none` codec.
    pub fn by_filename(&self, name: &str) -> &dyn Codec {
        let mut best: Option<&dyn Codec> = None;
        let mut best_len = 0usize;
        for id in &self.order {
            let codec = self.codecs[id].as_ref();
            let suffix = codec.suffix();
            if suffix.is_empty() {
                continue;
            }
            if name.ends_with(suffix) && suffix.len() > best_len {
                best = Some(codec);
                best_len = suffix.len();
            }
        }
        best.unwrap_or_else(|| self.codecs["none"].as_ref())
    }

    /// `none` first, then registration order.
    pub fn list_ids(&self) -> Vec<&'static str> {
        self.order.clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::io::Cursor;

    #[test]
    fn by_id_known_and_unknown() {
        let reg = Registry::with_defaults();
        assert_eq!(reg.by_id("gzip").unwrap().suffix(), ".gz");
        assert!(matches!(reg.by_id("brotli"), Err(Error::UnsupportedCompressor(id)) if id == "brotli"));
    }

    #[test]
    fn by_filename_longest_suffix_and_fallback() {
        let reg = Registry::with_defaults();
        assert_eq!(reg.by_filename("header.tar.gz").id(), "gzip");
        assert_eq!(reg.by_filename("header.tar.xz").id(), "lzma");
        assert_eq!(reg.by_filename("header.tar.zst").id(), "zstd");
        assert_eq!(reg.by_filename("header.tar").id(), "none");
        assert_eq!(reg.by_filename("no_extension_at_all").id(), "none");
    }

    #[test]
    fn list_ids_has_none_first() {
        let reg = Registry::with_defaults();
        let ids = reg.list_ids();
        assert_eq!(ids[0], "none");
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut reg = Registry::with_defaults();
        let err = reg.register(Box::new(gzip::GzipCodec)).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == "gzip"));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn round_trip(id: &str, payload: &[u8]) {
        let reg = Registry::with_defaults();
        let codec = reg.by_id(id).unwrap();

        let shared = SharedBuf::default();
        let sink: DynWrite = Box::new(IdentitySink(shared.clone()));
        let mut writer = codec.new_writer(sink).unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap();

        let compressed = shared.0.borrow().clone();
        let source: DynRead = Box::new(Cursor::new(compressed));
        let mut reader = codec.new_reader(source).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn gzip_round_trip() {
        round_trip("gzip", b"hello, gzip artifact");
    }

    #[test]
    fn lzma_round_trip() {
        round_trip("lzma", b"hello, lzma artifact");
    }

    #[test]
    fn zstd_round_trip() {
        round_trip("zstd", b"hello, zstd artifact");
    }

    #[test]
    fn none_round_trip() {
        round_trip("none", b"hello, uncompressed artifact");
    }
}
