//! The Artifact writer engine (spec.md §4.6, §9): assembles the outer
//! uncompressed tar (`version`, `manifest`, `manifest.sig`,
//! `manifest-augment`, `header.tar.*`, `header-augment.tar.*`,
//! `data/XXXX.tar.*`) from a set of already-configured payload handlers.
//!
//! `header.tar` and `manifest` are small and kept fully in memory, the way
//! `update-format-crau::delta_update` buffers its whole header before
//! writing it. Each payload's data archive is spooled to a scratch file
//! (`tempfile`) so its compressed-archive digest can be computed *before*
//! `manifest` is emitted — the mandated pre-hash pass followed by an emit
//! pass, since `manifest` must precede `data/*` in the outer tar even when
//! the sink cannot be seeked back into.

mod error;

use std::io::{Read, Seek, Write};
use std::path::Path;

pub use error::Error;

use crate::checksum::ChecksumStore;
use crate::compressor::{Codec, DynWrite, IdentitySink};
use crate::handlers::{append_json_entry, Handler, TarSink};
use crate::metadata::{ArtifactDepends, ArtifactProvides, HeaderInfo, HeaderInfoV3, Info, PayloadType, Record};
use crate::progress::{NoopObserver, ProgressEvent, ProgressObserver, Stage};
use crate::script_name::{ScriptEntry, ScriptName};
use crate::signer::Signer;
use crate::tar_utils::format_payload_index;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything `write_artifact` needs to assemble one Artifact. Handlers
/// arrive fully configured (provides/depends/meta-data/clears-provides are
/// each handler's own business, per spec.md §3.5); the writer only sequences
/// them into the container.
pub struct WriteArtifactArgs<'a> {
    pub version: u32,
    pub name: String,
    pub artifact_group: Option<String>,
    /// v1/v2 `compatible_devices`; v3 `artifact_depends.device_type`. May be
    /// empty only when `bootstrap` is set.
    pub devices: Vec<String>,
    pub depends_artifact_name: Option<Vec<String>>,
    pub depends_artifact_group: Option<Vec<String>>,
    pub bootstrap: bool,
    pub updates: Vec<Box<dyn Handler>>,
    pub scripts: Vec<ScriptEntry>,
    pub compressor: &'a dyn Codec,
    pub signer: Option<&'a dyn Signer>,
    pub progress: Option<&'a dyn ProgressObserver>,
    pub warn_size: Option<u64>,
    pub max_size: Option<u64>,
}

pub struct WrittenArtifact {
    pub name: String,
    pub version: u32,
    pub size: u64,
}

/// Forwards every write to `inner` while tallying the total bytes that have
/// passed through, so `write_artifact` can report `WrittenArtifact.size`
/// correctly even when `sink` is not `Seek` (no `stream_position` to read it
/// back from afterwards).
struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        CountingWriter { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Writes a complete Artifact to `sink`. No size-limit enforcement is done
/// here: `sink` need not be `Seek`, matching a non-seekable stream like
/// stdout (spec.md §4.6). Use [`write_artifact_to_path`] for the common case
/// of writing a regular file with `warn_size`/`max_size` enforced.
pub fn write_artifact<W: Write>(sink: W, args: WriteArtifactArgs) -> Result<WrittenArtifact> {
    let progress: &dyn ProgressObserver = args.progress.unwrap_or(&NoopObserver);

    validate_version(args.version)?;
    if args.signer.is_some() && args.version == 1 {
        return Err(Error::SignedV1Unsupported);
    }
    if args.updates.is_empty() {
        return Err(Error::NoPayloads);
    }
    if args.version == 1 && !args.scripts.is_empty() {
        return Err(Error::ScriptsUnsupportedInV1);
    }
    for script in &args.scripts {
        validate_script_name(args.version, &script.name)?;
    }

    let mut manifest = ChecksumStore::new();
    let mut augment_manifest = ChecksumStore::new();
    let has_augment = args.updates.iter().any(|h| h.has_augment());

    progress.notify(ProgressEvent::Stage(Stage::Version));
    let version_bytes = build_version_json(args.version)?;
    if args.version >= 2 {
        manifest.add("version", sha256_hex(&version_bytes))?;
    }

    progress.notify(ProgressEvent::Stage(Stage::Header));
    let header_tar = build_header_tar(&args)?;
    let header_compressed = compress_buffer(args.compressor, &header_tar)?;
    let header_suffix = args.compressor.suffix();
    if args.version >= 2 {
        manifest.add(format!("header.tar{header_suffix}"), sha256_hex(&header_compressed))?;
    }

    let header_augment_compressed = if has_augment {
        progress.notify(ProgressEvent::Stage(Stage::HeaderAugment));
        let raw = build_header_augment_tar(&args)?;
        let compressed = compress_buffer(args.compressor, &raw)?;
        augment_manifest.add(format!("header-augment.tar{header_suffix}"), sha256_hex(&compressed))?;
        Some(compressed)
    } else {
        None
    };

    // Pre-hash pass: spool each payload's compressed data archive to a
    // scratch file and record both its archive-level digest and each
    // contained file's digest into `manifest` now, so `manifest` can be
    // emitted before any `data/*` entry even on a non-seekable sink.
    let mut data_archives: Vec<Option<(tempfile::NamedTempFile, u64)>> = Vec::with_capacity(args.updates.len());
    for (idx, handler) in args.updates.iter().enumerate() {
        if handler.files().is_empty() {
            data_archives.push(None);
            continue;
        }
        let raw = build_data_tar(handler.as_ref(), idx)?;
        let (tmp, len) = compress_to_tempfile(args.compressor, &raw)?;

        if args.version >= 2 {
            let archive_digest = sha256_hex_reader(tmp.reopen()?)?;
            manifest.add(format!("data/{}.tar{header_suffix}", format_payload_index(idx)), archive_digest)?;
            for file in handler.files() {
                let checksum = file.checksum.clone().ok_or_else(|| Error::MissingChecksum(file.name.clone()))?;
                manifest.add(format!("data/{}/{}", format_payload_index(idx), file.name), checksum)?;
            }
        }

        data_archives.push(Some((tmp, len)));
    }

    progress.notify(ProgressEvent::Stage(Stage::Manifest));
    let manifest_bytes = manifest.get_raw().to_vec();
    let manifest_sig = match args.signer {
        Some(signer) if args.version >= 2 => {
            progress.notify(ProgressEvent::Stage(Stage::ManifestSignature));
            Some(signer.sign(&manifest_bytes)?)
        }
        _ => None,
    };

    let mut outer = tar::Builder::new(CountingWriter::new(sink));
    append_raw_entry(&mut outer, "version", &version_bytes, 0o644)?;
    if args.version >= 2 {
        append_raw_entry(&mut outer, "manifest", &manifest_bytes, 0o644)?;
    }
    if let Some(sig) = &manifest_sig {
        append_raw_entry(&mut outer, "manifest.sig", sig.as_bytes(), 0o644)?;
    }
    if has_augment {
        append_raw_entry(&mut outer, "manifest-augment", augment_manifest.get_raw(), 0o644)?;
    }
    append_raw_entry(&mut outer, &format!("header.tar{header_suffix}"), &header_compressed, 0o644)?;
    if let Some(compressed) = &header_augment_compressed {
        append_raw_entry(&mut outer, &format!("header-augment.tar{header_suffix}"), compressed, 0o644)?;
    }

    for (idx, archive) in data_archives.into_iter().enumerate() {
        if let Some((tmp, len)) = archive {
            progress.notify(ProgressEvent::Stage(Stage::Data { index: idx, name: format!("data/{}.tar{header_suffix}", format_payload_index(idx)) }));
            let mut reader = tmp.reopen()?;
            let mut header = tar::Header::new_gnu();
            header.set_size(len);
            header.set_mode(0o644);
            header.set_cksum();
            outer.append_data(&mut header, format!("data/{}.tar{header_suffix}", format_payload_index(idx)), &mut reader)?;
        }
    }

    let counting = outer.into_inner()?;

    Ok(WrittenArtifact { name: args.name, version: args.version, size: counting.count })
}

/// Writes an Artifact to a regular file at `path`, enforcing
/// `warn_size`/`max_size` (spec.md §4.6) via the file's final seek
/// position, and removing the partially-written file if anything fails.
pub fn write_artifact_to_path(path: impl AsRef<Path>, args: WriteArtifactArgs) -> Result<WrittenArtifact> {
    let path = path.as_ref();
    let warn_size = args.warn_size;
    let max_size = args.max_size;

    let file = std::fs::File::create(path)?;
    match write_artifact_seekable(file, args, warn_size, max_size) {
        Ok(written) => Ok(written),
        Err(err) => {
            let _ = std::fs::remove_file(path);
            Err(err)
        }
    }
}

fn write_artifact_seekable<W: Write + Seek>(mut sink: W, args: WriteArtifactArgs, warn_size: Option<u64>, max_size: Option<u64>) -> Result<WrittenArtifact> {
    let written = write_artifact(&mut sink, args)?;
    let actual = sink.stream_position()?;
    if let Some(limit) = max_size {
        if actual > limit {
            return Err(Error::ArtifactTooLarge { limit, actual });
        }
    }
    if let Some(limit) = warn_size {
        if actual > limit {
            log::warn!("artifact size {actual} exceeds the configured warning threshold of {limit}");
        }
    }
    Ok(WrittenArtifact { size: actual, ..written })
}

fn validate_version(version: u32) -> Result<()> {
    if Info::supported_versions().contains(&version) {
        Ok(())
    } else {
        Err(Error::UnsupportedVersion(version))
    }
}

fn validate_script_name(version: u32, name: &str) -> Result<()> {
    if version == 3 {
        ScriptName::parse_v3(name)?;
    } else {
        ScriptName::parse_v1v2(name)?;
    }
    Ok(())
}

fn build_version_json(version: u32) -> Result<Vec<u8>> {
    let info = match version {
        1 => Info::mender_v1(),
        2 => Info::mender_v2(),
        _ => Info::mender_v3(),
    };
    Ok(info.to_json()?)
}

fn build_header_info_json(args: &WriteArtifactArgs) -> Result<Vec<u8>> {
    if args.version == 3 {
        let header_info = HeaderInfoV3 {
            payloads: args.updates.iter().map(|h| PayloadType { type_: h.update_type() }).collect(),
            artifact_provides: ArtifactProvides { artifact_name: args.name.clone(), artifact_group: args.artifact_group.clone() },
            artifact_depends: ArtifactDepends {
                artifact_name: args.depends_artifact_name.clone(),
                device_type: args.devices.clone(),
                artifact_group: args.depends_artifact_group.clone(),
            },
        };
        header_info.validate().map_err(crate::metadata::Error::Validation)?;
        if header_info.artifact_depends.device_type.is_empty() && !args.bootstrap {
            return Err(Error::EmptyDeviceType);
        }
        Ok(header_info.to_json()?)
    } else {
        let header_info = HeaderInfo {
            updates: args.updates.iter().map(|h| PayloadType { type_: h.update_type() }).collect(),
            compatible_devices: args.devices.clone(),
            artifact_name: args.name.clone(),
            artifact_group: args.artifact_group.clone(),
        };
        header_info.validate().map_err(crate::metadata::Error::Validation)?;
        if header_info.compatible_devices.is_empty() && !args.bootstrap {
            return Err(Error::EmptyDeviceType);
        }
        Ok(header_info.to_json()?)
    }
}

fn build_header_tar(args: &WriteArtifactArgs) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    {
        let mut builder: TarSink = tar::Builder::new(&mut raw as &mut dyn Write);

        let header_info_bytes = build_header_info_json(args)?;
        append_json_entry(&mut builder, "header-info", &header_info_bytes)?;

        for script in &args.scripts {
            append_raw_entry(&mut builder, &format!("scripts/{}", script.name), &script.contents, 0o755)?;
        }

        for (idx, handler) in args.updates.iter().enumerate() {
            handler.compose_header(&mut builder, idx)?;
        }

        builder.finish()?;
    }
    Ok(raw)
}

/// The augmented header's `header-info` mirrors the primary payload type
/// list rather than independently overriding `payloads[*].type`: the
/// effective type override for an augmented payload is carried entirely by
/// that payload's `headers/XXXX/type-info.type`, which is what
/// `ModuleImage::merge_augment` actually consults.
fn build_header_augment_tar(args: &WriteArtifactArgs) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    {
        let mut builder: TarSink = tar::Builder::new(&mut raw as &mut dyn Write);

        let header_info = HeaderInfoV3 {
            payloads: args.updates.iter().map(|h| PayloadType { type_: h.update_type() }).collect(),
            artifact_provides: ArtifactProvides { artifact_name: args.name.clone(), artifact_group: args.artifact_group.clone() },
            artifact_depends: ArtifactDepends {
                artifact_name: args.depends_artifact_name.clone(),
                device_type: args.devices.clone(),
                artifact_group: args.depends_artifact_group.clone(),
            },
        };
        append_json_entry(&mut builder, "header-info", &header_info.to_json()?)?;

        for (idx, handler) in args.updates.iter().enumerate() {
            if handler.has_augment() {
                handler.compose_augment_header(&mut builder, idx)?;
            }
        }

        builder.finish()?;
    }
    Ok(raw)
}

fn build_data_tar(handler: &dyn Handler, index: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    {
        let mut builder: TarSink = tar::Builder::new(&mut raw as &mut dyn Write);
        handler.compose_data(&mut builder, index)?;
        builder.finish()?;
    }
    Ok(raw)
}

fn append_raw_entry(out: &mut tar::Builder<impl Write>, path: &str, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    out.append_data(&mut header, path, bytes)
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

fn sha256_hex_reader(mut r: impl Read) -> std::io::Result<String> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compresses `raw` fully into memory, for the small `header.tar`/
/// `header-augment.tar` buffers.
fn compress_buffer(codec: &dyn Codec, raw: &[u8]) -> Result<Vec<u8>> {
    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let shared = SharedBuf::default();
    let sink: DynWrite = Box::new(IdentitySink(shared.clone()));
    let mut writer = codec.new_writer(sink)?;
    writer.write_all(raw)?;
    writer.finish()?;
    Ok(shared.0.borrow().clone())
}

/// Compresses `raw` into a scratch file, for a payload's data archive: the
/// pre-hash pass reads it back once to compute the digest, and the emit
/// pass streams it into the outer tar afterward.
fn compress_to_tempfile(codec: &dyn Codec, raw: &[u8]) -> Result<(tempfile::NamedTempFile, u64)> {
    let tmp = tempfile::NamedTempFile::new()?;
    {
        let handle = tmp.reopen()?;
        let sink: DynWrite = Box::new(IdentitySink(handle));
        let mut writer = codec.new_writer(sink)?;
        writer.write_all(raw)?;
        writer.finish()?;
    }
    let len = tmp.as_file().metadata()?.len();
    Ok((tmp, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Registry;
    use crate::handlers::RootfsV2;
    use std::io::Write as _;

    fn sample_payload() -> (tempfile::NamedTempFile, Box<dyn Handler>) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"rootfs bytes").unwrap();
        let handler: Box<dyn Handler> = Box::new(RootfsV2::new(tmp.path()).unwrap());
        (tmp, handler)
    }

    #[test]
    fn rejects_unsupported_version() {
        let registry = Registry::with_defaults();
        let (_tmp, handler) = sample_payload();
        let args = WriteArtifactArgs {
            version: 9,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: vec![handler],
            scripts: Vec::new(),
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let err = write_artifact(Vec::new(), args).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_empty_payload_list() {
        let registry = Registry::with_defaults();
        let args = WriteArtifactArgs {
            version: 2,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: Vec::new(),
            scripts: Vec::new(),
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let err = write_artifact(Vec::new(), args).unwrap_err();
        assert!(matches!(err, Error::NoPayloads));
    }

    #[test]
    fn writes_v2_artifact_with_manifest_and_data() {
        let registry = Registry::with_defaults();
        let (_tmp, handler) = sample_payload();
        let args = WriteArtifactArgs {
            version: 2,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: vec![handler],
            scripts: Vec::new(),
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let mut out = Vec::new();
        write_artifact(&mut out, args).unwrap();

        let mut archive = tar::Archive::new(out.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["version", "manifest", "header.tar", "data/0000.tar"]);
    }

    #[test]
    fn v1_with_signer_is_rejected() {
        use crate::signer::pki::PkiSigner;
        use crate::signer::test_support::rsa_test_key;
        use rsa::pkcs8::EncodePrivateKey;

        let registry = Registry::with_defaults();
        let (_tmp, handler) = sample_payload();
        let key = rsa_test_key();
        let pem = key.to_pkcs8_pem(Default::default()).unwrap();
        let signer = PkiSigner::from_private_key_pem(&pem).unwrap();

        let args = WriteArtifactArgs {
            version: 1,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: vec![handler],
            scripts: Vec::new(),
            compressor: registry.by_id("none").unwrap(),
            signer: Some(&signer),
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let err = write_artifact(Vec::new(), args).unwrap_err();
        assert!(matches!(err, Error::SignedV1Unsupported));
    }

    #[test]
    fn v1_with_scripts_is_rejected() {
        let registry = Registry::with_defaults();
        let (_tmp, handler) = sample_payload();
        let args = WriteArtifactArgs {
            version: 1,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: vec![handler],
            scripts: vec![ScriptEntry { name: "10_ArtifactInstall.Enter.hook".to_string(), contents: b"#!/bin/sh\n".to_vec() }],
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let err = write_artifact(Vec::new(), args).unwrap_err();
        assert!(matches!(err, Error::ScriptsUnsupportedInV1));
    }

    #[test]
    fn rejects_malformed_script_name() {
        let registry = Registry::with_defaults();
        let (_tmp, handler) = sample_payload();
        let args = WriteArtifactArgs {
            version: 2,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: vec![handler],
            scripts: vec![ScriptEntry { name: "not-a-valid-name".to_string(), contents: Vec::new() }],
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let err = write_artifact(Vec::new(), args).unwrap_err();
        assert!(matches!(err, Error::InvalidScriptName(_)));
    }

    #[test]
    fn to_path_removes_file_on_failure() {
        let registry = Registry::with_defaults();
        let args = WriteArtifactArgs {
            version: 2,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["qemu".to_string()],
            depends_artifact_name: None,
            depends_artifact_group: None,
            bootstrap: false,
            updates: Vec::new(),
            scripts: Vec::new(),
            compressor: registry.by_id("none").unwrap(),
            signer: None,
            progress: None,
            warn_size: None,
            max_size: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mender");
        let err = write_artifact_to_path(&path, args).unwrap_err();
        assert!(matches!(err, Error::NoPayloads));
        assert!(!path.exists());
    }
}
