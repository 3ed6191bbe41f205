//! The Artifact reader engine (spec.md §4.6, §9): a two-phase read over the
//! outer tar — `open()` parses `version`/`manifest`/`manifest.sig`/
//! `manifest-augment`/`header.tar.*`/`header-augment.tar.*` and instantiates
//! one handler per payload, `install_payloads()` then streams each
//! `data/XXXX.tar.*` archive through the matching handler's `install`.
//! Splitting the two lets a caller inspect the header (compatible devices,
//! provides/depends, scripts) before committing to installing any payload
//! bytes.

mod error;

use std::collections::HashSet;
use std::io::Read;
use std::iter::Peekable;

pub use error::Error;

use crate::checksum::{ChecksumStore, ReaderChecksum};
use crate::compressor::Registry as CompressorRegistry;
use crate::handlers::{Handler, HandlerRegistry};
use crate::metadata::{ArtifactDepends, ArtifactProvides, HeaderInfo, HeaderInfoV3, Info, PayloadType, Record};
use crate::progress::{NoopObserver, ProgressEvent, ProgressObserver, Stage};
use crate::script_name::ScriptEntry;
use crate::signer::Signer;
use crate::tar_utils::{is_safe_relative_path, parse_payload_index};

pub type Result<T> = std::result::Result<T, Error>;

/// The parsed `header-info` plus any lifecycle scripts, decoupled from the
/// version-specific JSON shape it came from.
#[derive(Debug, Clone)]
pub struct ArtifactHeader {
    pub info: Info,
    pub artifact_name: String,
    pub artifact_group: Option<String>,
    pub compatible_devices: Vec<String>,
    pub depends_artifact_name: Option<Vec<String>>,
    pub depends_artifact_group: Option<Vec<String>>,
    pub scripts: Vec<ScriptEntry>,
}

/// `open()` inputs. `registry: None` makes the reader build a default
/// `rootfs-image`-only registry for the version it just read off `version`
/// — the caller does not know the artifact's version yet at the point it
/// would otherwise have to supply one.
pub struct ReadArtifactOptions<'a> {
    pub registry: Option<HandlerRegistry>,
    /// Supplying a verifier means the artifact is required to carry a
    /// matching `manifest.sig`; supplying none means it must not carry one.
    pub verify_signature: Option<&'a dyn Signer>,
    pub compatible_devices: Option<&'a dyn Fn(&[String]) -> bool>,
    pub progress: Option<&'a dyn ProgressObserver>,
}

impl<'a> Default for ReadArtifactOptions<'a> {
    fn default() -> Self {
        ReadArtifactOptions { registry: None, verify_signature: None, compatible_devices: None, progress: None }
    }
}

pub struct ArtifactReader<R: Read + 'static> {
    // Declared before `archive` so it is dropped first -- see the SAFETY
    // note in `open()`.
    entries: Peekable<tar::Entries<'static, R>>,
    // Never read directly; kept alive only to back `entries`' borrow.
    #[allow(dead_code)]
    archive: Box<tar::Archive<R>>,
    compressors: CompressorRegistry,
    version: u32,
    manifest: ChecksumStore,
    augment_manifest: Option<ChecksumStore>,
    header: ArtifactHeader,
    handlers: Vec<Box<dyn Handler>>,
    data_seen: Vec<bool>,
}

impl<R: Read + 'static> ArtifactReader<R> {
    /// Reads `version` through `header-augment.tar.*` and instantiates one
    /// handler per payload; does not touch any `data/XXXX.tar.*` entry.
    pub fn open(source: R, options: ReadArtifactOptions) -> Result<Self> {
        let progress: &dyn ProgressObserver = options.progress.unwrap_or(&NoopObserver);
        let compressors = CompressorRegistry::with_defaults();

        // `tar::Archive::entries()` can only be called once per archive --
        // it errors if called again once the read position has advanced
        // past zero -- but this reader's public API deliberately splits
        // parsing the header (`open`) from installing payload data
        // (`install_payloads`), so the one forward-only `Entries` iterator
        // it starts here has to survive the gap between those two calls
        // instead of being re-derived from the archive a second time.
        //
        // SAFETY: `archive` is heap-allocated via `Box`, so its address is
        // stable even when the `ArtifactReader` that owns it is moved (only
        // the `Box` handle moves). `entries` borrows `*archive` for an
        // invented `'static` lifetime; nothing else ever forms a reference
        // to `*archive` for as long as `entries` is alive, and `entries` is
        // declared ahead of `archive` in the struct so it is dropped first.
        let mut archive: Box<tar::Archive<R>> = Box::new(tar::Archive::new(source));
        let archive_ptr: *mut tar::Archive<R> = &mut *archive;
        let mut entries: Peekable<tar::Entries<'static, R>> = unsafe {
            let archive_ref: &'static mut tar::Archive<R> = &mut *archive_ptr;
            archive_ref.entries()?.peekable()
        };

        progress.notify(ProgressEvent::Stage(Stage::Version));
        let version_bytes = read_exact_entry(&mut entries, "version")?;
        let (info, _) = Info::write(&version_bytes)?;
        if !Info::supported_versions().contains(&info.version) {
            return Err(Error::UnsupportedVersion(info.version));
        }
        if info.format != "mender" {
            return Err(crate::metadata::Error::Validation(vec![format!("unsupported format {:?}", info.format)]).into());
        }
        let version = info.version;

        let mut manifest = ChecksumStore::new();
        if version >= 2 {
            progress.notify(ProgressEvent::Stage(Stage::Manifest));
            let manifest_bytes = read_exact_entry(&mut entries, "manifest")?;
            manifest = ChecksumStore::read_raw(&manifest_bytes)?;

            let computed = sha256_hex(&version_bytes);
            let expected = manifest.get("version")?.to_string();
            if expected != computed {
                return Err(Error::VersionMismatch { expected, actual: computed });
            }

            let signature = if peeked_path(&mut entries)?.as_deref() == Some("manifest.sig") {
                let bytes = read_exact_entry(&mut entries, "manifest.sig")?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                None
            };
            match (&signature, options.verify_signature) {
                (Some(sig), Some(verifier)) => verifier.verify(manifest.get_raw(), sig)?,
                (Some(_), None) => return Err(Error::SignedButNoKey),
                (None, Some(_)) => return Err(Error::UnsignedButKeySupplied),
                (None, None) => {}
            }
        }

        let augment_manifest = if peeked_path(&mut entries)?.as_deref() == Some("manifest-augment") {
            let bytes = read_exact_entry(&mut entries, "manifest-augment")?;
            Some(ChecksumStore::read_raw(&bytes)?)
        } else {
            None
        };

        progress.notify(ProgressEvent::Stage(Stage::Header));
        let header_path = peeked_path(&mut entries)?.ok_or(Error::MissingEntry("header.tar"))?;
        if !is_header_tar_name(&header_path) {
            return Err(Error::UnexpectedEntry(header_path));
        }
        let header_entry = entries.next().ok_or(Error::MissingEntry("header.tar"))??;
        let expected_digest = if version >= 2 { Some(manifest.get(&header_path)?.to_string()) } else { None };
        let checksum_reader = ReaderChecksum::new(header_entry, header_path.clone(), expected_digest);
        let decompressed = compressors.by_filename(&header_path).new_reader(Box::new(checksum_reader))?;

        let (header_info, registry_source) = parse_header_tar(decompressed, version)?;
        let registry = options.registry.unwrap_or_else(|| HandlerRegistry::with_default_rootfs(version));
        let mut handlers: Vec<Box<dyn Handler>> = header_info
            .payload_types
            .iter()
            .map(|pt| registry.instantiate(pt.type_.as_deref()))
            .collect();

        if let Some(check) = options.compatible_devices {
            if !check(&header_info.compatible_devices) {
                return Err(Error::IncompatibleDevice);
            }
        }

        for (path, contents) in registry_source {
            dispatch_header_entry(&mut handlers, &path, &contents, version, false)?;
        }

        let header = ArtifactHeader {
            info,
            artifact_name: header_info.artifact_name,
            artifact_group: header_info.artifact_group,
            compatible_devices: header_info.compatible_devices,
            depends_artifact_name: header_info.depends_artifact_name,
            depends_artifact_group: header_info.depends_artifact_group,
            scripts: header_info.scripts,
        };

        let has_augment_entry = peeked_path(&mut entries)?.as_deref().is_some_and(is_header_augment_tar_name);
        if has_augment_entry {
            progress.notify(ProgressEvent::Stage(Stage::HeaderAugment));
            let augment_path = peeked_path(&mut entries)?.expect("checked above");
            let augment_entry = entries.next().ok_or(Error::MissingEntry("header-augment.tar"))??;
            let expected_digest = match &augment_manifest {
                Some(store) => Some(store.get(&augment_path)?.to_string()),
                None => None,
            };
            let checksum_reader = ReaderChecksum::new(augment_entry, augment_path.clone(), expected_digest);
            let decompressed = compressors.by_filename(&augment_path).new_reader(Box::new(checksum_reader))?;
            let augment_entries = read_inner_entries(decompressed)?;
            for (path, contents) in augment_entries {
                if path == "header-info" {
                    continue;
                }
                dispatch_header_entry(&mut handlers, &path, &contents, version, true)?;
            }
            for handler in handlers.iter_mut() {
                handler.merge_augment()?;
            }
        }

        let data_seen = vec![false; handlers.len()];
        Ok(ArtifactReader { entries, archive, compressors, version, manifest, augment_manifest, header, handlers, data_seen })
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn handlers(&self) -> &[Box<dyn Handler>] {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut [Box<dyn Handler>] {
        &mut self.handlers
    }

    /// Streams every remaining `data/XXXX.tar.*` entry into its handler's
    /// `install`. Every non-bootstrap handler (`update_type().is_some()`)
    /// must have had a data archive in the artifact; a bootstrap payload
    /// never gets one (spec.md §4.5.4).
    pub fn install_payloads(&mut self) -> Result<()> {
        while let Some(path) = peeked_path(&mut self.entries)? {
            if !path.starts_with("data/") {
                return Err(Error::UnexpectedEntry(path));
            }
            let index = parse_data_archive_index(&path).ok_or_else(|| Error::UnexpectedEntry(path.clone()))?;
            if index >= self.handlers.len() {
                return Err(Error::UnexpectedEntry(path));
            }

            let entry = self.entries.next().ok_or(Error::MissingEntry("data/XXXX.tar"))??;

            let expected_digest = if self.version >= 2 { Some(self.manifest.get(&path)?.to_string()) } else { None };
            let checksum_reader = ReaderChecksum::new(entry, path.clone(), expected_digest);
            let decompressed = self.compressors.by_filename(&path).new_reader(Box::new(checksum_reader))?;

            self.install_one_archive(index, &path, decompressed)?;
            self.data_seen[index] = true;
        }

        for (index, handler) in self.handlers.iter().enumerate() {
            if handler.update_type().is_some() && !self.data_seen[index] {
                return Err(Error::MissingDataFile { index, name: "<any>".to_string() });
            }
        }

        Ok(())
    }

    fn install_one_archive(&mut self, index: usize, archive_path: &str, decompressed: crate::compressor::DynRead) -> Result<()> {
        let accepts_unknown = self.handlers[index].accepts_unknown_data_files();
        let declared: Vec<String> = self.handlers[index].files().iter().map(|f| f.name.clone()).collect();
        let require_known = !declared.is_empty() && !accepts_unknown;

        let mut seen = HashSet::new();
        let mut inner_archive = tar::Archive::new(decompressed);
        let mut inner_entries = inner_archive.entries()?;
        while let Some(entry) = inner_entries.next() {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if !is_safe_relative_path(&name) {
                return Err(Error::PathTraversal(name));
            }
            if require_known && !declared.iter().any(|d| d == &name) {
                return Err(Error::UnexpectedDataFile(name));
            }
            let size = entry.header().size()?;

            let per_file_digest = if self.version >= 2 {
                Some(self.manifest.get(&format!("data/{:04}/{}", index, name))?.to_string())
            } else {
                None
            };
            let mut checksum_reader = ReaderChecksum::new(entry, format!("{archive_path}:{name}"), per_file_digest);
            self.handlers[index].install(&name, &mut checksum_reader, size)?;
            // Force the EOF check: drain anything the handler didn't itself
            // read to completion.
            std::io::copy(&mut checksum_reader, &mut std::io::sink())?;

            seen.insert(name);
        }

        for name in &declared {
            if require_known && !seen.contains(name) {
                return Err(Error::MissingDataFile { index, name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Reads `version` through `install_payloads` in one call, for the common
/// case of installing everything immediately.
pub fn read_artifact<R: Read + 'static>(source: R, options: ReadArtifactOptions) -> Result<ArtifactReader<R>> {
    let mut reader = ArtifactReader::open(source, options)?;
    reader.install_payloads()?;
    Ok(reader)
}

struct ParsedHeaderInfo {
    payload_types: Vec<PayloadType>,
    artifact_name: String,
    artifact_group: Option<String>,
    compatible_devices: Vec<String>,
    depends_artifact_name: Option<Vec<String>>,
    depends_artifact_group: Option<Vec<String>>,
    scripts: Vec<ScriptEntry>,
}

/// Decodes one `header.tar.*` stream into its `header-info` and the raw
/// `(path, contents)` pairs of every other entry, already validated for
/// path-safety; `scripts/*` entries are split out, the rest handed back for
/// per-handler dispatch by the caller (so this function stays ignorant of
/// the handler list it will eventually feed).
fn parse_header_tar(decompressed: crate::compressor::DynRead, version: u32) -> Result<(ParsedHeaderInfo, Vec<(String, Vec<u8>)>)> {
    let mut entries = read_inner_entries(decompressed)?;
    if entries.is_empty() || entries[0].0 != "header-info" {
        return Err(Error::MissingEntry("header-info"));
    }
    let (_, header_info_bytes) = entries.remove(0);

    let (payload_types, artifact_name, artifact_group, compatible_devices, depends_artifact_name, depends_artifact_group) = if version == 3 {
        let (parsed, _) = HeaderInfoV3::write(&header_info_bytes)?;
        parsed.validate().map_err(crate::metadata::Error::Validation)?;
        let ArtifactProvides { artifact_name, artifact_group } = parsed.artifact_provides;
        let ArtifactDepends { artifact_name: depends_artifact_name, device_type, artifact_group: depends_artifact_group } = parsed.artifact_depends;
        (parsed.payloads, artifact_name, artifact_group, device_type, depends_artifact_name, depends_artifact_group)
    } else {
        let (parsed, _) = HeaderInfo::write(&header_info_bytes)?;
        parsed.validate().map_err(crate::metadata::Error::Validation)?;
        (parsed.updates, parsed.artifact_name, parsed.artifact_group, parsed.compatible_devices, None, None)
    };

    let mut scripts = Vec::new();
    let mut rest = Vec::new();
    for (path, contents) in entries {
        if let Some(name) = path.strip_prefix("scripts/") {
            if version == 1 {
                return Err(Error::UnexpectedEntry(path.clone()));
            }
            scripts.push(ScriptEntry { name: name.to_string(), contents });
        } else {
            rest.push((path, contents));
        }
    }

    Ok((
        ParsedHeaderInfo { payload_types, artifact_name, artifact_group, compatible_devices, depends_artifact_name, depends_artifact_group, scripts },
        rest,
    ))
}

/// Reads every entry of a decoded inner tar (`header.tar`/
/// `header-augment.tar`/a `data/XXXX.tar`) into memory, checking each path
/// for traversal before handing it back. Draining fully here is what forces
/// the archive-level `ReaderChecksum`'s EOF check to fire.
fn read_inner_entries(decompressed: crate::compressor::DynRead) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(decompressed);
    let mut out = Vec::new();
    let mut entries = archive.entries()?;
    while let Some(entry) = entries.next() {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if !is_safe_relative_path(&path) {
            return Err(Error::PathTraversal(path));
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        out.push((path, contents));
    }
    Ok(out)
}

fn dispatch_header_entry(handlers: &mut [Box<dyn Handler>], path: &str, contents: &[u8], version: u32, augmented: bool) -> Result<()> {
    let mut components = path.splitn(3, '/');
    let first = components.next().unwrap_or("");
    if first != "headers" {
        return Err(Error::UnexpectedEntry(path.to_string()));
    }
    let idx_component = components.next().ok_or_else(|| Error::UnexpectedEntry(path.to_string()))?;
    let index = parse_payload_index(idx_component).ok_or_else(|| Error::UnexpectedEntry(path.to_string()))?;
    let handler = handlers.get_mut(index).ok_or_else(|| Error::UnexpectedEntry(path.to_string()))?;
    handler.read_header(path, contents, version, augmented)?;
    Ok(())
}

fn is_header_tar_name(name: &str) -> bool {
    name == "header.tar" || name.starts_with("header.tar.")
}

fn is_header_augment_tar_name(name: &str) -> bool {
    name == "header-augment.tar" || name.starts_with("header-augment.tar.")
}

fn parse_data_archive_index(name: &str) -> Option<usize> {
    let rest = name.strip_prefix("data/")?;
    let idx_str = rest.split(".tar").next()?;
    parse_payload_index(idx_str)
}

fn peeked_path<R: Read>(entries: &mut Peekable<tar::Entries<'_, R>>) -> Result<Option<String>> {
    match entries.peek() {
        Some(Ok(entry)) => Ok(Some(entry.path()?.to_string_lossy().into_owned())),
        Some(Err(_)) => match entries.next() {
            Some(Err(err)) => Err(Error::Io(err)),
            _ => unreachable!("peek just observed an Err"),
        },
        None => Ok(None),
    }
}

fn read_exact_entry<R: Read>(entries: &mut Peekable<tar::Entries<'_, R>>, expected: &'static str) -> Result<Vec<u8>> {
    let path = peeked_path(entries)?.ok_or(Error::MissingEntry(expected))?;
    if path != expected {
        return Err(Error::UnexpectedEntry(format!("expected {expected}, found {path}")));
    }
    let mut entry = entries.next().ok_or(Error::MissingEntry(expected))??;
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::RootfsV2;
    use crate::writer::{write_artifact, WriteArtifactArgs};
    use std::io::Cursor;
    use std::io::Write as _;

    fn build_v2_artifact() -> Vec<u8> {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"rootfs bytes").unwrap();
        let handler: Box<dyn Handler> = Box::new(RootfsV2::new(tmp.path()).unwrap());
        let registry = crate::compressor::Registry::with_defaults();

        let args = WriteArtifactArgs {
            version: 2,
            name: "release-1".to_string(),
            artifact_group: None,
            devices: vec!["vexpress-qemu".to_string()],
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
        out
    }

    #[test]
    fn round_trips_a_v2_artifact() {
        let bytes = build_v2_artifact();
        let mut reader = ArtifactReader::open(Cursor::new(bytes), ReadArtifactOptions::default()).unwrap();
        assert_eq!(reader.header().artifact_name, "release-1");
        assert_eq!(reader.header().compatible_devices, vec!["vexpress-qemu".to_string()]);

        reader.install_payloads().unwrap();
        assert_eq!(reader.handlers()[0].update_type().as_deref(), Some("rootfs-image"));
        assert_eq!(reader.handlers()[0].files()[0].size, "rootfs bytes".len() as u64);
    }

    #[test]
    fn rejects_tampered_data_archive() {
        let mut bytes = build_v2_artifact();
        // Flip a byte inside the data archive to break its checksum.
        let pos = bytes.len() - 20;
        bytes[pos] ^= 0xff;

        let mut reader = ArtifactReader::open(Cursor::new(bytes), ReadArtifactOptions::default()).unwrap();
        let err = reader.install_payloads().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn rejects_incompatible_device() {
        let bytes = build_v2_artifact();
        let check: &dyn Fn(&[String]) -> bool = &|devices: &[String]| devices.iter().any(|d| d == "other-device");
        let options = ReadArtifactOptions { compatible_devices: Some(check), ..Default::default() };
        let err = ArtifactReader::open(Cursor::new(bytes), options).unwrap_err();
        assert!(matches!(err, Error::IncompatibleDevice));
    }

    #[test]
    fn rejects_unsigned_artifact_when_key_supplied() {
        use crate::signer::pki::PkiSigner;
        use crate::signer::test_support::rsa_test_key;
        use rsa::pkcs8::EncodePrivateKey;

        let bytes = build_v2_artifact();
        let key = rsa_test_key();
        let pem = key.to_pkcs8_pem(Default::default()).unwrap();
        let signer = PkiSigner::from_private_key_pem(&pem).unwrap();

        let options = ReadArtifactOptions { verify_signature: Some(&signer), ..Default::default() };
        let err = ArtifactReader::open(Cursor::new(bytes), options).unwrap_err();
        assert!(matches!(err, Error::UnsignedButKeySupplied));
    }
}
