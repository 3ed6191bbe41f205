use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use sha2::{Digest, Sha256};

use super::{append_json_entry, DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Record, StringOrList, TypeInfoV3};
use crate::tar_utils::format_payload_index;

/// Which key the auto-populated checksum provide is written under.
/// Readers must tolerate either (spec.md §9 Open Question 2); the writer
/// picks one per handler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyChecksumKeyStyle {
    Modern,
    Legacy,
}

impl LegacyChecksumKeyStyle {
    fn key(self) -> &'static str {
        match self {
            LegacyChecksumKeyStyle::Modern => "rootfs-image.checksum",
            LegacyChecksumKeyStyle::Legacy => "rootfs_image_checksum",
        }
    }
}

/// v3 `rootfs-image` payload. Unlike v1/v2 there is no `files` entry in the
/// header at all — the single data file's checksum is instead surfaced as
/// an `artifact_provides` entry (spec.md §4.5.2), computed up front when
/// composing and confirmed against the manifest when installing.
pub struct RootfsV3 {
    file: Option<DataFile>,
    checksum_key_style: LegacyChecksumKeyStyle,
    no_checksum_provide: bool,
    no_default_clears_provides: bool,
    /// Set on read from the artifact's own `clears_artifact_provides`,
    /// taking priority over a freshly-computed default so a read/write
    /// round trip reflects what was actually on disk.
    parsed_clears: Option<Vec<String>>,
    installed: bool,
}

/// Default `clears_artifact_provides` for a rootfs-image payload with no
/// user override (spec.md §4.4).
const DEFAULT_CLEARS_PROVIDES: [&str; 3] = ["artifact_group", "rootfs_image_checksum", "rootfs-image.*"];

impl Default for RootfsV3 {
    fn default() -> Self {
        RootfsV3 {
            file: None,
            checksum_key_style: LegacyChecksumKeyStyle::Modern,
            no_checksum_provide: false,
            no_default_clears_provides: false,
            parsed_clears: None,
            installed: false,
        }
    }
}

impl RootfsV3 {
    pub fn new(path: impl Into<std::path::PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("rootfs.img").to_string();

        let mut file = File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let checksum = hex::encode(hasher.finalize());

        Ok(RootfsV3 {
            file: Some(DataFile { name, size, checksum: Some(checksum), source: Some(path) }),
            checksum_key_style: LegacyChecksumKeyStyle::Modern,
            no_checksum_provide: false,
            no_default_clears_provides: false,
            parsed_clears: None,
            installed: false,
        })
    }

    pub fn with_checksum_key_style(mut self, style: LegacyChecksumKeyStyle) -> Self {
        self.checksum_key_style = style;
        self
    }

    pub fn with_no_checksum_provide(mut self, no_checksum_provide: bool) -> Self {
        self.no_checksum_provide = no_checksum_provide;
        self
    }

    /// Suppresses the default `clears_artifact_provides` (spec.md §4.4);
    /// set by a writer-wide `no_default_clears_provides` option.
    pub fn with_no_default_clears_provides(mut self, no_default_clears_provides: bool) -> Self {
        self.no_default_clears_provides = no_default_clears_provides;
        self
    }

    fn clears_provides(&self) -> Vec<String> {
        if self.no_default_clears_provides {
            Vec::new()
        } else {
            DEFAULT_CLEARS_PROVIDES.iter().map(|s| s.to_string()).collect()
        }
    }
}

impl Handler for RootfsV3 {
    fn update_type(&self) -> Option<String> {
        Some("rootfs-image".to_string())
    }

    fn files(&self) -> &[DataFile] {
        match &self.file {
            Some(f) => std::slice::from_ref(f),
            None => &[],
        }
    }

    fn compose_header(&self, out: &mut TarSink<'_>, index: usize) -> Result<()> {
        let idx = format_payload_index(index);

        let mut type_info = TypeInfoV3 { type_: Some("rootfs-image".to_string()), ..Default::default() };
        if !self.no_checksum_provide {
            if let Some(file) = &self.file {
                if let Some(checksum) = &file.checksum {
                    let mut provides = BTreeMap::new();
                    provides.insert(self.checksum_key_style.key().to_string(), StringOrList::One(checksum.clone()));
                    type_info.artifact_provides = Some(provides);
                }
            }
        }
        let clears = self.clears_provides();
        if !clears.is_empty() {
            type_info.clears_artifact_provides = Some(clears);
        }
        append_json_entry(out, &format!("headers/{idx}/type-info"), &type_info.to_json()?)?;

        Ok(())
    }

    fn compose_data(&self, out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        let file = self.file.as_ref().expect("compose_data called before a source file was set");
        let source = file.source.as_ref().expect("compose_data called on a handler with no backing file");

        let mut reader = File::open(source)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(file.size);
        header.set_mode(0o644);
        header.set_cksum();
        out.append_data(&mut header, &file.name, &mut reader)?;
        Ok(())
    }

    fn read_header(&mut self, relative_path: &str, contents: &[u8], _version: u32, _augmented: bool) -> Result<()> {
        let leaf = relative_path.rsplit('/').next().unwrap_or(relative_path);

        if leaf == "files" {
            return Err(Error::UnexpectedFilesEntryInV3);
        } else if leaf == "type-info" {
            let (type_info, _) = TypeInfoV3::write(contents)?;
            type_info.validate().map_err(crate::metadata::Error::Validation)?;
            if type_info.type_.as_deref() != Some("rootfs-image") {
                return Err(Error::UnexpectedFile(format!("unexpected type {:?}", type_info.type_)));
            }
            if let Some(provides) = &type_info.artifact_provides {
                if provides.contains_key(LegacyChecksumKeyStyle::Legacy.key()) {
                    self.checksum_key_style = LegacyChecksumKeyStyle::Legacy;
                } else if provides.contains_key(LegacyChecksumKeyStyle::Modern.key()) {
                    self.checksum_key_style = LegacyChecksumKeyStyle::Modern;
                } else {
                    self.no_checksum_provide = true;
                }
            } else {
                self.no_checksum_provide = true;
            }
            self.parsed_clears = type_info.clears_artifact_provides.clone();
        } else {
            return Err(Error::UnexpectedFile(relative_path.to_string()));
        }
        Ok(())
    }

    fn install(&mut self, name: &str, payload: &mut dyn Read, size: u64) -> Result<()> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = payload.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        self.file = Some(DataFile { name: name.to_string(), size, checksum: Some(hex::encode(hasher.finalize())), source: None });
        self.installed = true;
        Ok(())
    }

    fn get_provides(&self) -> BTreeMap<String, StringOrList> {
        let mut provides = BTreeMap::new();
        if self.no_checksum_provide {
            return provides;
        }
        if let Some(file) = &self.file {
            if let Some(checksum) = &file.checksum {
                provides.insert(self.checksum_key_style.key().to_string(), StringOrList::One(checksum.clone()));
            }
        }
        provides
    }

    fn get_depends(&self) -> BTreeMap<String, StringOrList> {
        BTreeMap::new()
    }

    fn get_meta_data(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }

    fn get_clears_provides(&self) -> Vec<String> {
        self.parsed_clears.clone().unwrap_or_else(|| self.clears_provides())
    }

    fn new_instance(&self) -> Box<dyn Handler> {
        Box::new(RootfsV3::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn new_populates_modern_checksum_provide() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();

        let handler = RootfsV3::new(tmp.path()).unwrap();
        let provides = handler.get_provides();
        assert_eq!(
            provides.get("rootfs-image.checksum").map(|v| v.as_slice()[0].as_str()),
            Some("3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7")
        );
    }

    #[test]
    fn no_checksum_provide_suppresses_entry() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();

        let handler = RootfsV3::new(tmp.path()).unwrap().with_no_checksum_provide(true);
        assert!(handler.get_provides().is_empty());
    }

    #[test]
    fn read_header_rejects_files_entry() {
        let mut handler = RootfsV3::default();
        let err = handler.read_header("headers/0000/files", br#"{"files":["a"]}"#, 3, false).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFilesEntryInV3));
    }

    #[test]
    fn default_clears_provides_is_emitted_unless_suppressed() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();
        let handler = RootfsV3::new(tmp.path()).unwrap();
        assert_eq!(handler.get_clears_provides(), vec!["artifact_group", "rootfs_image_checksum", "rootfs-image.*"]);

        let suppressed = RootfsV3::new(tmp.path()).unwrap().with_no_default_clears_provides(true);
        assert!(suppressed.get_clears_provides().is_empty());
    }

    #[test]
    fn read_header_detects_legacy_checksum_key() {
        let mut handler = RootfsV3::default();
        let body = br#"{"type":"rootfs-image","artifact_provides":{"rootfs_image_checksum":"abc"}}"#;
        handler.read_header("headers/0000/type-info", body, 3, false).unwrap();
        assert_eq!(handler.checksum_key_style, LegacyChecksumKeyStyle::Legacy);
    }
}
