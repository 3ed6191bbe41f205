use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use sha2::{Digest, Sha256};

use super::{append_json_entry, DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Files, Record, StringOrList, TypeInfo};
use crate::tar_utils::format_payload_index;

/// Exactly one data file, with its SHA-256 recorded in
/// `headers/XXXX/checksums/<name>.sha256sum` (spec.md §4.5.1) rather than in
/// `manifest` — the v1 scheme predates the shared manifest.
pub struct RootfsV1 {
    file: Option<DataFile>,
    checksum: Option<String>,
    installed: bool,
}

impl Default for RootfsV1 {
    fn default() -> Self {
        RootfsV1 { file: None, checksum: None, installed: false }
    }
}

impl RootfsV1 {
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
        Ok(RootfsV1 { file: Some(DataFile { name, size, checksum: Some(checksum.clone()), source: Some(path) }), checksum: Some(checksum), installed: false })
    }
}

impl Handler for RootfsV1 {
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
        let file = self.file.as_ref().expect("compose_header called before a source file was set");
        let checksum = self.checksum.as_ref().expect("compose_header called before checksum was computed");

        let files = Files { files: vec![file.name.clone()] };
        append_json_entry(out, &format!("headers/{idx}/files"), &files.to_json()?)?;

        let type_info = TypeInfo { type_: "rootfs-image".to_string() };
        append_json_entry(out, &format!("headers/{idx}/type-info"), &type_info.to_json()?)?;

        let line = format!("{checksum}  {}\n", file.name);
        append_json_entry(out, &format!("headers/{idx}/checksums/{}.sha256sum", file.name), line.as_bytes())?;

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
            let (files, _) = Files::write(contents)?;
            files.validate().map_err(crate::metadata::Error::Validation)?;
            let name = files.files[0].clone();
            self.file = Some(DataFile { name, size: 0, checksum: None, source: None });
        } else if leaf == "type-info" {
            let (type_info, _) = TypeInfo::write(contents)?;
            type_info.validate().map_err(crate::metadata::Error::Validation)?;
            if type_info.type_ != "rootfs-image" {
                return Err(Error::UnexpectedFile(format!("unexpected type {}", type_info.type_)));
            }
        } else if leaf.ends_with(".sha256sum") {
            let text = std::str::from_utf8(contents).map_err(|_| Error::UnexpectedFile(relative_path.to_string()))?;
            let (digest, _name) = text.trim_end().split_once("  ").ok_or_else(|| Error::UnexpectedFile(relative_path.to_string()))?;
            self.checksum = Some(digest.to_ascii_lowercase());
        } else {
            return Err(Error::UnexpectedFile(relative_path.to_string()));
        }
        Ok(())
    }

    fn install(&mut self, name: &str, payload: &mut dyn Read, size: u64) -> Result<()> {
        let expected = self.checksum.clone();
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = payload.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected {
            if expected != actual {
                return Err(Error::ChecksumMismatch { name: name.to_string() });
            }
        }
        self.file = Some(DataFile { name: name.to_string(), size, checksum: Some(actual.clone()), source: None });
        self.installed = true;
        Ok(())
    }

    fn get_provides(&self) -> BTreeMap<String, StringOrList> {
        BTreeMap::new()
    }

    fn get_depends(&self) -> BTreeMap<String, StringOrList> {
        BTreeMap::new()
    }

    fn get_meta_data(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }

    fn get_clears_provides(&self) -> Vec<String> {
        Vec::new()
    }

    fn new_instance(&self) -> Box<dyn Handler> {
        Box::new(RootfsV1::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn new_computes_size_and_checksum() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();

        let handler = RootfsV1::new(tmp.path()).unwrap();
        assert_eq!(handler.checksum.as_deref(), Some("3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7"));
        assert_eq!(handler.file.as_ref().unwrap().size, 4);
    }

    #[test]
    fn install_rejects_mismatched_checksum() {
        let mut handler = RootfsV1::default();
        handler.checksum = Some("0".repeat(64));
        let mut payload: &[u8] = b"data";
        let err = handler.install("update.ext4", &mut payload, 4).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn install_accepts_matching_checksum() {
        let mut handler = RootfsV1::default();
        handler.checksum = Some("3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7".to_string());
        let mut payload: &[u8] = b"data";
        handler.install("update.ext4", &mut payload, 4).unwrap();
        assert!(handler.installed);
    }
}
