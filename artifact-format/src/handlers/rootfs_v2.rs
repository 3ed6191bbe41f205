use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use sha2::{Digest, Sha256};

use super::{append_json_entry, DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Files, Record, StringOrList, TypeInfo};
use crate::tar_utils::format_payload_index;

/// Exactly one data file; unlike `RootfsV1` its checksum is not embedded in
/// the header at all — the writer engine reads it off `files()[0].checksum`
/// to populate the shared `manifest` (spec.md §4.5.1, §3.6).
#[derive(Default)]
pub struct RootfsV2 {
    file: Option<DataFile>,
    installed: bool,
}

impl RootfsV2 {
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

        Ok(RootfsV2 { file: Some(DataFile { name, size, checksum: Some(checksum), source: Some(path) }), installed: false })
    }
}

impl Handler for RootfsV2 {
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

        let files = Files { files: vec![file.name.clone()] };
        append_json_entry(out, &format!("headers/{idx}/files"), &files.to_json()?)?;

        let type_info = TypeInfo { type_: "rootfs-image".to_string() };
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
        } else {
            return Err(Error::UnexpectedFile(relative_path.to_string()));
        }
        Ok(())
    }

    fn install(&mut self, name: &str, payload: &mut dyn Read, size: u64) -> Result<()> {
        // The checksum-reader wrapping this stream (constructed by the
        // reader engine from the `manifest` entry) already enforces the
        // match; install only needs to record the observed size.
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
        Box::new(RootfsV2::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn new_computes_checksum_for_manifest() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();

        let handler = RootfsV2::new(tmp.path()).unwrap();
        assert_eq!(
            handler.files()[0].checksum.as_deref(),
            Some("3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7")
        );
    }

    #[test]
    fn rejects_files_entry_with_wrong_type() {
        let mut handler = RootfsV2::default();
        let type_info = TypeInfo { type_: "module-image".to_string() };
        let err = handler.read_header("headers/0000/type-info", &type_info.to_json().unwrap(), 2, false).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFile(_)));
    }
}
