//! `BootstrapArtifact` (spec.md §4.5.4): a v3 payload with `type = null` and
//! no backing data at all. Used to seed a device's provides/depends store
//! on first contact, before any real update has ever been installed.

use std::collections::BTreeMap;
use std::io::Read;

use super::{append_json_entry, DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Record, StringOrList, TypeInfoV3};
use crate::tar_utils::format_payload_index;

#[derive(Default)]
pub struct BootstrapArtifact;

impl Handler for BootstrapArtifact {
    fn update_type(&self) -> Option<String> {
        None
    }

    fn files(&self) -> &[DataFile] {
        &[]
    }

    fn compose_header(&self, out: &mut TarSink<'_>, index: usize) -> Result<()> {
        let idx = format_payload_index(index);
        let type_info = TypeInfoV3::default();
        append_json_entry(out, &format!("headers/{idx}/type-info"), &type_info.to_json()?)?;
        Ok(())
    }

    fn compose_data(&self, _out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        // No `data/XXXX.tar*` entry at all for a bootstrap payload.
        Ok(())
    }

    fn read_header(&mut self, relative_path: &str, contents: &[u8], _version: u32, _augmented: bool) -> Result<()> {
        let leaf = relative_path.rsplit('/').next().unwrap_or(relative_path);
        match leaf {
            "type-info" => {
                let (type_info, _) = TypeInfoV3::write(contents)?;
                type_info.validate().map_err(crate::metadata::Error::Validation)?;
                if type_info.type_.is_some() {
                    return Err(Error::UnexpectedFile(format!("bootstrap payload must have type null, got {:?}", type_info.type_)));
                }
                Ok(())
            }
            "files" => Err(Error::UnexpectedFile("bootstrap payload must not declare files".to_string())),
            "meta-data" => Err(Error::UnexpectedFile("bootstrap payload must not declare meta-data".to_string())),
            _ => Err(Error::UnexpectedFile(relative_path.to_string())),
        }
    }

    fn install(&mut self, name: &str, _payload: &mut dyn Read, _size: u64) -> Result<()> {
        Err(Error::UnexpectedFile(format!("bootstrap payload has no data, got file {name}")))
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
        Box::new(BootstrapArtifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_info_has_null_type() {
        let handler = BootstrapArtifact;
        let mut buf = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut buf as &mut dyn std::io::Write);
            handler.compose_header(&mut builder, 0).unwrap();
            builder.finish().unwrap();
        }
        let mut archive = tar::Archive::new(buf.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, br#"{"type":null}"#);
    }

    #[test]
    fn read_header_rejects_non_null_type() {
        let mut handler = BootstrapArtifact;
        let err = handler.read_header("headers/0000/type-info", br#"{"type":"rootfs-image"}"#, 3, false).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFile(_)));
    }

    #[test]
    fn install_is_always_rejected() {
        let mut handler = BootstrapArtifact;
        let mut payload: &[u8] = b"";
        let err = handler.install("anything", &mut payload, 0).unwrap_err();
        assert!(matches!(err, Error::UnexpectedFile(_)));
    }

    #[test]
    fn has_no_files() {
        assert!(BootstrapArtifact.files().is_empty());
    }
}
