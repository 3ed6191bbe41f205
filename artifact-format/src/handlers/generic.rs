//! `Generic`, the reader-side fallback handler (spec.md §4.5.5): instantiated
//! when `header-info.payloads[i].type` has no constructor registered in the
//! caller-supplied `HandlerRegistry`. It accepts any header file under its
//! bucket without validating the metadata shape, discards whatever data
//! bytes stream through it, and refuses to be composed — a writer never
//! produces a `Generic`-typed payload; it exists purely so an unfamiliar
//! Artifact can still be read header-to-header instead of aborting at the
//! first payload type nobody registered a handler for.

use std::collections::BTreeMap;
use std::io::Read;

use super::{DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Files, Record, StringOrList, TypeInfoV3};

#[derive(Default)]
pub struct Generic {
    update_type: Option<String>,
    files: Vec<DataFile>,
    meta_data: serde_json::Value,
    installed: Vec<String>,
}

impl Generic {
    pub fn new(update_type: impl Into<String>) -> Self {
        Generic { update_type: Some(update_type.into()), ..Default::default() }
    }
}

impl Handler for Generic {
    fn update_type(&self) -> Option<String> {
        self.update_type.clone()
    }

    fn files(&self) -> &[DataFile] {
        &self.files
    }

    fn compose_header(&self, _out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        Err(Error::UnexpectedFile("Generic is not composable; no handler was registered for this payload type".to_string()))
    }

    fn compose_data(&self, _out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        Err(Error::UnexpectedFile("Generic is not composable; no handler was registered for this payload type".to_string()))
    }

    fn read_header(&mut self, relative_path: &str, contents: &[u8], _version: u32, _augmented: bool) -> Result<()> {
        let leaf = relative_path.rsplit('/').next().unwrap_or(relative_path);

        if leaf == "files" {
            if let Ok((files, _)) = Files::write(contents) {
                self.files = files.files.into_iter().map(|name| DataFile { name, size: 0, checksum: None, source: None }).collect();
            }
        } else if leaf == "type-info" {
            if let Ok((type_info, _)) = TypeInfoV3::write(contents) {
                if type_info.type_.is_some() {
                    self.update_type = type_info.type_;
                }
            }
        } else if leaf == "meta-data" {
            if let Ok(value) = serde_json::from_slice(contents) {
                self.meta_data = value;
            }
        }
        // Any other leaf (including unrecognized ones and legacy
        // `checksums/*.sha256sum` files) is accepted and ignored: a
        // fallback handler has no schema to enforce.
        Ok(())
    }

    fn install(&mut self, name: &str, payload: &mut dyn Read, _size: u64) -> Result<()> {
        let mut sink = std::io::sink();
        std::io::copy(payload, &mut sink)?;
        self.installed.push(name.to_string());
        Ok(())
    }

    fn get_provides(&self) -> BTreeMap<String, StringOrList> {
        BTreeMap::new()
    }

    fn get_depends(&self) -> BTreeMap<String, StringOrList> {
        BTreeMap::new()
    }

    fn get_meta_data(&self) -> serde_json::Value {
        self.meta_data.clone()
    }

    fn get_clears_provides(&self) -> Vec<String> {
        Vec::new()
    }

    fn new_instance(&self) -> Box<dyn Handler> {
        Box::new(Generic { update_type: self.update_type.clone(), ..Default::default() })
    }

    fn accepts_unknown_data_files(&self) -> bool {
        true
    }
}
