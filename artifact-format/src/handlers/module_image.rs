use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{append_json_entry, DataFile, Error, Handler, Result, TarSink};
use crate::metadata::{Files, Record, StringOrList, TypeInfoV3};
use crate::tar_utils::format_payload_index;

/// The restricted overlay an augmented header may carry for a module-image
/// payload (spec.md §4.5.3, §9 Open Question 1): a `header-info` type
/// override, and a `type-info` limited in practice to `artifact_depends`
/// and `artifact_provides`, plus `meta-data`. Stored beside the primary
/// handler rather than as a second handler type.
#[derive(Debug, Clone, Default)]
pub struct AugmentOverlay {
    pub type_override: Option<String>,
    pub artifact_provides: Option<BTreeMap<String, StringOrList>>,
    pub artifact_depends: Option<BTreeMap<String, StringOrList>>,
    pub meta_data: Option<Value>,
}

/// v3 payload with an arbitrary `type` (spec.md §4.5.3): the data archive
/// carries whichever files the caller configured, each with its own
/// checksum recorded in the manifest.
pub struct ModuleImage {
    update_type: String,
    files: Vec<DataFile>,
    artifact_provides: BTreeMap<String, StringOrList>,
    artifact_depends: BTreeMap<String, StringOrList>,
    /// Explicit writer-side override from `with_clears_provides`; `None`
    /// means "apply the default unless suppressed" (spec.md §4.4).
    clears_artifact_provides: Option<Vec<String>>,
    no_default_clears_provides: bool,
    /// Set on read from the artifact's own `clears_artifact_provides`,
    /// taking priority over any compose-time computation.
    installed_clears: Option<Vec<String>>,
    meta_data: Value,
    augment: Option<AugmentOverlay>,
    pending_augment: Option<AugmentOverlay>,
    installed: Vec<String>,
}

impl ModuleImage {
    pub fn new(update_type: impl Into<String>, paths: Vec<PathBuf>) -> std::io::Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let size = std::fs::metadata(&path)?.len();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("payload").to_string();

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
            files.push(DataFile { name, size, checksum: Some(checksum), source: Some(path) });
        }

        Ok(ModuleImage {
            update_type: update_type.into(),
            files,
            artifact_provides: BTreeMap::new(),
            artifact_depends: BTreeMap::new(),
            clears_artifact_provides: None,
            no_default_clears_provides: false,
            installed_clears: None,
            meta_data: Value::Object(Default::default()),
            augment: None,
            pending_augment: None,
            installed: Vec::new(),
        })
    }

    pub fn with_provides(mut self, provides: BTreeMap<String, StringOrList>) -> Self {
        self.artifact_provides = provides;
        self
    }

    pub fn with_depends(mut self, depends: BTreeMap<String, StringOrList>) -> Self {
        self.artifact_depends = depends;
        self
    }

    pub fn with_clears_provides(mut self, patterns: Vec<String>) -> Self {
        self.clears_artifact_provides = Some(patterns);
        self
    }

    /// Suppresses the default `["<type>.*"]` clears-provides pattern
    /// (spec.md §4.4); set by a writer-wide `no_default_clears_provides`
    /// option.
    pub fn with_no_default_clears_provides(mut self, no_default_clears_provides: bool) -> Self {
        self.no_default_clears_provides = no_default_clears_provides;
        self
    }

    fn effective_clears_provides(&self) -> Vec<String> {
        if let Some(explicit) = &self.clears_artifact_provides {
            return explicit.clone();
        }
        if self.no_default_clears_provides {
            Vec::new()
        } else {
            vec![format!("{}.*", self.update_type)]
        }
    }

    pub fn with_meta_data(mut self, meta_data: Value) -> Self {
        self.meta_data = meta_data;
        self
    }

    pub fn with_augment(mut self, augment: AugmentOverlay) -> Self {
        self.augment = Some(augment);
        self
    }

    fn type_info(&self) -> TypeInfoV3 {
        let clears = self.effective_clears_provides();
        TypeInfoV3 {
            type_: Some(self.update_type.clone()),
            artifact_provides: if self.artifact_provides.is_empty() { None } else { Some(self.artifact_provides.clone()) },
            artifact_depends: if self.artifact_depends.is_empty() { None } else { Some(self.artifact_depends.clone()) },
            clears_artifact_provides: if clears.is_empty() { None } else { Some(clears) },
        }
    }
}

impl Handler for ModuleImage {
    fn update_type(&self) -> Option<String> {
        Some(self.update_type.clone())
    }

    fn files(&self) -> &[DataFile] {
        &self.files
    }

    fn compose_header(&self, out: &mut TarSink<'_>, index: usize) -> Result<()> {
        let idx = format_payload_index(index);

        let files = Files { files: self.files.iter().map(|f| f.name.clone()).collect() };
        if !files.files.is_empty() {
            append_json_entry(out, &format!("headers/{idx}/files"), &files.to_json()?)?;
        }

        append_json_entry(out, &format!("headers/{idx}/type-info"), &self.type_info().to_json()?)?;
        let meta_data_bytes = serde_json::to_vec(&self.meta_data).map_err(crate::metadata::Error::from)?;
        append_json_entry(out, &format!("headers/{idx}/meta-data"), &meta_data_bytes)?;

        Ok(())
    }

    fn compose_data(&self, out: &mut TarSink<'_>, _index: usize) -> Result<()> {
        for file in &self.files {
            let source = file.source.as_ref().expect("compose_data called on a handler with no backing file");
            let mut reader = File::open(source)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(file.size);
            header.set_mode(0o644);
            header.set_cksum();
            out.append_data(&mut header, &file.name, &mut reader)?;
        }
        Ok(())
    }

    fn read_header(&mut self, relative_path: &str, contents: &[u8], _version: u32, augmented: bool) -> Result<()> {
        let leaf = relative_path.rsplit('/').next().unwrap_or(relative_path);

        if augmented {
            let overlay = self.pending_augment.get_or_insert_with(AugmentOverlay::default);
            if leaf == "type-info" {
                let (type_info, _) = TypeInfoV3::write(contents)?;
                type_info.validate().map_err(crate::metadata::Error::Validation)?;
                overlay.type_override = type_info.type_.clone();
                overlay.artifact_provides = type_info.artifact_provides;
                overlay.artifact_depends = type_info.artifact_depends;
            } else if leaf == "meta-data" {
                overlay.meta_data = Some(serde_json::from_slice(contents).map_err(crate::metadata::Error::from)?);
            } else if leaf == "files" {
                return Err(Error::UnexpectedFile("augmented header may not declare files".to_string()));
            } else {
                return Err(Error::UnexpectedFile(relative_path.to_string()));
            }
            return Ok(());
        }

        if leaf == "files" {
            let (files, _) = Files::write(contents)?;
            files.validate().map_err(crate::metadata::Error::Validation)?;
            self.files = files.files.into_iter().map(|name| DataFile { name, size: 0, checksum: None, source: None }).collect();
        } else if leaf == "type-info" {
            let (type_info, _) = TypeInfoV3::write(contents)?;
            type_info.validate().map_err(crate::metadata::Error::Validation)?;
            self.update_type = type_info.type_.clone().unwrap_or_default();
            self.artifact_provides = type_info.artifact_provides.unwrap_or_default();
            self.artifact_depends = type_info.artifact_depends.unwrap_or_default();
            self.installed_clears = Some(type_info.clears_artifact_provides.unwrap_or_default());
        } else if leaf == "meta-data" {
            self.meta_data = serde_json::from_slice(contents).map_err(crate::metadata::Error::from)?;
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
        let checksum = hex::encode(hasher.finalize());

        match self.files.iter_mut().find(|f| f.name == name) {
            Some(file) => {
                file.size = size;
                file.checksum = Some(checksum);
            }
            None => return Err(Error::UnexpectedFile(name.to_string())),
        }
        self.installed.push(name.to_string());
        Ok(())
    }

    fn get_provides(&self) -> BTreeMap<String, StringOrList> {
        self.artifact_provides.clone()
    }

    fn get_depends(&self) -> BTreeMap<String, StringOrList> {
        self.artifact_depends.clone()
    }

    fn get_meta_data(&self) -> Value {
        self.meta_data.clone()
    }

    fn get_clears_provides(&self) -> Vec<String> {
        self.installed_clears.clone().unwrap_or_else(|| self.effective_clears_provides())
    }

    fn new_instance(&self) -> Box<dyn Handler> {
        Box::new(ModuleImage {
            update_type: String::new(),
            files: Vec::new(),
            artifact_provides: BTreeMap::new(),
            artifact_depends: BTreeMap::new(),
            clears_artifact_provides: None,
            no_default_clears_provides: false,
            installed_clears: None,
            meta_data: Value::Object(Default::default()),
            augment: None,
            pending_augment: None,
            installed: Vec::new(),
        })
    }

    fn has_augment(&self) -> bool {
        self.augment.is_some()
    }

    fn compose_augment_header(&self, out: &mut TarSink<'_>, index: usize) -> Result<()> {
        let Some(overlay) = &self.augment else { return Ok(()) };
        let idx = format_payload_index(index);

        let type_info = TypeInfoV3 {
            type_: overlay.type_override.clone(),
            artifact_provides: overlay.artifact_provides.clone(),
            artifact_depends: overlay.artifact_depends.clone(),
            clears_artifact_provides: None,
        };
        append_json_entry(out, &format!("headers/{idx}/type-info"), &type_info.to_json()?)?;
        if let Some(meta_data) = &overlay.meta_data {
            let meta_data_bytes = serde_json::to_vec(meta_data).map_err(crate::metadata::Error::from)?;
            append_json_entry(out, &format!("headers/{idx}/meta-data"), &meta_data_bytes)?;
        }
        Ok(())
    }

    fn merge_augment(&mut self) -> Result<()> {
        let Some(overlay) = self.pending_augment.take() else { return Ok(()) };

        if let Some(type_override) = &overlay.type_override {
            if *type_override != self.update_type {
                self.update_type = type_override.clone();
            }
        }
        if let Some(provides) = overlay.artifact_provides {
            self.artifact_provides = merge_string_or_list_maps(&self.artifact_provides, &provides)?;
        }
        if let Some(depends) = overlay.artifact_depends {
            self.artifact_depends = merge_string_or_list_maps(&self.artifact_depends, &depends)?;
        }
        if let Some(meta_data) = overlay.meta_data {
            self.meta_data = merge_json(&self.meta_data, &meta_data)?;
        }
        Ok(())
    }
}

/// `artifact_provides`/`artifact_depends` maps merge key-wise: the
/// augmented value wins outright per key (there is no finer shape to
/// recurse into once a key resolves to a `StringOrList`).
fn merge_string_or_list_maps(
    primary: &BTreeMap<String, StringOrList>,
    augment: &BTreeMap<String, StringOrList>,
) -> Result<BTreeMap<String, StringOrList>> {
    let mut merged = primary.clone();
    for (key, value) in augment {
        merged.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

/// Recursive per-key JSON merge (spec.md §4.5.3): both sides must be
/// objects of the same shape at a shared key; the augmented value wins at
/// the leaves but never replaces a scalar with a non-scalar or vice versa,
/// and never descends into arrays.
fn merge_json(primary: &Value, augment: &Value) -> Result<Value> {
    match (primary, augment) {
        (Value::Object(primary_map), Value::Object(augment_map)) => {
            let mut merged = primary_map.clone();
            for (key, augment_value) in augment_map {
                match primary_map.get(key) {
                    Some(primary_value) => {
                        let is_array = matches!(primary_value, Value::Array(_)) || matches!(augment_value, Value::Array(_));
                        if is_array {
                            return Err(Error::InvalidAugmentMerge(format!("cannot descend into array at {key}")));
                        }
                        let both_objects = primary_value.is_object() && augment_value.is_object();
                        let either_object = primary_value.is_object() || augment_value.is_object();
                        if either_object && !both_objects {
                            return Err(Error::InvalidAugmentMerge(format!("type mismatch merging augmented field {key}")));
                        }
                        merged.insert(key.clone(), merge_json(primary_value, augment_value)?);
                    }
                    None => {
                        merged.insert(key.clone(), augment_value.clone());
                    }
                }
            }
            Ok(Value::Object(merged))
        }
        (_, augment_leaf) => Ok(augment_leaf.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_json_overrides_leaf_values() {
        let primary = json!({"a": 1, "b": {"c": 2}});
        let augment = json!({"b": {"c": 3, "d": 4}});
        let merged = merge_json(&primary, &augment).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": {"c": 3, "d": 4}}));
    }

    #[test]
    fn merge_json_rejects_scalar_for_object() {
        let primary = json!({"b": {"c": 2}});
        let augment = json!({"b": "oops"});
        let err = merge_json(&primary, &augment).unwrap_err();
        assert!(matches!(err, Error::InvalidAugmentMerge(_)));
    }

    #[test]
    fn merge_json_rejects_descending_into_arrays() {
        let primary = json!({"b": [1, 2]});
        let augment = json!({"b": [3]});
        let err = merge_json(&primary, &augment).unwrap_err();
        assert!(matches!(err, Error::InvalidAugmentMerge(_)));
    }

    #[test]
    fn default_clears_provides_uses_payload_type() {
        let handler = ModuleImage::new("deb", Vec::new()).unwrap();
        assert_eq!(handler.get_clears_provides(), vec!["deb.*".to_string()]);

        let suppressed = ModuleImage::new("deb", Vec::new()).unwrap().with_no_default_clears_provides(true);
        assert!(suppressed.get_clears_provides().is_empty());

        let overridden = ModuleImage::new("deb", Vec::new()).unwrap().with_clears_provides(vec!["custom.*".to_string()]);
        assert_eq!(overridden.get_clears_provides(), vec!["custom.*".to_string()]);
    }

    #[test]
    fn merge_augment_folds_provides_into_primary() {
        let mut handler = ModuleImage::new("delta-image", Vec::new()).unwrap();
        handler.pending_augment = Some(AugmentOverlay {
            type_override: None,
            artifact_provides: Some(BTreeMap::from([(
                "rootfs-image.checksum".to_string(),
                StringOrList::One("deadbeef".to_string()),
            )])),
            artifact_depends: None,
            meta_data: None,
        });
        handler.merge_augment().unwrap();
        assert_eq!(
            handler.get_provides().get("rootfs-image.checksum").map(|v| v.as_slice()[0].clone()),
            Some("deadbeef".to_string())
        );
    }
}
