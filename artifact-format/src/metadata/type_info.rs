use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Record, ValidationErrors};

/// `TypeInfoV3.artifact_provides`/`artifact_depends` values are either a
/// bare string or a list of strings; any other JSON shape is rejected by
/// `#[serde(untagged)]` failing to match either variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            StringOrList::One(s) => std::slice::from_ref(s),
            StringOrList::Many(v) => v.as_slice(),
        }
    }
}

/// v1/v2 `type-info`: just the payload type name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub type_: String,
}

impl Record for TypeInfo {
    fn validate(&self) -> Result<(), ValidationErrors> {
        if self.type_.trim().is_empty() {
            Err(vec!["type must not be empty".to_string()])
        } else {
            Ok(())
        }
    }
}

/// v3 `type-info`. `type_` is `None` only for a bootstrap (empty-payload)
/// artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeInfoV3 {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_provides: Option<BTreeMap<String, StringOrList>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_depends: Option<BTreeMap<String, StringOrList>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clears_artifact_provides: Option<Vec<String>>,
}

impl Record for TypeInfoV3 {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();
        if let Some(type_) = &self.type_ {
            if type_.trim().is_empty() {
                reasons.push("type must not be empty when present".to_string());
            }
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
    fn string_or_list_accepts_bare_string() {
        let parsed: StringOrList = serde_json::from_str("\"1.2.3\"").unwrap();
        assert_eq!(parsed.into_vec(), vec!["1.2.3".to_string()]);
    }

    #[test]
    fn string_or_list_accepts_array() {
        let parsed: StringOrList = serde_json::from_str(r#"["1.2.3","1.2.4"]"#).unwrap();
        assert_eq!(parsed.into_vec(), vec!["1.2.3".to_string(), "1.2.4".to_string()]);
    }

    #[test]
    fn string_or_list_rejects_object() {
        let parsed: Result<StringOrList, _> = serde_json::from_str(r#"{"oops":true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn type_info_v3_bootstrap_has_null_type() {
        let (parsed, _) = TypeInfoV3::write(br#"{"type":null}"#).unwrap();
        assert_eq!(parsed.type_, None);
        assert!(parsed.validate().is_ok());
    }
}
