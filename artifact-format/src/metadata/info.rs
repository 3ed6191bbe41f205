use serde::{Deserialize, Serialize};

use super::{Record, ValidationErrors};

pub const SUPPORTED_VERSIONS: [u32; 3] = [1, 2, 3];

/// The Artifact's leading entry: `{"format": "mender", "version": N}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub format: String,
    pub version: u32,
}

impl Info {
    pub fn mender_v1() -> Self {
        Info { format: "mender".to_string(), version: 1 }
    }

    pub fn mender_v2() -> Self {
        Info { format: "mender".to_string(), version: 2 }
    }

    pub fn mender_v3() -> Self {
        Info { format: "mender".to_string(), version: 3 }
    }

    pub fn supported_versions() -> [u32; 3] {
        SUPPORTED_VERSIONS
    }
}

impl Record for Info {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();
        if self.format != "mender" {
            reasons.push(format!("unsupported format {:?}", self.format));
        }
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            reasons.push(format!("unsupported version {}", self.version));
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
    fn constructors_validate() {
        assert!(Info::mender_v1().validate().is_ok());
        assert!(Info::mender_v2().validate().is_ok());
        assert!(Info::mender_v3().validate().is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let info = Info { format: "not-mender".to_string(), version: 3 };
        assert!(info.validate().is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let info = Info { format: "mender".to_string(), version: 4 };
        assert!(info.validate().is_err());
    }

    #[test]
    fn write_reports_bytes_consumed() {
        let bytes = br#"{"format":"mender","version":3}trailing-garbage"#;
        let (info, consumed) = Info::write(bytes).unwrap();
        assert_eq!(info, Info::mender_v3());
        assert_eq!(consumed, br#"{"format":"mender","version":3}"#.len());
    }
}
