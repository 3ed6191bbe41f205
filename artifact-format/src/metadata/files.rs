use serde::{Deserialize, Serialize};

use super::{Record, ValidationErrors};

/// v1/v2 `headers/XXXX/files`: the list of data filenames the payload owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Files {
    pub files: Vec<String>,
}

impl Record for Files {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();
        if self.files.is_empty() {
            reasons.push("files must not be empty".to_string());
        }
        for (i, name) in self.files.iter().enumerate() {
            if name.is_empty() {
                reasons.push(format!("files[{i}] must not be empty"));
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
    fn empty_file_list_is_rejected() {
        let files = Files { files: vec![] };
        assert!(files.validate().is_err());
    }

    #[test]
    fn blank_entry_is_rejected() {
        let files = Files { files: vec!["".to_string()] };
        assert!(files.validate().is_err());
    }

    #[test]
    fn ordinary_list_is_accepted() {
        let files = Files { files: vec!["update.ext4".to_string()] };
        assert!(files.validate().is_ok());
    }
}
