//! Shared validation for artifact-name/artifact-group style strings
//! (spec.md §3.6): at most 256 bytes, not whitespace-only, and restricted to
//! Unicode letters/marks/numbers/punctuation/symbols plus ASCII whitespace.
//!
//! `std` doesn't expose full Unicode general-category queries, so this
//! approximates "letter, mark, number, punctuation, or symbol" as "anything
//! that isn't a control character and isn't a non-ASCII whitespace
//! separator" — close enough for every category spec.md actually names.

const MAX_NAME_BYTES: usize = 256;

fn is_allowed_name_char(c: char) -> bool {
    if c.is_ascii_whitespace() {
        return true;
    }
    if c.is_whitespace() {
        return false;
    }
    !c.is_control()
}

pub fn validate_name(field: &str, value: &str, reasons: &mut Vec<String>) {
    if value.is_empty() {
        reasons.push(format!("{field} must not be empty"));
        return;
    }
    if value.trim().is_empty() {
        reasons.push(format!("{field} must not be whitespace-only"));
    }
    if value.len() > MAX_NAME_BYTES {
        reasons.push(format!("{field} exceeds {MAX_NAME_BYTES} bytes"));
    }
    if let Some(bad) = value.chars().find(|c| !is_allowed_name_char(*c)) {
        reasons.push(format!("{field} contains disallowed character {bad:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        let mut reasons = Vec::new();
        validate_name("artifact_name", "", &mut reasons);
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn whitespace_only_name_is_rejected() {
        let mut reasons = Vec::new();
        validate_name("artifact_name", "   \t", &mut reasons);
        assert!(!reasons.is_empty());
    }

    #[test]
    fn oversized_name_is_rejected() {
        let mut reasons = Vec::new();
        validate_name("artifact_name", &"a".repeat(257), &mut reasons);
        assert!(reasons.iter().any(|r| r.contains("256 bytes")));
    }

    #[test]
    fn ordinary_name_is_accepted() {
        let mut reasons = Vec::new();
        validate_name("artifact_name", "release-2023.10 (rc1)", &mut reasons);
        assert!(reasons.is_empty());
    }

    #[test]
    fn non_ascii_separator_is_rejected() {
        let mut reasons = Vec::new();
        validate_name("artifact_name", "release\u{00A0}1", &mut reasons);
        assert!(!reasons.is_empty());
    }
}
