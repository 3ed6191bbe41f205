//! Lifecycle script filename parsing (spec.md §6.1, SPEC_FULL.md §3): v1/v2
//! artifacts dot-separate `<order>_<State>.<Action>.<name>`, v3 underscore-
//! separates `<State>_<Action>_<order>_<name>`. The writer rejects anything
//! that doesn't parse; the reader only needs to recognize `scripts/` entries
//! well enough to store and replay them, but parsing both forms the same
//! way lets callers round-trip a script set between artifact versions.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Enter,
    Leave,
    Error,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Enter => "Enter",
            Action::Leave => "Leave",
            Action::Error => "Error",
        }
    }

    fn parse(s: &str) -> Option<Action> {
        match s {
            "Enter" => Some(Action::Enter),
            "Leave" => Some(Action::Leave),
            "Error" => Some(Action::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName {
    pub state: String,
    pub action: Action,
    pub order: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidScriptName(pub String);

impl fmt::Display for InvalidScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid script name: {}", self.0)
    }
}

impl std::error::Error for InvalidScriptName {}

fn is_valid_state(state: &str) -> bool {
    !state.is_empty() && state.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_valid_name_suffix(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ScriptName {
    /// Parses the v1/v2 dotted form: `10_ArtifactInstall.Enter.name`.
    pub fn parse_v1v2(raw: &str) -> Result<ScriptName, InvalidScriptName> {
        let err = || InvalidScriptName(raw.to_string());

        let (order_and_state, rest) = raw.split_once('.').ok_or_else(err)?;
        let (action_str, name) = rest.split_once('.').ok_or_else(err)?;
        let (order_str, state) = order_and_state.split_once('_').ok_or_else(err)?;

        let order: u32 = order_str.parse().map_err(|_| err())?;
        if !is_valid_state(state) {
            return Err(err());
        }
        let action = Action::parse(action_str).ok_or_else(err)?;
        if !is_valid_name_suffix(name) {
            return Err(err());
        }

        Ok(ScriptName { state: state.to_string(), action, order, name: name.to_string() })
    }

    /// Parses the v3 underscored form: `ArtifactInstall_Enter_10_name`.
    pub fn parse_v3(raw: &str) -> Result<ScriptName, InvalidScriptName> {
        let err = || InvalidScriptName(raw.to_string());

        let mut parts = raw.splitn(4, '_');
        let state = parts.next().ok_or_else(err)?;
        let action_str = parts.next().ok_or_else(err)?;
        let order_str = parts.next().ok_or_else(err)?;
        let name = parts.next().ok_or_else(err)?;

        if !is_valid_state(state) {
            return Err(err());
        }
        let action = Action::parse(action_str).ok_or_else(err)?;
        let order: u32 = order_str.parse().map_err(|_| err())?;
        if !is_valid_name_suffix(name) {
            return Err(err());
        }

        Ok(ScriptName { state: state.to_string(), action, order, name: name.to_string() })
    }

    pub fn to_v1v2(&self) -> String {
        format!("{:02}_{}.{}.{}", self.order, self.state, self.action.as_str(), self.name)
    }

    pub fn to_v3(&self) -> String {
        format!("{}_{}_{:02}_{}", self.state, self.action.as_str(), self.order, self.name)
    }
}

/// A lifecycle script as carried through the writer/reader engine: an
/// already-formatted filename (dotted for v1/v2, underscored for v3 — the
/// writer validates it against `ScriptName` before accepting it) and its
/// raw executable contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub name: String,
    pub contents: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v1v2_dotted_form() {
        let parsed = ScriptName::parse_v1v2("10_ArtifactInstall.Enter.name").unwrap();
        assert_eq!(parsed.state, "ArtifactInstall");
        assert_eq!(parsed.action, Action::Enter);
        assert_eq!(parsed.order, 10);
        assert_eq!(parsed.name, "name");
    }

    #[test]
    fn parses_v3_underscored_form() {
        let parsed = ScriptName::parse_v3("ArtifactInstall_Enter_10_name").unwrap();
        assert_eq!(parsed.state, "ArtifactInstall");
        assert_eq!(parsed.action, Action::Enter);
        assert_eq!(parsed.order, 10);
        assert_eq!(parsed.name, "name");
    }

    #[test]
    fn v3_name_may_itself_contain_underscores() {
        let parsed = ScriptName::parse_v3("ArtifactInstall_Enter_10_my_custom_name").unwrap();
        assert_eq!(parsed.name, "my_custom_name");
    }

    #[test]
    fn round_trips_between_forms() {
        let parsed = ScriptName::parse_v1v2("10_ArtifactInstall.Enter.name").unwrap();
        assert_eq!(parsed.to_v3(), "ArtifactInstall_Enter_10_name");
        let parsed_back = ScriptName::parse_v3(&parsed.to_v3()).unwrap();
        assert_eq!(parsed_back.to_v1v2(), "10_ArtifactInstall.Enter.name");
    }

    #[test]
    fn rejects_unknown_action() {
        assert!(ScriptName::parse_v1v2("10_ArtifactInstall.Sideways.name").is_err());
    }

    #[test]
    fn rejects_non_numeric_order() {
        assert!(ScriptName::parse_v1v2("ab_ArtifactInstall.Enter.name").is_err());
    }

    #[test]
    fn rejects_empty_name_suffix() {
        assert!(ScriptName::parse_v3("ArtifactInstall_Enter_10_").is_err());
    }
}
