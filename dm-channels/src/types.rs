use serde::{Deserialize, Serialize};

/// Presence signals the platform renders in the conversation UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderAction {
    MarkSeen,
    TypingOn,
    TypingOff,
}

impl SenderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarkSeen => "mark_seen",
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
        }
    }
}

/// Public profile fields the platform exposes for a conversation partner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_action_maps_to_wire_names() {
        assert_eq!(SenderAction::MarkSeen.as_str(), "mark_seen");
        assert_eq!(SenderAction::TypingOn.as_str(), "typing_on");
        assert_eq!(SenderAction::TypingOff.as_str(), "typing_off");
    }

    #[test]
    fn profile_tolerates_missing_fields() {
        let profile: UserProfile = serde_json::from_str(r#"{"name":"Alice"}"#)
            .expect("profile parses");
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert!(profile.username.is_none());
    }
}
