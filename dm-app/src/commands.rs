//! Control-command interpretation.
//!
//! Exactly two in-conversation utterances are commands: "stop" pauses
//! auto-reply, "start" resumes it. Both are acknowledged with fixed text
//! and never reach generation or the history store.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

impl ControlCommand {
    /// Recognize a control utterance on the trimmed, lowercased body.
    /// Anything else falls through to normal processing.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    /// The `is_ai_active` value this command writes.
    pub fn activates(self) -> bool {
        matches!(self, Self::Start)
    }

    /// Fixed acknowledgement sent in place of a generated reply.
    pub fn acknowledgement(self) -> &'static str {
        match self {
            Self::Start => "Auto-reply is back on. I'll pick up new messages from here.",
            Self::Stop => "Auto-reply is paused. Send \"start\" whenever you want me back.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_start_and_stop_ignoring_case_and_whitespace() {
        assert_eq!(ControlCommand::parse("start"), Some(ControlCommand::Start));
        assert_eq!(ControlCommand::parse("  STOP  "), Some(ControlCommand::Stop));
        assert_eq!(ControlCommand::parse("Start"), Some(ControlCommand::Start));
        assert_eq!(ControlCommand::parse("\tstop\n"), Some(ControlCommand::Stop));
    }

    #[test]
    fn everything_else_falls_through() {
        for text in ["", "start now", "please stop", "stopp", "restart", "hi"] {
            assert_eq!(ControlCommand::parse(text), None, "{text:?}");
        }
    }

    #[test]
    fn commands_map_to_the_toggle_value() {
        assert!(ControlCommand::Start.activates());
        assert!(!ControlCommand::Stop.activates());
    }
}
