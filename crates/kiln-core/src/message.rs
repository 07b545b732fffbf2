//! Conversation primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker name used for system-visible turns (command results, corrections).
pub const SYSTEM_SPEAKER: &str = "system";

/// Role of a turn from the agent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System notices, command output and corrections
    System,
    /// Anyone talking to the agent
    User,
    /// The agent itself
    Assistant,
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,
    /// Who said it (player name, the agent's name, or `system`)
    pub speaker: String,
    /// Role derived from the speaker
    pub role: Role,
    /// Text of the turn
    pub text: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn, deriving the role from the speaker and the agent name.
    pub fn new(agent_name: &str, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        let speaker = speaker.into();
        let role = if speaker == agent_name {
            Role::Assistant
        } else if speaker == SYSTEM_SPEAKER {
            Role::System
        } else {
            Role::User
        };
        Self {
            id: Uuid::new_v4().to_string(),
            speaker,
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system turn.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            speaker: SYSTEM_SPEAKER.to_string(),
            role: Role::System,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Text as it should appear inside a prompt: `speaker: text` for non-assistant turns.
    pub fn prompt_text(&self) -> String {
        match self.role {
            Role::Assistant => self.text.clone(),
            _ => format!("{}: {}", self.speaker, self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_speaker() {
        assert_eq!(Turn::new("andy", "andy", "hi").role, Role::Assistant);
        assert_eq!(Turn::new("andy", "system", "hi").role, Role::System);
        assert_eq!(Turn::new("andy", "Bob", "hi").role, Role::User);
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(Turn::new("andy", "Bob", "come here").prompt_text(), "Bob: come here");
        assert_eq!(Turn::new("andy", "andy", "on my way").prompt_text(), "on my way");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let turn = Turn::system("Agent stopped.");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
