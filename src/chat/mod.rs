use serde::{Deserialize, Serialize};
use std::fmt;

pub mod client;
pub mod completion;
pub mod directive;
pub mod peer;
pub mod transcript;

pub const ASSISTANT_NAME: &str = "DAKA AI";
pub const ASSISTANT_GREETING: &str = "Hi, I'm Daka AI, your local guide and AI friend! \
Looking for a spot to check in, something to eat, a travel tip, or just a chat? \
Ask me anything about Guangzhou, the map, or having fun around town.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Assistant,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub mode: ChatMode,
}

impl ChatMessage {
    pub fn is_from_assistant(&self) -> bool {
        self.mode == ChatMode::Assistant && self.sender == ASSISTANT_NAME
    }
}

/// Shared key of a two-person conversation: both names sorted and joined with `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn between(a: &str, b: &str) -> Self {
        if a < b {
            Self(format!("{a}_{b}"))
        } else {
            Self(format!("{b}_{a}"))
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub from: String,
    pub to: String,
    pub text: String,
    pub timestamp_ms: u64,
}

impl PeerMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::between(&self.from, &self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatMode, ConversationKey, ASSISTANT_NAME};

    #[test]
    fn conversation_key_ignores_direction() {
        let forward = ConversationKey::between("alice", "bob");
        let backward = ConversationKey::between("bob", "alice");
        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), "alice_bob");
    }

    #[test]
    fn only_assistant_mode_messages_count_as_assistant() {
        let peer_impostor = ChatMessage {
            sender: ASSISTANT_NAME.to_string(),
            text: "hi".to_string(),
            mode: ChatMode::Peer,
        };
        assert!(!peer_impostor.is_from_assistant());
    }
}
