use crate::chat::directive::{extract_directive, MapDirective};
use crate::chat::{ChatMessage, ChatMode, ConversationKey, PeerMessage, ASSISTANT_NAME};
use crate::map::LatLng;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

pub const FILE_MESSAGE_PREFIX: &str = "[file]";
const DOCUMENT_PROMPT: &str =
    "Here is the content of a file the user uploaded. Please explain, summarize or translate it:\n\n";

#[derive(Debug, Error, PartialEq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("enter the username of the person you want to message")]
    MissingRecipient,
    #[error("PDF, Word and image files need server-side parsing; only .txt is supported for now")]
    DocumentNeedsServer,
    #[error("unsupported file type")]
    UnsupportedDocument,
}

/// Conversation context handed to the completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub history: Vec<ChatMessage>,
    pub message: String,
    pub location: Option<LatLng>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Completion(CompletionRequest),
    Peer(PeerMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    NeedsServer,
    Unsupported,
}

pub fn classify_document(path: &Path) -> DocumentKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") => DocumentKind::PlainText,
        Some("pdf" | "doc" | "docx" | "png" | "jpg" | "jpeg" | "gif" | "webp") => {
            DocumentKind::NeedsServer
        }
        _ => DocumentKind::Unsupported,
    }
}

fn now_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Session chat state: the assistant log, peer conversations, and the reply counter.
#[derive(Debug, Clone)]
pub struct ChatTranscript {
    mode: ChatMode,
    assistant: Vec<ChatMessage>,
    peer: BTreeMap<ConversationKey, Vec<ChatMessage>>,
    peer_target: String,
    pending_replies: usize,
    epoch: u64,
    greeting: Option<String>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ChatTranscript {
    pub fn new(greeting: Option<String>) -> Self {
        let mut transcript = Self {
            mode: ChatMode::Assistant,
            assistant: Vec::new(),
            peer: BTreeMap::new(),
            peer_target: String::new(),
            pending_replies: 0,
            epoch: 0,
            greeting,
        };
        transcript.seed_greeting();
        transcript
    }

    fn seed_greeting(&mut self) {
        if let Some(greeting) = &self.greeting {
            self.assistant.push(ChatMessage {
                sender: ASSISTANT_NAME.to_string(),
                text: greeting.clone(),
                mode: ChatMode::Assistant,
            });
        }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ChatMode) {
        self.mode = mode;
    }

    pub fn set_peer_target(&mut self, target: impl Into<String>) {
        self.peer_target = target.into();
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_thinking(&self) -> bool {
        self.pending_replies > 0
    }

    pub fn assistant_messages(&self) -> &[ChatMessage] {
        &self.assistant
    }

    /// Messages between `me` and the current peer target.
    pub fn peer_conversation(&self, me: &str) -> &[ChatMessage] {
        if self.peer_target.trim().is_empty() {
            return &[];
        }
        self.peer
            .get(&ConversationKey::between(me, self.peer_target.trim()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handles the composer's send action for the current mode.
    ///
    /// Assistant mode appends the user's line right away and returns the request
    /// to send; peer mode appends nothing and returns the message to deliver.
    pub fn submit(
        &mut self,
        text: &str,
        sender: &str,
        location: Option<LatLng>,
    ) -> Result<Outgoing, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        match self.mode {
            ChatMode::Assistant => {
                let history = self.assistant.clone();
                self.assistant.push(ChatMessage {
                    sender: sender.to_string(),
                    text: text.to_string(),
                    mode: ChatMode::Assistant,
                });
                self.pending_replies += 1;
                Ok(Outgoing::Completion(CompletionRequest {
                    history,
                    message: text.to_string(),
                    location,
                }))
            }
            ChatMode::Peer => {
                let target = self.peer_target.trim();
                if target.is_empty() {
                    return Err(ChatError::MissingRecipient);
                }
                Ok(Outgoing::Peer(PeerMessage {
                    from: sender.to_string(),
                    to: target.to_string(),
                    text: text.to_string(),
                    timestamp_ms: now_millis(),
                }))
            }
        }
    }

    /// Posts an uploaded text file to the assistant.
    pub fn submit_document(
        &mut self,
        file_name: &str,
        kind: DocumentKind,
        content: &str,
        sender: &str,
    ) -> Result<CompletionRequest, ChatError> {
        match kind {
            DocumentKind::PlainText => {}
            DocumentKind::NeedsServer => return Err(ChatError::DocumentNeedsServer),
            DocumentKind::Unsupported => return Err(ChatError::UnsupportedDocument),
        }

        self.assistant.push(ChatMessage {
            sender: sender.to_string(),
            text: format!("{FILE_MESSAGE_PREFIX} {file_name}"),
            mode: ChatMode::Assistant,
        });
        self.pending_replies += 1;
        Ok(CompletionRequest {
            history: Vec::new(),
            message: format!("{DOCUMENT_PROMPT}{content}"),
            location: None,
        })
    }

    /// Appends an assistant reply and returns the map directive it carries, if any.
    /// Replies from an older epoch are dropped.
    pub fn push_reply(&mut self, epoch: u64, text: String) -> Option<MapDirective> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping reply for a cleared transcript");
            return None;
        }
        self.pending_replies = self.pending_replies.saturating_sub(1);
        self.assistant.push(ChatMessage {
            sender: ASSISTANT_NAME.to_string(),
            text,
            mode: ChatMode::Assistant,
        });
        self.latest_directive()
    }

    /// Looks only at the most recent assistant-log message.
    pub fn latest_directive(&self) -> Option<MapDirective> {
        self.assistant.last().and_then(extract_directive)
    }

    /// Rebuilds peer conversations from the mailbox feed.
    pub fn apply_peer_snapshot(&mut self, mut messages: Vec<PeerMessage>) {
        messages.sort_by_key(|message| message.timestamp_ms);
        self.peer.clear();
        for message in messages {
            self.peer
                .entry(message.conversation_key())
                .or_default()
                .push(ChatMessage {
                    sender: message.from,
                    text: message.text,
                    mode: ChatMode::Peer,
                });
        }
    }

    pub fn clear(&mut self) {
        self.assistant.clear();
        self.peer.clear();
        self.pending_replies = 0;
        self.epoch += 1;
        self.seed_greeting();
    }

    /// Clears the transcript and swaps the opening greeting, e.g. after a region switch.
    pub fn restart(&mut self, greeting: Option<String>) {
        self.greeting = greeting;
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_document, ChatError, ChatTranscript, DocumentKind, Outgoing};
    use crate::chat::{ChatMode, PeerMessage, ASSISTANT_NAME};
    use crate::map::LatLng;
    use std::path::Path;

    #[test]
    fn assistant_send_echoes_before_reply() {
        let mut transcript = ChatTranscript::default();

        let outgoing = transcript
            .submit("  where is the tower? ", "sheng", Some(LatLng::new(23.1, 113.2)))
            .expect("assistant send should succeed");

        assert_eq!(transcript.assistant_messages().len(), 1);
        assert_eq!(transcript.assistant_messages()[0].text, "where is the tower?");
        assert!(transcript.is_thinking());
        let Outgoing::Completion(request) = outgoing else {
            panic!("assistant mode should produce a completion request");
        };
        assert!(request.history.is_empty());
        assert_eq!(request.message, "where is the tower?");
        assert_eq!(request.location, Some(LatLng::new(23.1, 113.2)));

        let directive = transcript.push_reply(transcript.epoch(), "It's here [map:广州塔]".to_string());

        assert_eq!(transcript.assistant_messages().len(), 2);
        assert_eq!(transcript.assistant_messages()[1].sender, ASSISTANT_NAME);
        assert!(transcript.assistant_messages()[1].text.contains("[map:广州塔]"));
        assert!(!transcript.is_thinking());
        assert_eq!(directive.map(|d| d.address), Some("广州塔".to_string()));
    }

    #[test]
    fn history_carries_the_prior_transcript() {
        let mut transcript = ChatTranscript::new(Some("hello".to_string()));
        transcript.submit("first", "me", None).expect("send should succeed");
        transcript.push_reply(0, "reply".to_string());

        let Outgoing::Completion(request) =
            transcript.submit("second", "me", None).expect("send should succeed")
        else {
            panic!("expected completion");
        };

        let texts: Vec<_> = request.history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "first", "reply"]);
    }

    #[test]
    fn overlapping_sends_keep_thinking_until_all_replies_land() {
        let mut transcript = ChatTranscript::default();
        transcript.submit("one", "me", None).expect("first send");
        transcript.submit("two", "me", None).expect("second send");

        transcript.push_reply(0, "answer".to_string());
        assert!(transcript.is_thinking());
        transcript.push_reply(0, "answer".to_string());
        assert!(!transcript.is_thinking());
        assert_eq!(transcript.assistant_messages().len(), 4);
    }

    #[test]
    fn peer_send_without_target_is_rejected() {
        let mut transcript = ChatTranscript::default();
        transcript.set_mode(ChatMode::Peer);

        assert_eq!(
            transcript.submit("hi", "me", None),
            Err(ChatError::MissingRecipient)
        );
        assert!(transcript.assistant_messages().is_empty());
        assert!(transcript.peer_conversation("me").is_empty());
    }

    #[test]
    fn peer_send_is_not_echoed_until_feed_reflects_it() {
        let mut transcript = ChatTranscript::default();
        transcript.set_mode(ChatMode::Peer);
        transcript.set_peer_target("bob");

        let outgoing = transcript.submit("hi bob", "alice", None).expect("peer send");
        let Outgoing::Peer(message) = outgoing else {
            panic!("peer mode should produce a peer message");
        };
        assert_eq!(message.from, "alice");
        assert_eq!(message.to, "bob");
        assert!(transcript.peer_conversation("alice").is_empty());

        transcript.apply_peer_snapshot(vec![
            PeerMessage {
                from: "bob".to_string(),
                to: "alice".to_string(),
                text: "later".to_string(),
                timestamp_ms: message.timestamp_ms + 1,
            },
            message,
            PeerMessage {
                from: "carol".to_string(),
                to: "alice".to_string(),
                text: "other thread".to_string(),
                timestamp_ms: 1,
            },
        ]);

        let texts: Vec<_> = transcript
            .peer_conversation("alice")
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["hi bob", "later"]);
    }

    #[test]
    fn empty_messages_are_ignored() {
        let mut transcript = ChatTranscript::default();
        assert_eq!(transcript.submit("   ", "me", None), Err(ChatError::EmptyMessage));
        assert!(!transcript.is_thinking());
    }

    #[test]
    fn clear_drops_late_replies() {
        let mut transcript = ChatTranscript::new(Some("hello".to_string()));
        transcript.submit("question", "me", None).expect("send");
        let old_epoch = transcript.epoch();

        transcript.clear();
        let directive = transcript.push_reply(old_epoch, "[map:广州塔]".to_string());

        assert!(directive.is_none());
        assert_eq!(transcript.assistant_messages().len(), 1);
        assert!(!transcript.is_thinking());
    }

    #[test]
    fn documents_are_classified_by_extension() {
        assert_eq!(classify_document(Path::new("notes.TXT")), DocumentKind::PlainText);
        assert_eq!(classify_document(Path::new("report.pdf")), DocumentKind::NeedsServer);
        assert_eq!(classify_document(Path::new("archive.zip")), DocumentKind::Unsupported);
    }

    #[test]
    fn text_document_is_posted_without_history() {
        let mut transcript = ChatTranscript::new(Some("hello".to_string()));

        let request = transcript
            .submit_document("notes.txt", DocumentKind::PlainText, "hola", "me")
            .expect("txt should be accepted");

        assert!(request.history.is_empty());
        assert!(request.message.ends_with("hola"));
        assert_eq!(
            transcript.assistant_messages().last().map(|m| m.text.as_str()),
            Some("[file] notes.txt")
        );
        assert_eq!(
            transcript.submit_document("a.pdf", DocumentKind::NeedsServer, "", "me"),
            Err(ChatError::DocumentNeedsServer)
        );
    }
}
