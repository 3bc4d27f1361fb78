use crate::chat::ChatMessage;
use regex::Regex;
use std::sync::OnceLock;

/// A map jump requested by the assistant via an embedded `[map:<place>]` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDirective {
    pub address: String,
}

fn directive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[map:(.+?)\]").expect("directive pattern is valid"))
}

/// First `[map:...]` in the text, trimmed. Blank bodies yield nothing.
pub fn parse_directive(text: &str) -> Option<MapDirective> {
    let captures = directive_pattern().captures(text)?;
    let address = captures.get(1)?.as_str().trim();
    if address.is_empty() {
        return None;
    }
    Some(MapDirective {
        address: address.to_string(),
    })
}

pub fn extract_directive(message: &ChatMessage) -> Option<MapDirective> {
    if !message.is_from_assistant() {
        return None;
    }
    parse_directive(&message.text)
}
