//! Outbound message sinks.
//! Fire-and-forget delivery to chat and console with a fixed byte budget;
//! failures are logged, never surfaced to the pipeline.

use tracing::debug;

/// Byte budget for a single outbound message (Twitch caps messages around
/// 500 characters; stay under it after UTF-8 encoding).
pub const MESSAGE_BYTE_BUDGET: usize = 450;

/// Truncate to at most `budget` bytes without splitting a UTF-8 character.
pub fn truncate_to_bytes(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Destination for translated / status output.
pub trait ChatSink: Send + Sync {
    /// Best-effort delivery to the chat channel.
    fn send_chat_message(&self, text: &str, header: Option<&str>, footer: Option<&str>);

    /// Best-effort delivery to the local console.
    fn print_console_message(&self, text: &str, header: Option<&str>, footer: Option<&str>);
}

fn compose(text: &str, header: Option<&str>, footer: Option<&str>) -> String {
    let mut message = String::new();
    if let Some(header) = header {
        message.push_str(header);
        message.push(' ');
    }
    message.push_str(text);
    if let Some(footer) = footer {
        message.push(' ');
        message.push_str(footer);
    }
    message
}

/// Console-backed sink. The chat side of the platform integration is a
/// black box; in this binary both channels print locally.
pub struct ConsoleSink;

impl ChatSink for ConsoleSink {
    fn send_chat_message(&self, text: &str, header: Option<&str>, footer: Option<&str>) {
        let message = compose(text, header, footer);
        let message = truncate_to_bytes(&message, MESSAGE_BYTE_BUDGET);
        debug!(bytes = message.len(), "sending chat message");
        println!("[chat] {message}");
    }

    fn print_console_message(&self, text: &str, header: Option<&str>, footer: Option<&str>) {
        let message = compose(text, header, footer);
        let message = truncate_to_bytes(&message, MESSAGE_BYTE_BUDGET);
        println!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_to_bytes("hello", 10), "hello");
        assert_eq!(truncate_to_bytes("hello", 3), "hel");
        // "あ" is 3 bytes; cutting at 4 must not split the second char.
        assert_eq!(truncate_to_bytes("ああ", 4), "あ");
        assert_eq!(truncate_to_bytes("あ", 2), "");
    }

    #[test]
    fn compose_applies_header_and_footer() {
        assert_eq!(compose("hi", Some(">"), Some("<")), "> hi <");
        assert_eq!(compose("hi", None, None), "hi");
    }
}
