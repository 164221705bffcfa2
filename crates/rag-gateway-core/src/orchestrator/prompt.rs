//! Conversation shaping: query extraction and context injection.

use rag_gateway_protocol::{ChatMessage, Role};

/// The newest user message with non-empty content.
///
/// Whitespace-only content counts as non-empty.
pub fn latest_user_query(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User && !message.content.is_empty())
}

/// System message carrying the selected document.
///
/// Documents that are not valid UTF-8 are decoded lossily.
pub fn context_message(preamble: &str, document: &[u8]) -> ChatMessage {
    let content = String::from_utf8_lossy(document);
    ChatMessage::system(format!("{preamble}Context: {content}"))
}

/// Prepend `context` to `messages`, leaving the rest untouched.
pub fn with_context(messages: Vec<ChatMessage>, context: Option<ChatMessage>) -> Vec<ChatMessage> {
    match context {
        Some(context) => {
            let mut augmented = Vec::with_capacity(messages.len() + 1);
            augmented.push(context);
            augmented.extend(messages);
            augmented
        }
        None => messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_newest_user_message() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
            ChatMessage::assistant("reply"),
        ];
        let query = latest_user_query(&messages).expect("query");
        assert_eq!(query.content, "second");
    }

    #[test]
    fn skips_empty_user_messages() {
        let messages = vec![ChatMessage::user("real question"), ChatMessage::user("")];
        let query = latest_user_query(&messages).expect("query");
        assert_eq!(query.content, "real question");
    }

    #[test]
    fn whitespace_counts_as_content() {
        let messages = vec![ChatMessage::user("question"), ChatMessage::user("  ")];
        let query = latest_user_query(&messages).expect("query");
        assert_eq!(query.content, "  ");
    }

    #[test]
    fn no_user_message_means_no_query() {
        let messages = vec![ChatMessage::system("rules"), ChatMessage::assistant("hi")];
        assert_eq!(latest_user_query(&messages), None);
        assert_eq!(latest_user_query(&[]), None);
    }

    #[test]
    fn context_message_concatenates_preamble_and_document() {
        let message = context_message("Use this.\n", b"Paris is in France.");
        assert_eq!(message.role, Role::System);
        assert_eq!(message.content, "Use this.\nContext: Paris is in France.");
    }

    #[test]
    fn context_message_decodes_lossily() {
        let message = context_message("", &[b'o', b'k', 0xff]);
        assert_eq!(message.content, "Context: ok\u{fffd}");
    }

    #[test]
    fn injection_prepends_exactly_one_message() {
        let original = vec![ChatMessage::user("q")];
        let augmented = with_context(original.clone(), Some(ChatMessage::system("ctx")));
        assert_eq!(augmented.len(), 2);
        assert_eq!(augmented[0], ChatMessage::system("ctx"));
        assert_eq!(&augmented[1..], original.as_slice());
        assert_eq!(with_context(original.clone(), None), original);
    }
}
