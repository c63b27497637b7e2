use crate::conversation::{message_text, Conversation, Role};

/// Placeholder titles providers hand out before a real one is generated.
const GENERIC_TITLES: &[&str] = &[
    "",
    "new chat",
    "new conversation",
    "untitled",
    "untitled conversation",
    "chatgpt",
    "gemini",
    "grok",
    "...",
];

/// Whether a title is a provider placeholder rather than a real one.
pub fn is_generic_title(title: &str) -> bool {
    let t = title.trim().to_lowercase();
    GENERIC_TITLES.contains(&t.as_str())
}

/// Fallback title: the first user message text, in message-time order.
pub fn derive_title_from_first_user(conv: &Conversation) -> Option<String> {
    conv.messages_by_time()
        .into_iter()
        .filter_map(|n| n.message.as_ref())
        .find(|m| m.author.role == Role::User)
        .map(message_text)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Author, Content, Message, Status, ROOT_ID};
    use serde_json::Value;

    #[test]
    fn placeholders_are_generic() {
        assert!(is_generic_title(""));
        assert!(is_generic_title("New chat"));
        assert!(is_generic_title("  Untitled  "));
        assert!(!is_generic_title("Hadith Authenticity"));
    }

    #[test]
    fn first_user_message_becomes_title() {
        let mut conv = Conversation::new("c1");
        conv.add_message(
            ROOT_ID,
            Message {
                id: "u1".into(),
                author: Author {
                    role: Role::User,
                    name: None,
                    metadata: Value::Null,
                },
                content: Content::text(vec!["What is calibration?".into()]),
                status: Status::FinishedSuccessfully,
                end_turn: Some(true),
                create_time: Some(1.0),
                update_time: Some(1.0),
                metadata: Value::Null,
            },
        );
        assert_eq!(
            derive_title_from_first_user(&conv).as_deref(),
            Some("What is calibration?")
        );
    }

    #[test]
    fn no_user_message_means_no_title() {
        let conv = Conversation::new("c1");
        assert!(derive_title_from_first_user(&conv).is_none());
    }
}
