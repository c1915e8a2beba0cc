//! Conversation turns and their deterministic serialization.
//!
//! Judges must send byte-identical requests for identical conversations so
//! caching and replay testing work; the serialization here is therefore
//! fully deterministic: turn-indexed, XML-escaped, system turns skipped,
//! and the most recent user turn called out in a dedicated block.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    /// Ignored by the serialization; carried so callers can pass raw
    /// transcripts through unfiltered.
    System,
}

/// One turn of the conversation under assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            text: text.into(),
        }
    }
}

fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Serialize a conversation for inclusion in a judge request.
///
/// System turns are skipped; remaining turns are numbered from 1 in order.
/// The most recent user turn is repeated in a `<current_message>` block so
/// the judge weighs it even in long transcripts.
pub fn serialize_conversation(turns: &[ConversationTurn]) -> String {
    let mut out = String::from("<conversation>\n");
    let mut index = 0usize;
    let mut last_user: Option<&str> = None;
    for turn in turns {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => continue,
        };
        index += 1;
        if turn.role == TurnRole::User {
            last_user = Some(&turn.text);
        }
        out.push_str(&format!(
            "<turn index=\"{index}\" role=\"{role}\">{}</turn>\n",
            escape_markup(&turn.text)
        ));
    }
    out.push_str("</conversation>\n");
    if let Some(text) = last_user {
        out.push_str(&format!(
            "<current_message>{}</current_message>\n",
            escape_markup(text)
        ));
    }
    out
}

/// Whether the conversation contains anything worth assessing.
pub fn has_assessable_turns(turns: &[ConversationTurn]) -> bool {
    turns.iter().any(|t| t.role != TurnRole::System)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_is_deterministic() {
        let turns = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
            ConversationTurn::user("I feel low"),
        ];
        assert_eq!(
            serialize_conversation(&turns),
            serialize_conversation(&turns.clone())
        );
    }

    #[test]
    fn turns_are_indexed_and_system_skipped() {
        let turns = vec![
            ConversationTurn::system("you are a helper"),
            ConversationTurn::user("first"),
            ConversationTurn::assistant("second"),
        ];
        let text = serialize_conversation(&turns);
        assert!(text.contains("<turn index=\"1\" role=\"user\">first</turn>"));
        assert!(text.contains("<turn index=\"2\" role=\"assistant\">second</turn>"));
        assert!(!text.contains("you are a helper"));
    }

    #[test]
    fn most_recent_user_turn_called_out() {
        let turns = vec![
            ConversationTurn::user("earlier"),
            ConversationTurn::assistant("ok"),
            ConversationTurn::user("latest worry"),
        ];
        let text = serialize_conversation(&turns);
        assert!(text.contains("<current_message>latest worry</current_message>"));
    }

    #[test]
    fn markup_is_escaped() {
        let turns = vec![ConversationTurn::user("a <b> & </b>")];
        let text = serialize_conversation(&turns);
        assert!(text.contains("a &lt;b&gt; &amp; &lt;/b&gt;"));
        assert!(text.contains("<current_message>a &lt;b&gt; &amp; &lt;/b&gt;</current_message>"));
    }

    #[test]
    fn no_current_message_without_user_turns() {
        let turns = vec![ConversationTurn::assistant("anyone there?")];
        let text = serialize_conversation(&turns);
        assert!(!text.contains("<current_message>"));
    }

    #[test]
    fn assessable_requires_non_system_turns() {
        assert!(!has_assessable_turns(&[ConversationTurn::system("setup")]));
        assert!(!has_assessable_turns(&[]));
        assert!(has_assessable_turns(&[ConversationTurn::user("hi")]));
    }
}
