//! Heuristic conversation analysis
//!
//! Extracts task description, completed steps, decisions, and blockers from
//! the normalized message stream. The heuristics are lexical and
//! English-only; they never fail, and the absence of a signal yields an
//! empty list.

use crate::adapters::util::{truncate_with_ellipsis, DedupList};
use crate::types::{ConversationMessage, Role};

const MAX_DESCRIPTION_CHARS: usize = 300;
const MAX_SENTENCE_CHARS: usize = 200;
const MAX_DECISIONS: usize = 10;
const MAX_BLOCKERS: usize = 10;
const MAX_COMPLETED: usize = 15;
const MIN_SENTENCE_CHARS: usize = 8;

/// Phrase markers checked as substrings of a lowercased sentence.
const DECISION_MARKERS: &[&str] = &[
    "decided to",
    "will use",
    "going with",
    "chose to",
    "opted for",
    "approach:",
    "decision:",
];

const BLOCKER_MARKERS: &[&str] = &[
    "blocked by",
    "blocked on",
    "waiting on",
    "waiting for",
    "cannot",
    "can't",
    "unable to",
    "fails with",
    "failing with",
    "rate limit",
    "rate-limit",
];

/// Single-word completion markers are matched on word boundaries so that
/// e.g. "abandoned" does not read as "done".
const COMPLETED_WORDS: &[&str] = &["done", "completed", "finished"];

/// Past-tense file-write verbs; a match also requires something path-like in
/// the sentence.
const FILE_WRITE_VERBS: &[&str] = &["created", "wrote", "added"];

/// Result of analyzing one conversation.
#[derive(Debug, Default)]
pub struct Analysis {
    pub task_description: String,
    pub completed: Vec<String>,
    pub decisions: Vec<String>,
    pub blockers: Vec<String>,
}

/// Analyze the ordered message list.
///
/// `thoughts` is reasoning-block text some adapters extract separately; it
/// feeds the decision list directly.
pub fn analyze(messages: &[ConversationMessage], thoughts: &[String]) -> Analysis {
    let task_description = messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| truncate_with_ellipsis(m.content.trim(), MAX_DESCRIPTION_CHARS))
        .unwrap_or_else(|| "Unknown task".to_string());

    let mut decisions = DedupList::new();
    let mut blockers = DedupList::new();
    let mut completed = DedupList::new();

    for thought in thoughts {
        if decisions.len() >= MAX_DECISIONS {
            break;
        }
        decisions.push(truncate_with_ellipsis(thought.trim(), MAX_SENTENCE_CHARS));
    }

    for message in messages {
        // Tool messages carry serialized arguments which would match
        // everything; only prose participates.
        if message.role == Role::Tool || message.content.trim().is_empty() {
            continue;
        }

        for sentence in sentences(&message.content) {
            let lower = sentence.to_lowercase();

            if decisions.len() < MAX_DECISIONS && contains_any(&lower, DECISION_MARKERS) {
                decisions.push(truncate_with_ellipsis(sentence, MAX_SENTENCE_CHARS));
            }
            if blockers.len() < MAX_BLOCKERS && contains_any(&lower, BLOCKER_MARKERS) {
                blockers.push(truncate_with_ellipsis(sentence, MAX_SENTENCE_CHARS));
            }
            if message.role == Role::Assistant
                && completed.len() < MAX_COMPLETED
                && is_completed_sentence(&lower)
            {
                completed.push(truncate_with_ellipsis(sentence, MAX_SENTENCE_CHARS));
            }
        }
    }

    Analysis {
        task_description,
        completed: completed.into_vec(),
        decisions: decisions.into_vec(),
        blockers: blockers.into_vec(),
    }
}

/// Split text into sentence-ish segments: line breaks and `. ` both end a
/// sentence. Good enough for marker matching.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .flat_map(|line| line.split(". "))
        .map(str::trim)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
}

fn contains_any(lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| lower.contains(m))
}

fn has_word(lower: &str, words: &[&str]) -> bool {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|token| words.contains(&token))
}

fn is_completed_sentence(lower: &str) -> bool {
    if has_word(lower, COMPLETED_WORDS) {
        return true;
    }
    // Past-tense statements about file writes: "created src/routes/users.ts"
    has_word(lower, FILE_WRITE_VERBS) && (lower.contains('/') || lower.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
            tool_name: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_task_description_is_first_user_message() {
        let messages = vec![
            msg(Role::Assistant, "Hello!"),
            msg(Role::User, "  Fix the flaky websocket test  "),
            msg(Role::User, "second message"),
        ];
        let analysis = analyze(&messages, &[]);
        assert_eq!(analysis.task_description, "Fix the flaky websocket test");
    }

    #[test]
    fn test_unknown_task_without_user_message() {
        let messages = vec![msg(Role::Assistant, "hi")];
        assert_eq!(analyze(&messages, &[]).task_description, "Unknown task");
        assert_eq!(analyze(&[], &[]).task_description, "Unknown task");
    }

    #[test]
    fn test_decision_extraction() {
        let messages = vec![msg(
            Role::Assistant,
            "I decided to use sqlite for storage. We will use serde for the wire format.",
        )];
        let analysis = analyze(&messages, &[]);
        assert_eq!(analysis.decisions.len(), 2);
        assert!(analysis.decisions[0].contains("decided to use sqlite"));
    }

    #[test]
    fn test_thoughts_feed_decisions() {
        let analysis = analyze(&[], &["Sticking with the adapter trait design".to_string()]);
        assert_eq!(
            analysis.decisions,
            vec!["Sticking with the adapter trait design"]
        );
    }

    #[test]
    fn test_blocker_extraction() {
        let messages = vec![
            msg(Role::Assistant, "The build fails with a linker error."),
            msg(Role::Assistant, "We are blocked by the missing API key."),
            msg(Role::Assistant, "Also hitting a rate limit on retries."),
        ];
        let analysis = analyze(&messages, &[]);
        assert_eq!(analysis.blockers.len(), 3);
    }

    #[test]
    fn test_completed_requires_word_boundary() {
        let messages = vec![
            msg(Role::Assistant, "The old plan was abandoned entirely."),
            msg(Role::Assistant, "Migration is done for both tables."),
            msg(Role::Assistant, "I created src/routes/users.ts for the router."),
        ];
        let analysis = analyze(&messages, &[]);
        assert_eq!(analysis.completed.len(), 2);
        assert!(analysis.completed[0].contains("Migration is done"));
        assert!(analysis.completed[1].contains("users.ts"));
    }

    #[test]
    fn test_completed_ignores_user_claims() {
        let messages = vec![msg(Role::User, "this is done, please continue")];
        assert!(analyze(&messages, &[]).completed.is_empty());
    }

    #[test]
    fn test_tool_messages_are_skipped() {
        let mut tool = msg(Role::Tool, "{\"command\": \"echo decided to\"}");
        tool.tool_name = Some("Bash".to_string());
        assert!(analyze(&[tool], &[]).decisions.is_empty());
    }

    #[test]
    fn test_outputs_are_deduplicated() {
        let messages = vec![
            msg(Role::Assistant, "I decided to use rusqlite here."),
            msg(Role::Assistant, "I decided to use rusqlite here."),
        ];
        assert_eq!(analyze(&messages, &[]).decisions.len(), 1);
    }
}
