//! A summarizer that runs locally and deterministically.
//!
//! It does not understand the conversation. It records who said what,
//! in order, in the first person of the assistant, until the word budget
//! runs out.

use async_trait::async_trait;
use continuum_core::{Role, Turn};

use crate::summarizer::{SummarizeError, Summarizer, clamp_words};

/// Words quoted from each turn.
const SNIPPET_WORDS: usize = 12;

/// Builds a bounded digest of the transcript.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestSummarizer;

fn snippet(text: &str) -> String {
    let clamped = clamp_words(text, SNIPPET_WORDS);
    if text.split_whitespace().nth(SNIPPET_WORDS).is_some() {
        format!("{clamped}...")
    } else {
        clamped
    }
}

fn describe(turn: &Turn) -> Option<String> {
    let content = turn.content.as_deref().filter(|c| !c.trim().is_empty());
    match turn.role {
        Role::User => content.map(|c| format!("The user said \"{}\".", snippet(c))),
        Role::Assistant => match (content, &turn.tool_calls) {
            (Some(c), _) => Some(format!("I replied \"{}\".", snippet(c))),
            (None, Some(calls)) if !calls.is_empty() => {
                let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                Some(format!("I called {}.", names.join(", ")))
            }
            (None, _) => None,
        },
        Role::Tool => content.map(|c| format!("A tool returned \"{}\".", snippet(c))),
    }
}

#[async_trait]
impl Summarizer for DigestSummarizer {
    async fn summarize(&self, transcript: &[Turn], word_limit: usize) -> Result<String, SummarizeError> {
        let digest = transcript
            .iter()
            .filter_map(describe)
            .collect::<Vec<_>>()
            .join(" ");
        let digest = clamp_words(&digest, word_limit);
        if digest.is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use continuum_core::ToolCall;

    use super::*;

    #[tokio::test]
    async fn test_digest_follows_transcript_order() {
        let transcript = vec![
            Turn::user("1", "what's the weather"),
            Turn::tool_request(
                "2",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "weather".into(),
                    arguments: "{}".into(),
                }],
            ),
            Turn::tool_result("3", "c1", "sunny"),
            Turn::assistant("4", "It is sunny."),
        ];

        let digest = DigestSummarizer.summarize(&transcript, 100).await.unwrap();
        assert_eq!(
            digest,
            "The user said \"what's the weather\". I called weather. \
             A tool returned \"sunny\". I replied \"It is sunny.\"."
        );
    }

    #[tokio::test]
    async fn test_digest_respects_word_limit() {
        let long = "word ".repeat(40);
        let transcript: Vec<Turn> = (0..20).map(|i| Turn::user(i.to_string(), long.clone())).collect();

        let digest = DigestSummarizer.summarize(&transcript, 100).await.unwrap();
        assert_eq!(digest.split_whitespace().count(), 100);
        assert!(digest.starts_with("The user said \"word"));
    }

    #[tokio::test]
    async fn test_empty_transcript_is_an_error() {
        let result = DigestSummarizer.summarize(&[], 100).await;
        assert!(matches!(result, Err(SummarizeError::Empty)));
    }
}
