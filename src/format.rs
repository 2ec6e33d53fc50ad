//! Chat rendering of terminal replies

use chrono::{DateTime, Utc};

/// Size of each piece when a reply exceeds the message limit.
pub const CHUNK_SIZE: usize = 1900;

/// Timestamped status line in a code block.
pub fn output(text: &str, at: DateTime<Utc>) -> String {
    status(text, true, at)
}

/// Timestamped error line in a code block.
pub fn error(text: &str, at: DateTime<Utc>) -> String {
    status(&format!("Error: {text}"), false, at)
}

fn status(text: &str, success: bool, at: DateTime<Utc>) -> String {
    let mark = if success { "✅" } else { "❌" };
    format!("```\n[{}] {mark} {text}\n```", at.format("%H:%M:%S"))
}

pub fn code_block(text: &str, language: &str) -> String {
    format!("```{language}\n{text}\n```")
}

/// Split `text` into pieces of at most [`CHUNK_SIZE`] characters once it is
/// longer than `limit`. Shorter text comes back whole.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let size = CHUNK_SIZE.min(limit).max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|piece| piece.iter().collect())
        .collect()
}
