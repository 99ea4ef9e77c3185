//! Header annotation extraction.
//!
//! Solution files carry their classification as comment annotations near
//! the top of the file:
//!
//! ```text
//! # @difficulty: Easy
//! # @tags: array, hash-map
//! # @time: O(n)
//! # @space: O(n)
//! # @leetcode: https://leetcode.com/problems/two-sum/
//! ```
//!
//! Only the first [`HEADER_LINES`] lines are scanned. Anything missing is
//! defaulted rather than treated as an error.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::FileMetadata;

pub const HEADER_LINES: usize = 20;

struct Patterns {
    difficulty: Regex,
    tags: Regex,
    time: Regex,
    space: Regex,
    leetcode: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        difficulty: Regex::new(r"(?i)@difficulty:\s*(\w+)").expect("valid regex"),
        tags: Regex::new(r"(?i)@tags:\s*(.+)").expect("valid regex"),
        time: Regex::new(r"(?i)@time:\s*(.+)").expect("valid regex"),
        space: Regex::new(r"(?i)@space:\s*(.+)").expect("valid regex"),
        leetcode: Regex::new(r"(?i)@leetcode:\s*(https?://\S+)").expect("valid regex"),
    })
}

fn capture(re: &Regex, header: &str) -> Option<String> {
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn extract_metadata(code: &str) -> FileMetadata {
    let header = code.lines().take(HEADER_LINES).collect::<Vec<_>>().join("\n");
    let p = patterns();
    let mut meta = FileMetadata::default();

    if let Some(difficulty) = capture(&p.difficulty, &header) {
        meta.difficulty = difficulty;
    }
    if let Some(tags) = capture(&p.tags, &header) {
        meta.tags = tags
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    meta.time_complexity = capture(&p.time, &header);
    meta.space_complexity = capture(&p.space, &header);
    meta.leetcode_link = capture(&p.leetcode, &header);

    meta
}
