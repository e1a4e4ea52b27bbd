use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Token accounting reported by the API.
///
/// Streamed responses repeat the running totals on each chunk; the last
/// chunk carries the final figures for the exchange.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt, including history and system instruction.
    #[serde(default)]
    pub prompt_token_count: u32,

    /// Tokens across all generated candidates.
    #[serde(default)]
    pub candidates_token_count: u32,

    /// Tokens spent on internal reasoning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u32>,

    /// Total tokens billed for the call.
    #[serde(default)]
    pub total_token_count: u32,
}

impl UsageMetadata {
    /// Create usage with the given prompt and candidate token counts.
    pub fn new(prompt_token_count: u32, candidates_token_count: u32) -> Self {
        Self {
            prompt_token_count,
            candidates_token_count,
            thoughts_token_count: None,
            total_token_count: prompt_token_count + candidates_token_count,
        }
    }
}

impl Add for UsageMetadata {
    type Output = UsageMetadata;

    fn add(self, rhs: Self) -> Self::Output {
        let thoughts_token_count = match (self.thoughts_token_count, rhs.thoughts_token_count) {
            (None, None) => None,
            (lhs, rhs) => Some(lhs.unwrap_or(0) + rhs.unwrap_or(0)),
        };
        UsageMetadata {
            prompt_token_count: self.prompt_token_count + rhs.prompt_token_count,
            candidates_token_count: self.candidates_token_count + rhs.candidates_token_count,
            thoughts_token_count,
            total_token_count: self.total_token_count + rhs.total_token_count,
        }
    }
}
