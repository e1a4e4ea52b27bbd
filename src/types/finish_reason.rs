use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reasons why the model stopped generating a candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// The provider did not say.
    FinishReasonUnspecified,

    /// Natural stop point of the model.
    Stop,

    /// The configured maximum number of output tokens was reached.
    MaxTokens,

    /// The candidate was flagged for safety reasons.
    Safety,

    /// The candidate was flagged for reciting training data.
    Recitation,

    /// The candidate used an unsupported language.
    Language,

    /// The candidate contained forbidden terms.
    Blocklist,

    /// The candidate contained prohibited content.
    ProhibitedContent,

    /// The candidate contained sensitive personally identifiable information.
    Spii,

    /// Any other or newer reason.
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// Returns true if the candidate finished normally and its text is complete.
    pub fn is_complete(&self) -> bool {
        matches!(self, FinishReason::Stop | FinishReason::MaxTokens)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::FinishReasonUnspecified => write!(f, "FINISH_REASON_UNSPECIFIED"),
            FinishReason::Stop => write!(f, "STOP"),
            FinishReason::MaxTokens => write!(f, "MAX_TOKENS"),
            FinishReason::Safety => write!(f, "SAFETY"),
            FinishReason::Recitation => write!(f, "RECITATION"),
            FinishReason::Language => write!(f, "LANGUAGE"),
            FinishReason::Blocklist => write!(f, "BLOCKLIST"),
            FinishReason::ProhibitedContent => write!(f, "PROHIBITED_CONTENT"),
            FinishReason::Spii => write!(f, "SPII"),
            FinishReason::Other => write!(f, "OTHER"),
        }
    }
}

/// Error returned when parsing an invalid finish reason string.
#[derive(Debug)]
pub struct FinishReasonParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for FinishReasonParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown finish reason: {}", self.invalid_value)
    }
}

impl std::error::Error for FinishReasonParseError {}

impl FromStr for FinishReason {
    type Err = FinishReasonParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FINISH_REASON_UNSPECIFIED" => Ok(FinishReason::FinishReasonUnspecified),
            "STOP" => Ok(FinishReason::Stop),
            "MAX_TOKENS" => Ok(FinishReason::MaxTokens),
            "SAFETY" => Ok(FinishReason::Safety),
            "RECITATION" => Ok(FinishReason::Recitation),
            "LANGUAGE" => Ok(FinishReason::Language),
            "BLOCKLIST" => Ok(FinishReason::Blocklist),
            "PROHIBITED_CONTENT" => Ok(FinishReason::ProhibitedContent),
            "SPII" => Ok(FinishReason::Spii),
            "OTHER" => Ok(FinishReason::Other),
            _ => Err(FinishReasonParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}
