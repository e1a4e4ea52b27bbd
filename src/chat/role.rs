use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who is asking, which sets the register of the answer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    #[default]
    #[serde(rename = "Patient")]
    Patient,

    #[serde(rename = "Medical Student")]
    MedicalStudent,

    #[serde(rename = "Practicing Urologist")]
    PracticingUrologist,
}

impl UserRole {
    /// Every role, in selector order.
    pub const ALL: [UserRole; 3] = [
        UserRole::Patient,
        UserRole::MedicalStudent,
        UserRole::PracticingUrologist,
    ];

    /// The label shown to the user and embedded in composed prompts.
    pub fn label(&self) -> &'static str {
        match self {
            UserRole::Patient => "Patient",
            UserRole::MedicalStudent => "Medical Student",
            UserRole::PracticingUrologist => "Practicing Urologist",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string names no role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoleParseError {
    input: String,
}

impl fmt::Display for UserRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown role '{}' (expected patient, student, or urologist)",
            self.input
        )
    }
}

impl std::error::Error for UserRoleParseError {}

impl FromStr for UserRole {
    type Err = UserRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalized.as_str() {
            "patient" => Ok(UserRole::Patient),
            "student" | "medical student" => Ok(UserRole::MedicalStudent),
            "urologist" | "practicing urologist" => Ok(UserRole::PracticingUrologist),
            _ => Err(UserRoleParseError {
                input: s.to_string(),
            }),
        }
    }
}
