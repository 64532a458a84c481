use serde::{Deserialize, Serialize};

/// Question put to the operator before a destructive edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub header: String,
    pub message: String,
}

impl Prompt {
    pub fn new(header: &str, message: impl Into<String>) -> Self {
        Self {
            header: header.to_string(),
            message: message.into(),
        }
    }

    pub fn discard_changes() -> Self {
        Self::new(
            "Änderungen zurücksetzen?",
            "Möchten Sie Ihre Änderungen wirklich zurücksetzen?",
        )
    }
}

/// Answers prompts. A plain `bool` is an operator who already answered.
pub trait Confirm {
    fn confirm(&self, prompt: &Prompt) -> bool;
}

impl Confirm for bool {
    fn confirm(&self, _prompt: &Prompt) -> bool {
        *self
    }
}

/// What happened to a requested edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Outcome {
    Applied,
    Unchanged,
    Declined { prompt: Prompt },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}
