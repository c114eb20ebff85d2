//! Identity of one producer attempt within a shuffle fetch batch.

use std::fmt;

/// Identifies one producer attempt whose output this fetcher may drain.
///
/// Two [`AttemptId`]s are equal iff their `input_index` and `attempt_number`
/// match; the `path_component` is carried for wire routing only and does not
/// participate in equality or ordering.
#[derive(Debug, Clone, Eq)]
pub struct AttemptId {
    /// Index of the input (producer) this attempt belongs to, unique within
    /// the consuming task.
    input_index: u32,
    /// Distinguishes re-executions of the same input.
    attempt_number: u32,
    /// Server-assigned routing token echoed by the response header.
    path_component: String,
}

impl AttemptId {
    /// Creates a new attempt identifier.
    #[must_use]
    pub fn new(input_index: u32, attempt_number: u32, path_component: impl Into<String>) -> Self {
        Self {
            input_index,
            attempt_number,
            path_component: path_component.into(),
        }
    }

    /// Index of the input (producer) this attempt belongs to.
    #[must_use]
    pub fn input_index(&self) -> u32 {
        self.input_index
    }

    /// Distinguishes re-executions of the same input.
    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// The routing token the serving daemon echoes on the wire.
    #[must_use]
    pub fn path_component(&self) -> &str {
        &self.path_component
    }
}

impl PartialEq for AttemptId {
    fn eq(&self, other: &Self) -> bool {
        self.input_index == other.input_index && self.attempt_number == other.attempt_number
    }
}

impl std::hash::Hash for AttemptId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.input_index.hash(state);
        self.attempt_number.hash(state);
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt[input={}, attempt={}, path={}]",
            self.input_index, self.attempt_number, self.path_component
        )
    }
}
