//! Captured build output.

/// Complete text output of one build invocation plus its outcome.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTranscript {
    raw_text: String,
    succeeded: bool,
}

impl BuildTranscript {
    pub fn new(raw_text: impl Into<String>, succeeded: bool) -> Self {
        Self {
            raw_text: raw_text.into(),
            succeeded,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Whether the build process exited successfully.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Iterate transcript lines without their terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw_text.lines()
    }

    pub fn into_text(self) -> String {
        self.raw_text
    }
}
