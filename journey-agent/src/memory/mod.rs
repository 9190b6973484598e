use serde::{Deserialize, Serialize};

pub const OBSERVATION_PREFIX: &str = "Observation: ";

/// Append-only conversation history. Rendering it produces the next prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a transcript with the user's request.
    pub fn with_request(request: &str) -> Self {
        let mut transcript = Self::new();
        transcript.append(format!("User request: {}", request));
        transcript
    }

    pub fn append(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    pub fn append_observation(&mut self, observation: &str) {
        self.append(format!("{}{}", OBSERVATION_PREFIX, observation));
    }

    pub fn render(&self) -> String {
        self.entries.join("\n")
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
