use crate::common::LandmarkId;

/// Prompt asking a text model for a short spoken history of a landmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationPrompt {
    landmark: String,
    min_words: u32,
    max_words: u32,
}

impl NarrationPrompt {
    /// `None` for an unidentified landmark: there is nothing to narrate.
    pub fn for_landmark(landmark: &LandmarkId, min_words: u32, max_words: u32) -> Option<Self> {
        landmark.name().map(|name| Self {
            landmark: name.to_string(),
            min_words,
            max_words,
        })
    }

    pub fn landmark(&self) -> &str {
        &self.landmark
    }

    pub fn render(&self) -> String {
        format!(
            "Give a short historical narration ({}–{} words) about the monument: {}.",
            self.min_words, self.max_words, self.landmark
        )
    }
}
