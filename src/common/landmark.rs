use serde::Serialize;
use std::fmt;

/// Names a recognition service may answer with when it has nothing.
const UNIDENTIFIED_MARKERS: [&str; 3] = ["unknown", "unidentified", "none"];

/// Result of visual recognition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum LandmarkId {
    Identified(String),
    Unidentified,
}

impl LandmarkId {
    /// Normalise a raw service answer. Blank answers and "unknown"-style markers are unidentified.
    pub fn from_raw(raw: impl AsRef<str>) -> Self {
        let name = raw.as_ref().trim();
        if name.is_empty()
            || UNIDENTIFIED_MARKERS
                .iter()
                .any(|marker| name.eq_ignore_ascii_case(marker))
        {
            LandmarkId::Unidentified
        } else {
            LandmarkId::Identified(name.to_string())
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, LandmarkId::Identified(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            LandmarkId::Identified(name) => Some(name),
            LandmarkId::Unidentified => None,
        }
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandmarkId::Identified(name) => f.write_str(name),
            LandmarkId::Unidentified => f.write_str("<unidentified>"),
        }
    }
}

/// Locator of a downloadable 3D asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AssetReference(String);

impl AssetReference {
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let locator = raw.as_ref().trim();
        (!locator.is_empty()).then(|| Self(locator.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Narration text. Empty text means the narration service produced nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NarrationText(String);

impl NarrationText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
