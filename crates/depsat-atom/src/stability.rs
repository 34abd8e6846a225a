use std::fmt;

/// Stability band of a candidate version.
///
/// Bands are ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stability {
    Stable,
    Testing,
    Unstable,
}

impl Stability {
    /// Classify a keyword marker.
    ///
    /// No marker, or a plain architecture keyword, is stable. A `~` prefix
    /// marks testing and `**` marks unstable.
    pub fn from_keyword(keyword: Option<&str>) -> Self {
        match keyword {
            Some("**") => Stability::Unstable,
            Some(k) if k.starts_with('~') => Stability::Testing,
            _ => Stability::Stable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Testing => "testing",
            Stability::Unstable => "unstable",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
