//! Where a protocol document comes from

use std::fmt;
use std::path::PathBuf;

/// A protocol document location, resolved once from user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Local file
    Path(PathBuf),
    /// HTTP(S) location
    Uri(String),
}

impl DocumentSource {
    /// Classify `input`; blank input yields `None`
    pub fn resolve(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.starts_with("http://") || input.starts_with("https://") {
            Some(Self::Uri(input.to_string()))
        } else {
            Some(Self::Path(PathBuf::from(input)))
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Uri(uri) => f.write_str(uri),
        }
    }
}
