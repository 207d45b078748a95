use crate::git::GitReference;
use crate::image::ImageReference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three source kinds a build can pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Image,
    Http,
    Git,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Image => "image",
            SourceKind::Http => "http",
            SourceKind::Git => "git",
        };
        f.write_str(name)
    }
}

/// An HTTP(S) download URL as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReference {
    pub url: String,
}

/// A reference extracted from a manifest, with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub line: u32,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Image(ImageReference),
    Http(HttpReference),
    Git(GitReference),
}

impl SourceReference {
    pub fn kind(&self) -> SourceKind {
        match &self.source {
            Source::Image(_) => SourceKind::Image,
            Source::Http(_) => SourceKind::Http,
            Source::Git(_) => SourceKind::Git,
        }
    }

    /// The literal as it appeared in the manifest; this is the dedup key.
    pub fn original(&self) -> &str {
        match &self.source {
            Source::Image(image) => image.original(),
            Source::Http(http) => &http.url,
            Source::Git(git) => git.original(),
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.original())
    }
}
