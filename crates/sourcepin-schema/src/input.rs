use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One reference as a manifest parser reports it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReferenceRecord {
    pub original: String,
    #[serde(default)]
    pub line: u32,
}

/// References extracted from one build manifest, per kind, in manifest order.
/// Manifest-level skip rules (unexpanded variables, stage aliases, scratch)
/// have already been applied by the parser.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtractedManifest {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub images: Vec<ReferenceRecord>,
    #[serde(default)]
    pub http: Vec<ReferenceRecord>,
    #[serde(default)]
    pub git: Vec<ReferenceRecord>,
}

impl ExtractedManifest {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.http.is_empty() && self.git.is_empty()
    }

    pub fn display_name(&self) -> &str {
        self.path.as_deref().unwrap_or("<unnamed>")
    }
}

/// The `references.json` document consumed by `sourcepin pin`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReferenceFile {
    pub manifests: Vec<ExtractedManifest>,
}

impl ReferenceFile {
    pub fn reference_count(&self) -> usize {
        self.manifests
            .iter()
            .map(|m| m.images.len() + m.http.len() + m.git.len())
            .sum()
    }
}

pub fn parse_references_str(input: &str) -> Result<ReferenceFile, SchemaError> {
    Ok(serde_json::from_str(input)?)
}

pub fn parse_references_file(path: &Path) -> Result<ReferenceFile, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_references_str(&content)
}
