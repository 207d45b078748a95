//! Reference types, the references input file, and the source policy schema
//! for sourcepin.
//!
//! This crate defines the schema layer: image-reference normalization
//! (`ImageReference`), git URL splitting (`GitReference`), the tagged
//! `SourceReference` sum, the JSON document a manifest parser hands over
//! (`ReferenceFile`), pinned identifier newtypes (`Checksum`, `CommitHash`),
//! and the BuildKit source policy emitted at the end of a run (`Policy`).

pub mod git;
pub mod image;
pub mod input;
pub mod policy;
pub mod reference;
pub mod types;

pub use git::GitReference;
pub use image::{ImageReference, DOCKER_HUB_DOMAIN};
pub use input::{
    parse_references_file, parse_references_str, ExtractedManifest, ReferenceFile,
    ReferenceRecord,
};
pub use policy::{MatchType, Policy, PolicyAction, Rule, Selector, Update};
pub use reference::{HttpReference, Source, SourceKind, SourceReference};
pub use types::{is_hex, Checksum, CommitHash, SHA256_PREFIX};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read references file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },
    #[error("invalid git reference '{reference}': {reason}")]
    InvalidGitReference { reference: String, reason: String },
    #[error("unsupported policy version: {0}, expected 1")]
    UnsupportedPolicyVersion(i64),
    #[error("policy rule {index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("policy did not survive a JSON round-trip")]
    PolicyRoundTrip,
}
