//! BuildKit source policy documents.
//!
//! A policy is an ordered list of `CONVERT` rules. Each rule selects one source
//! identifier exactly as it appeared in the build manifest and rewrites it to a
//! pinned form: a digested image identifier, or checksum attributes for HTTP
//! and git sources.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const POLICY_VERSION: i64 = 1;

const DOCKER_IMAGE_SCHEME: &str = "docker-image://";
const HTTP_CHECKSUM_ATTR: &str = "http.checksum";
const HTTP_HEADER_ATTR_PREFIX: &str = "http.header.";
const GIT_CHECKSUM_ATTR: &str = "git.checksum";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Wildcard,
    Exact,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub identifier: String,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: PolicyAction,
    pub selector: Selector,
    pub updates: Update,
}

impl Rule {
    fn convert_exact(identifier: String, updates: Update) -> Self {
        Self {
            action: PolicyAction::Convert,
            selector: Selector {
                identifier,
                match_type: MatchType::Exact,
            },
            updates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub version: i64,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy {
    pub fn new() -> Self {
        Self {
            version: POLICY_VERSION,
            rules: Vec::new(),
        }
    }

    /// Pin an image reference: `original` is the literal from the manifest,
    /// `pinned` the normalized reference carrying a digest.
    pub fn add_pin_rule(&mut self, original: &str, pinned: &str) {
        self.rules.push(Rule::convert_exact(
            format!("{DOCKER_IMAGE_SCHEME}{original}"),
            Update {
                identifier: format!("{DOCKER_IMAGE_SCHEME}{pinned}"),
                attrs: BTreeMap::new(),
            },
        ));
    }

    /// Pin an HTTP source to a checksum. Each captured request header becomes
    /// an `http.header.<name>` attribute so the build fetches the same variant.
    pub fn add_http_checksum_rule(
        &mut self,
        url: &str,
        checksum: &str,
        headers: &BTreeMap<String, String>,
    ) {
        let mut attrs = BTreeMap::new();
        attrs.insert(HTTP_CHECKSUM_ATTR.to_owned(), checksum.to_owned());
        for (name, value) in headers {
            attrs.insert(format!("{HTTP_HEADER_ATTR_PREFIX}{name}"), value.clone());
        }
        self.rules.push(Rule::convert_exact(
            url.to_owned(),
            Update {
                identifier: String::new(),
                attrs,
            },
        ));
    }

    /// Pin a git source (the full `remote#ref` literal) to a commit hash.
    pub fn add_git_checksum_rule(&mut self, url: &str, commit: &str) {
        let mut attrs = BTreeMap::new();
        attrs.insert(GIT_CHECKSUM_ATTR.to_owned(), commit.to_owned());
        self.rules.push(Rule::convert_exact(
            url.to_owned(),
            Update {
                identifier: String::new(),
                attrs,
            },
        ));
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Round-trip the policy through its JSON encoding and confirm nothing is
    /// lost, which is what a consumer loading the file will see.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version != POLICY_VERSION {
            return Err(SchemaError::UnsupportedPolicyVersion(self.version));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.selector.identifier.is_empty() {
                return Err(SchemaError::InvalidRule {
                    index,
                    reason: "empty selector identifier".to_owned(),
                });
            }
        }
        let reloaded = Self::from_json(&serde_json::to_string(self)?)?;
        if reloaded != *self {
            return Err(SchemaError::PolicyRoundTrip);
        }
        Ok(())
    }
}
