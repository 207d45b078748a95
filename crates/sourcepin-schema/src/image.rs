use crate::SchemaError;
use std::fmt;

pub const DOCKER_HUB_DOMAIN: &str = "docker.io";
const LEGACY_DOCKER_HUB_DOMAIN: &str = "index.docker.io";
const OFFICIAL_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";

/// A container image reference, normalized the way Docker resolves short names.
///
/// `alpine:3.18` becomes domain `docker.io`, path `library/alpine`, tag `3.18`.
/// The literal as written is kept in [`original`](Self::original) because
/// policy selectors must match it byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    original: String,
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(original: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidImageReference {
            reference: original.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = original.trim();
        if trimmed.is_empty() || trimmed != original {
            return Err(invalid("empty or surrounded by whitespace"));
        }

        let (rest, digest) = match original.split_once('@') {
            Some((name, digest)) => {
                let valid = digest
                    .split_once(':')
                    .is_some_and(|(algo, hex)| !algo.is_empty() && crate::is_hex(hex));
                if !valid {
                    return Err(invalid("malformed digest"));
                }
                (name, Some(digest.to_owned()))
            }
            None => (original, None),
        };

        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&rest[..split], Some(&rest[split + 1..]))
            }
            None => (rest, None),
        };
        if let Some(tag) = tag {
            if !valid_tag(tag) {
                return Err(invalid("malformed tag"));
            }
        }

        let (domain, path) = split_domain(name);
        if path.is_empty() || !path.split('/').all(valid_path_component) {
            return Err(invalid("malformed repository path"));
        }

        Ok(Self {
            original: original.to_owned(),
            domain,
            path,
            tag: tag.map(str::to_owned),
            digest,
        })
    }

    /// The reference exactly as it appeared in the manifest.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// True when the reference already names a digest and needs no pinning.
    pub fn is_digested(&self) -> bool {
        self.digest.is_some()
    }

    /// Fully qualified repository name, e.g. `docker.io/library/alpine`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// An official Docker Hub image (`docker.io/library/*`).
    pub fn is_docker_official(&self) -> bool {
        self.domain == DOCKER_HUB_DOMAIN && self.path.starts_with(OFFICIAL_PREFIX)
    }

    /// Reference to query a registry with: untagged references resolve `latest`.
    pub fn lookup_reference(&self) -> String {
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => format!("{}@{digest}", self.name()),
            (Some(tag), None) => format!("{}:{tag}", self.name()),
            (None, None) => format!("{}:{DEFAULT_TAG}", self.name()),
        }
    }

    /// The normalized reference with `digest` attached, keeping any tag.
    pub fn with_digest(&self, digest: &str) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{tag}@{digest}", self.name()),
            None => format!("{}@{digest}", self.name()),
        }
    }

    /// Rebuild this reference under another domain and path, keeping the tag.
    pub fn rehome(&self, domain: &str, path: &str) -> Self {
        let mut original = format!("{domain}/{path}");
        if let Some(tag) = &self.tag {
            original.push(':');
            original.push_str(tag);
        }
        Self {
            original,
            domain: domain.to_owned(),
            path: path.to_owned(),
            tag: self.tag.clone(),
            digest: None,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn split_domain(name: &str) -> (String, String) {
    let (domain, path) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_owned(), rest.to_owned())
        }
        _ => (DOCKER_HUB_DOMAIN.to_owned(), name.to_owned()),
    };
    let domain = if domain == LEGACY_DOCKER_HUB_DOMAIN {
        DOCKER_HUB_DOMAIN.to_owned()
    } else {
        domain
    };
    let path = if domain == DOCKER_HUB_DOMAIN && !path.contains('/') {
        format!("{OFFICIAL_PREFIX}{path}")
    } else {
        path
    };
    (domain, path)
}

fn valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
}

fn valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    match bytes.first() {
        Some(first) if first.is_ascii_alphanumeric() || *first == b'_' => {}
        _ => return false,
    }
    bytes.len() <= 128
        && bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}
