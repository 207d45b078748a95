use crate::context::ResolveContext;
use crate::mirror::Mirror;
use crate::registry::{DigestResolver, RegistryError};
use crate::FatalError;
use sourcepin_schema::{is_hex, ImageReference};
use std::sync::Arc;

/// An image reference pinned to a manifest digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedImage {
    /// The reference as written in the manifest.
    pub original: String,
    /// Normalized reference with digest, e.g.
    /// `docker.io/library/alpine:3.18@sha256:...`. Names the mirror when one
    /// answered.
    pub pinned: String,
    pub mirror: Option<Mirror>,
}

/// Pins image references through a [`DigestResolver`], trying the preferred
/// mirrors first.
pub struct ImageResolver {
    registry: Arc<dyn DigestResolver>,
    mirrors: Vec<Mirror>,
}

impl ImageResolver {
    pub fn new(registry: Arc<dyn DigestResolver>) -> Self {
        Self {
            registry,
            mirrors: Vec::new(),
        }
    }

    /// Mirrors are tried in the given order before the original registry.
    #[must_use]
    pub fn with_mirrors(mut self, mirrors: Vec<Mirror>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn resolve(
        &self,
        image: &ImageReference,
        ctx: &ResolveContext,
    ) -> Result<PinnedImage, FatalError> {
        for mirror in &self.mirrors {
            let Some(mapped) = mirror.map(image) else {
                continue;
            };
            ctx.check()?;
            let lookup = mapped.lookup_reference();
            match self.registry.digest(&lookup, ctx) {
                Ok(digest) => {
                    tracing::debug!("{}: pinned via {mirror}", image.original());
                    return pin(image, &mapped, &digest, Some(*mirror));
                }
                Err(e) if e.is_not_found_or_unauthorized() => {
                    tracing::debug!("{lookup} unavailable on {mirror}: {e}");
                }
                Err(e) => return Err(registry_error(lookup, e)),
            }
        }

        ctx.check()?;
        let lookup = image.lookup_reference();
        let digest = self
            .registry
            .digest(&lookup, ctx)
            .map_err(|e| registry_error(lookup, e))?;
        pin(image, image, &digest, None)
    }
}

fn registry_error(reference: String, source: RegistryError) -> FatalError {
    match source {
        RegistryError::Process(e) if e.is_cancelled() => FatalError::Cancelled,
        source => FatalError::Registry { reference, source },
    }
}

fn pin(
    image: &ImageReference,
    resolved: &ImageReference,
    digest: &str,
    mirror: Option<Mirror>,
) -> Result<PinnedImage, FatalError> {
    if !is_valid_digest(digest) {
        return Err(FatalError::InvalidDigest {
            reference: resolved.lookup_reference(),
            digest: digest.to_owned(),
        });
    }
    Ok(PinnedImage {
        original: image.original().to_owned(),
        pinned: resolved.with_digest(digest),
        mirror,
    })
}

/// `sha256`, `sha384` or `sha512` with a lowercase hex encoding of the right length.
fn is_valid_digest(digest: &str) -> bool {
    let Some((algorithm, hex)) = digest.split_once(':') else {
        return false;
    };
    let expected = match algorithm {
        "sha256" => 64,
        "sha384" => 96,
        "sha512" => 128,
        _ => return false,
    };
    hex.len() == expected && is_hex(hex) && !hex.bytes().any(|b| b.is_ascii_uppercase())
}
