//! GitHub release assets: the releases API publishes a `digest` per asset, so
//! the checksum is one small metadata request away.

use crate::config::ResolverConfig;
use crate::context::ResolveContext;
use crate::interrupt::interruptible;
use crate::ResolveError;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use sourcepin_schema::Checksum;
use std::time::Duration;
use url::Url;

const GITHUB_HOST: &str = "github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// A `https://github.com/<owner>/<repo>/releases/download/<tag>/<asset>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub owner: String,
    pub repo: String,
    /// Tag as it appears in the URL path, still percent-encoded.
    pub tag: String,
    /// Asset name, percent-decoded to match the API's `name` field.
    pub name: String,
}

impl ReleaseAsset {
    pub fn from_url(url: &Url) -> Option<Self> {
        if url.host_str() != Some(GITHUB_HOST) {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.collect();
        if segments.len() < 6 || segments[2] != "releases" || segments[3] != "download" {
            return None;
        }
        let raw_name = segments[5..].join("/");
        let name = percent_decode_str(&raw_name).decode_utf8().ok()?.into_owned();
        Some(Self {
            owner: segments[0].to_owned(),
            repo: segments[1].to_owned(),
            tag: segments[4].to_owned(),
            name,
        })
    }

    pub fn api_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/tags/{}",
            api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.tag
        )
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    #[serde(default)]
    digest: Option<String>,
}

/// Ask the releases API for the asset's digest.
///
/// `Ok(None)` means the strategy did not apply (network trouble, 404, asset
/// missing, no SHA-256 digest published) and the caller should move on. Only
/// 401/403 and cancellation are terminal.
pub(crate) fn lookup_digest(
    agent: &ureq::Agent,
    config: &ResolverConfig,
    original_url: &str,
    asset: &ReleaseAsset,
    ctx: &ResolveContext,
    timeout: Duration,
) -> Result<Option<Checksum>, ResolveError> {
    let agent = agent.clone();
    let config = config.clone();
    let original_url = original_url.to_owned();
    let asset = asset.clone();
    interruptible(ctx, move || {
        fetch_digest(&agent, &config, &original_url, &asset, timeout)
    })?
}

fn fetch_digest(
    agent: &ureq::Agent,
    config: &ResolverConfig,
    original_url: &str,
    asset: &ReleaseAsset,
    timeout: Duration,
) -> Result<Option<Checksum>, ResolveError> {
    let api_url = asset.api_url(&config.github_api_url);
    tracing::debug!("GET {api_url}");

    let mut request = agent
        .get(&api_url)
        .header("User-Agent", &config.user_agent)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
    if let Some(token) = &config.github_token {
        request = request.header("Authorization", &format!("Bearer {token}"));
    }

    let response = match request
        .config()
        .timeout_global(Some(timeout))
        .build()
        .call()
    {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("release API unavailable for {original_url}: {e}");
            return Ok(None);
        }
    };

    match response.status().as_u16() {
        200 => {}
        status @ (401 | 403) => {
            return Err(ResolveError::Auth {
                url: original_url.to_owned(),
                status,
            })
        }
        status => {
            tracing::debug!("release API returned HTTP {status} for {original_url}");
            return Ok(None);
        }
    }

    let release: Release = match serde_json::from_reader(response.into_body().into_reader()) {
        Ok(release) => release,
        Err(e) => {
            tracing::debug!("undecodable release API response for {original_url}: {e}");
            return Ok(None);
        }
    };
    Ok(find_digest(&release, &asset.name))
}

fn find_digest(release: &Release, name: &str) -> Option<Checksum> {
    release
        .assets
        .iter()
        .filter(|asset| asset.name == name)
        .find_map(|asset| asset.digest.as_deref().and_then(Checksum::parse))
}
