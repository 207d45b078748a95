use crate::cache::check_cacheability;
use crate::config::ResolverConfig;
use crate::context::ResolveContext;
use crate::interrupt::{interruptible, ChunkStream, Next};
use crate::probe::probe_headers;
use crate::progress::DownloadObserver;
use crate::provider::{self, ReleaseAsset};
use crate::vary::{capture_vary_headers, OutboundHeaders};
use crate::{FatalError, ResolveError};
use sha2::{Digest, Sha256};
use sourcepin_schema::Checksum;
use std::collections::BTreeMap;
use ureq::http::{HeaderMap, Response};
use ureq::Body;
use url::Url;

const CHUNK_SIZE: usize = 64 * 1024;

/// A pinned HTTP source: the content checksum plus the request headers the
/// response varies by, which a later fetch must repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumResult {
    pub checksum: Checksum,
    pub headers: BTreeMap<String, String>,
}

/// Resolves HTTP(S) URLs to SHA-256 checksums.
///
/// Strategies, cheapest first:
/// 1. GitHub release assets: digest from the releases API
/// 2. HEAD: checksum from response headers (S3, SHA-256 ETag)
/// 3. GET: hash the full body
pub struct HttpResolver {
    config: ResolverConfig,
    agent: ureq::Agent,
}

enum HeadOutcome {
    Resolved(ChecksumResult),
    Download,
}

impl HttpResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.request_timeout()))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        raw_url: &str,
        ctx: &ResolveContext,
        observer: &dyn DownloadObserver,
    ) -> Result<ChecksumResult, ResolveError> {
        let url = Url::parse(raw_url).map_err(|e| FatalError::InvalidUrl {
            url: raw_url.to_owned(),
            reason: e.to_string(),
        })?;

        if let Some(asset) = ReleaseAsset::from_url(&url) {
            ctx.check()?;
            let timeout = ctx.budget(self.config.request_timeout());
            if let Some(checksum) =
                provider::lookup_digest(&self.agent, &self.config, raw_url, &asset, ctx, timeout)?
            {
                tracing::debug!("{raw_url}: checksum from release API");
                return Ok(ChecksumResult {
                    checksum,
                    headers: BTreeMap::new(),
                });
            }
        }

        if let HeadOutcome::Resolved(result) = self.head(raw_url, ctx)? {
            return Ok(result);
        }

        self.download(raw_url, ctx, observer)
    }

    fn outbound_headers(&self) -> OutboundHeaders {
        vec![("User-Agent", self.config.user_agent.clone())]
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        headers: &OutboundHeaders,
        ctx: &ResolveContext,
    ) -> Result<Response<Body>, FatalError> {
        ctx.check()?;
        let timeout = ctx.budget(self.config.request_timeout());
        tracing::debug!("{method} {url}");

        let agent = self.agent.clone();
        let target = url.to_owned();
        let headers = headers.clone();
        let response = interruptible(ctx, move || {
            let mut request = match method {
                "HEAD" => agent.head(&target),
                _ => agent.get(&target),
            };
            for (name, value) in &headers {
                request = request.header(*name, value);
            }
            request.config().timeout_global(Some(timeout)).build().call()
        })?;

        response.map_err(|e| {
            if ctx.is_cancelled() {
                FatalError::Cancelled
            } else {
                FatalError::Http {
                    url: url.to_owned(),
                    message: e.to_string(),
                }
            }
        })
    }

    fn head(&self, url: &str, ctx: &ResolveContext) -> Result<HeadOutcome, ResolveError> {
        let mut outbound = self.outbound_headers();
        outbound.push(("X-Amz-Checksum-Mode", "ENABLED".to_owned()));

        let response = match self.send("HEAD", url, &outbound, ctx) {
            Ok(response) => response,
            Err(e) if e.is_cancellation() => return Err(e.into()),
            Err(e) => {
                tracing::debug!("HEAD failed, falling back to download: {e}");
                return Ok(HeadOutcome::Download);
            }
        };

        match response.status().as_u16() {
            200 => {}
            status @ (401 | 403) => {
                return Err(ResolveError::Auth {
                    url: url.to_owned(),
                    status,
                })
            }
            status => {
                tracing::debug!("HEAD {url} returned HTTP {status}, falling back to download");
                return Ok(HeadOutcome::Download);
            }
        }

        let headers = response.headers();
        ensure_cacheable(url, headers)?;

        match probe_headers(headers) {
            Some((probe, checksum)) => {
                tracing::debug!("{url}: checksum from {probe} header");
                Ok(HeadOutcome::Resolved(ChecksumResult {
                    checksum,
                    headers: capture_vary_headers(&outbound, headers),
                }))
            }
            None => Ok(HeadOutcome::Download),
        }
    }

    fn download(
        &self,
        url: &str,
        ctx: &ResolveContext,
        observer: &dyn DownloadObserver,
    ) -> Result<ChecksumResult, ResolveError> {
        let outbound = self.outbound_headers();
        let response = self.send("GET", url, &outbound, ctx)?;

        match response.status().as_u16() {
            200 => {}
            status @ (401 | 403) => {
                return Err(ResolveError::Auth {
                    url: url.to_owned(),
                    status,
                })
            }
            status => {
                return Err(FatalError::Status {
                    url: url.to_owned(),
                    method: "GET",
                    status,
                }
                .into())
            }
        }

        ensure_cacheable(url, response.headers())?;
        let captured = capture_vary_headers(&outbound, response.headers());
        let declared = declared_length(response.headers());

        observer.on_start(declared);
        let chunks = ChunkStream::spawn(response.into_body().into_reader(), CHUNK_SIZE);
        let (checksum, actual) = hash_body(&chunks, ctx, observer).map_err(|e| match e {
            BodyError::Cancelled => FatalError::Cancelled,
            BodyError::Read { read, message } => match declared {
                Some(declared) if declared != read => FatalError::ContentLengthMismatch {
                    url: url.to_owned(),
                    declared,
                    actual: read,
                },
                _ => FatalError::Body {
                    url: url.to_owned(),
                    message,
                },
            },
        })?;

        if let Some(declared) = declared {
            if declared != actual {
                return Err(FatalError::ContentLengthMismatch {
                    url: url.to_owned(),
                    declared,
                    actual,
                }
                .into());
            }
        }

        tracing::debug!("{url}: hashed {actual} bytes");
        Ok(ChecksumResult {
            checksum,
            headers: captured,
        })
    }
}

fn ensure_cacheable(url: &str, headers: &HeaderMap) -> Result<(), ResolveError> {
    match check_cacheability(headers, chrono::Utc::now()) {
        Some(reason) => Err(ResolveError::Volatile {
            url: url.to_owned(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

enum BodyError {
    Cancelled,
    Read { read: u64, message: String },
}

/// Feed the body through SHA-256 as it arrives, giving way to cancellation
/// even while the server is silent.
fn hash_body(
    chunks: &ChunkStream,
    ctx: &ResolveContext,
    observer: &dyn DownloadObserver,
) -> Result<(Checksum, u64), BodyError> {
    let mut hasher = Sha256::new();
    let mut total: u64 = 0;
    loop {
        let chunk = match chunks.next(ctx) {
            Next::Chunk(chunk) => chunk,
            Next::End => break,
            Next::Cancelled => return Err(BodyError::Cancelled),
            Next::Failed(e) => {
                return Err(BodyError::Read {
                    read: total,
                    message: e.to_string(),
                })
            }
        };
        hasher.update(&chunk);
        total += chunk.len() as u64;
        observer.on_bytes(chunk.len() as u64);
    }
    let digest = hasher.finalize();
    let checksum = Checksum::from_digest_bytes(&digest).ok_or_else(|| BodyError::Read {
        read: total,
        message: "unexpected digest length".to_owned(),
    })?;
    Ok((checksum, total))
}
