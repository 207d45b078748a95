//! Checksum probes over HEAD response headers.
//!
//! Each probe is a pure function of the headers. Probes run in table order;
//! the first one that applies decides the outcome.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use sourcepin_schema::Checksum;
use ureq::http::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The headers carry a usable SHA-256.
    Found(Checksum),
    /// The probe does not recognise this server; try the next one.
    NotApplicable,
    /// The probe owns this server but no SHA-256 is on offer. The body must
    /// be hashed; later probes are not consulted.
    Unavailable,
}

pub type HeaderProbe = fn(&HeaderMap) -> Probe;

pub const HEADER_PROBES: &[(&str, HeaderProbe)] =
    &[("s3-checksum", s3_checksum), ("sha256-etag", sha256_etag)];

/// Run the probe table. `None` means the body has to be downloaded.
pub fn probe_headers(headers: &HeaderMap) -> Option<(&'static str, Checksum)> {
    for (name, probe) in HEADER_PROBES {
        match probe(headers) {
            Probe::Found(checksum) => return Some((name, checksum)),
            Probe::Unavailable => return None,
            Probe::NotApplicable => {}
        }
    }
    None
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// S3 returns `x-amz-checksum-sha256` (base64) when the object was uploaded
/// with a SHA-256 checksum and the request opted in. Other algorithms S3 may
/// advertise are not usable and neither is its MD5 ETag.
pub fn s3_checksum(headers: &HeaderMap) -> Probe {
    if header(headers, "server") != Some("AmazonS3") {
        return Probe::NotApplicable;
    }
    let Some(encoded) = header(headers, "x-amz-checksum-sha256").map(str::trim) else {
        return Probe::Unavailable;
    };
    let decoded = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded));
    match decoded.ok().and_then(|bytes| Checksum::from_digest_bytes(&bytes)) {
        Some(checksum) => Probe::Found(checksum),
        None => Probe::Unavailable,
    }
}

/// Some servers (raw.githubusercontent.com among them) use the SHA-256 of the
/// content as the ETag.
pub fn sha256_etag(headers: &HeaderMap) -> Probe {
    let Some(etag) = header(headers, "etag") else {
        return Probe::NotApplicable;
    };
    match Checksum::from_hex(etag.trim_matches('"')) {
        Some(checksum) => Probe::Found(checksum),
        None => Probe::NotApplicable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ureq::http::HeaderValue;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    // base64 of the same digest
    const HELLO_SHA256_B64: &str = "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=";

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[test]
    fn s3_base64_checksum_becomes_hex() {
        let headers = map(&[
            ("server", "AmazonS3"),
            ("x-amz-checksum-sha256", HELLO_SHA256_B64),
        ]);
        let (name, checksum) = probe_headers(&headers).unwrap();
        assert_eq!(name, "s3-checksum");
        assert_eq!(checksum.hex(), HELLO_SHA256);
    }

    #[test]
    fn s3_without_sha256_never_consults_etag() {
        let headers = map(&[
            ("server", "AmazonS3"),
            ("etag", "\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\""),
            ("x-amz-checksum-crc32", "AAAAAA=="),
        ]);
        assert_eq!(s3_checksum(&headers), Probe::Unavailable);
        assert!(probe_headers(&headers).is_none());
    }

    #[test]
    fn s3_undecodable_or_short_checksum_is_unavailable() {
        let garbage = map(&[("server", "AmazonS3"), ("x-amz-checksum-sha256", "!!!")]);
        assert_eq!(s3_checksum(&garbage), Probe::Unavailable);
        let short = map(&[("server", "AmazonS3"), ("x-amz-checksum-sha256", "AAAA")]);
        assert_eq!(s3_checksum(&short), Probe::Unavailable);
    }

    #[test]
    fn s3_accepts_url_safe_alphabet() {
        // 0xfb 0xff in the digest produce '+' and '/' in the standard alphabet.
        let bytes = [0xfbu8; 32];
        let url_safe = URL_SAFE.encode(bytes);
        assert!(url_safe.contains('-') || url_safe.contains('_'));
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("AmazonS3"));
        headers.insert(
            "x-amz-checksum-sha256",
            HeaderValue::from_str(&url_safe).unwrap(),
        );
        let Probe::Found(checksum) = s3_checksum(&headers) else {
            panic!("expected checksum");
        };
        assert_eq!(checksum.hex(), "fb".repeat(32));
    }

    #[test]
    fn sha256_etag_is_lowercased() {
        let headers = map(&[(
            "etag",
            "\"2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824\"",
        )]);
        let (name, checksum) = probe_headers(&headers).unwrap();
        assert_eq!(name, "sha256-etag");
        assert_eq!(checksum.as_str(), format!("sha256:{HELLO_SHA256}"));
    }

    #[test]
    fn md5_etag_is_not_a_checksum() {
        let headers = map(&[("etag", "\"5d41402abc4b2a76b9719d911017c592\"")]);
        assert!(probe_headers(&headers).is_none());
        assert!(probe_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn non_s3_server_skips_s3_probe() {
        let headers = map(&[("server", "nginx"), ("x-amz-checksum-sha256", HELLO_SHA256_B64)]);
        assert_eq!(s3_checksum(&headers), Probe::NotApplicable);
        assert!(probe_headers(&headers).is_none());
    }
}
