use crate::cache::joined_header;
use std::collections::BTreeMap;
use ureq::http::HeaderMap;

/// Request headers as they were set on an outbound request.
pub type OutboundHeaders = Vec<(&'static str, String)>;

/// Pick out the request headers a response declares it varies by.
///
/// Only headers we actually sent can be reproduced by a later fetch, so a
/// `Vary` name with no outbound counterpart is skipped. `Vary: *` cannot be
/// reproduced at all and yields an empty map. Keys are lowercase.
pub fn capture_vary_headers(
    outbound: &[(&'static str, String)],
    response: &HeaderMap,
) -> BTreeMap<String, String> {
    let mut captured = BTreeMap::new();
    let Some(vary) = joined_header(response, "vary") else {
        return captured;
    };
    if vary.split(',').any(|name| name.trim() == "*") {
        return captured;
    }

    for name in vary.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let sent = outbound
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty());
        if let Some(value) = sent {
            captured.insert(name.to_ascii_lowercase(), value.clone());
        }
    }
    captured
}
