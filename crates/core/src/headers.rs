//! Hop-by-hop header stripping, applied in both directions of a proxied
//! request (see §6, "hop-by-hop headers are stripped in both directions",
//! and testable property 7, "round-trip headers").

use http::HeaderMap;
use http::header::{CONNECTION, HeaderName};

/// `Keep-Alive` and `Transfer-Encoding` have no `http::header` constants;
/// named here the same way `CONNECTION` is.
fn keep_alive() -> HeaderName {
    HeaderName::from_static("keep-alive")
}

fn transfer_encoding() -> HeaderName {
    HeaderName::from_static("transfer-encoding")
}

/// Remove `Connection`, `Keep-Alive` and `Transfer-Encoding` from `headers`,
/// along with any extra header this request's `Connection` value names
/// (the standard mechanism for a peer to hop-by-hop-mark further headers).
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for value in headers.get_all(CONNECTION).iter() {
        if let Ok(named) = value.to_str() {
            for token in named.split(',') {
                let token = token.trim();
                if !token.is_empty() {
                    if let Ok(name) = HeaderName::try_from(token) {
                        headers.remove(name);
                    }
                }
            }
        }
    }
    headers.remove(CONNECTION);
    headers.remove(keep_alive());
    headers.remove(transfer_encoding());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_the_three_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(keep_alive(), "timeout=5".parse().unwrap());
        headers.insert(transfer_encoding(), "chunked".parse().unwrap());
        headers.insert(http::header::CONTENT_TYPE, "text/plain".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert!(!headers.contains_key(CONNECTION));
        assert!(!headers.contains_key(keep_alive()));
        assert!(!headers.contains_key(transfer_encoding()));
        assert!(headers.contains_key(http::header::CONTENT_TYPE));
    }

    #[test]
    fn strips_headers_named_by_the_connection_value() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, "x-internal-only".parse().unwrap());
        headers.insert(HeaderName::from_static("x-internal-only"), "secret".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert!(!headers.contains_key("x-internal-only"));
    }
}
