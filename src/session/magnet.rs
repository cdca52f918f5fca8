//! Locator parsing: extracts the content-hash identifier from a magnet link.

use crate::session::{SessionError, TransferId};

const SCHEME: &str = "magnet:";
const BTIH_PREFIX: &str = "urn:btih:";

/// Returns the transfer id of a `magnet:` locator with an `xt=urn:btih:<40 hex>` topic.
///
/// The scheme and the `urn:btih:` prefix match case-insensitively; the hash may be
/// upper- or lower-case and is returned canonicalised.
pub fn parse_magnet(source_uri: &str) -> Result<TransferId, SessionError> {
    let source_uri = source_uri.trim();
    let Some(scheme) = source_uri.get(..SCHEME.len()) else {
        return Err(invalid("locator must start with \"magnet:\""));
    };
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(invalid("locator must start with \"magnet:\""));
    }

    let query = source_uri[SCHEME.len()..].trim_start_matches('?');
    let mut saw_btih = false;
    for param in query.split('&') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if !key.eq_ignore_ascii_case("xt") {
            continue;
        }
        let Some(prefix) = value.get(..BTIH_PREFIX.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(BTIH_PREFIX) {
            continue;
        }
        saw_btih = true;
        if let Some(id) = TransferId::from_hex(&value[BTIH_PREFIX.len()..]) {
            return Ok(id);
        }
    }

    if saw_btih {
        Err(invalid("info hash must be 40 hex characters"))
    } else {
        Err(invalid("could not extract info hash from locator"))
    }
}

fn invalid(reason: &str) -> SessionError {
    SessionError::InvalidSource(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lower_cased_hash() {
        let id = parse_magnet(
            "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=ubuntu.iso",
        )
        .expect("parse");
        assert_eq!(id.to_hex_lower(), "abcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn finds_btih_topic_among_other_params() {
        let id = parse_magnet(
            "  MAGNET:?dn=x&tr=udp%3A%2F%2Ft%3A1&xt=URN:BTIH:0123456789abcdef0123456789abcdef01234567  ",
        )
        .expect("parse");
        assert_eq!(id.to_hex_lower(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn rejects_non_magnet_scheme() {
        let err = parse_magnet("http://example.com/a.torrent").expect_err("scheme");
        assert!(matches!(err, SessionError::InvalidSource(_)));
        assert!(parse_magnet("").is_err());
        assert!(parse_magnet("mag").is_err());
    }

    #[test]
    fn rejects_missing_or_malformed_hash() {
        assert!(matches!(
            parse_magnet("magnet:?dn=only-a-name"),
            Err(SessionError::InvalidSource(_))
        ));
        let err = parse_magnet("magnet:?xt=urn:btih:ABCD").expect_err("short");
        assert!(err.to_string().contains("40 hex"));
        assert!(parse_magnet("magnet:?xt=urn:sha1:0123456789abcdef0123456789abcdef01234567").is_err());
    }
}
