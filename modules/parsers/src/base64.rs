//! Bounded, lenient base64 decoding for payloads nested inside connection strings.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use sift_core::{ParseError, ProtocolKind};
use tracing::trace;

use crate::uri::percent_decode;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Upper bound of the decoded size of `input`, ignoring whitespace.
pub fn estimated_decoded_len(input: &str) -> usize {
    let chars = input.bytes().filter(|b| !b.is_ascii_whitespace() && *b != b'=').count();
    chars / 4 * 3 + (chars % 4) * 3 / 4
}

/// Decode standard or URL-safe base64, padded or not, with embedded whitespace
/// and percent-escapes tolerated. Payloads that would decode to more than
/// `limit` bytes are rejected before any allocation.
pub fn decode_bounded(input: &str, limit: usize, protocol: ProtocolKind) -> Result<Vec<u8>, ParseError> {
    let estimate = estimated_decoded_len(input);
    if estimate > limit {
        return Err(ParseError::PayloadTooLarge { protocol, size: estimate, limit });
    }

    let unescaped = if input.contains('%') { percent_decode(input) } else { input.to_string() };
    let cleaned: String = unescaped
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_end_matches('=')
        .to_string();
    if cleaned.is_empty() {
        return Err(ParseError::Encoding { protocol, reason: "empty payload".into() });
    }

    let decoded = if cleaned.contains(['-', '_']) {
        URL_SAFE_LENIENT.decode(&cleaned)
    } else {
        STANDARD_LENIENT.decode(&cleaned)
    }
    .map_err(|e| ParseError::Encoding { protocol, reason: e.to_string() })?;

    if decoded.len() > limit {
        return Err(ParseError::PayloadTooLarge { protocol, size: decoded.len(), limit });
    }
    trace!(protocol = %protocol, bytes = decoded.len(), "decoded base64 payload");
    Ok(decoded)
}

pub fn decode_bounded_utf8(input: &str, limit: usize, protocol: ProtocolKind) -> Result<String, ParseError> {
    let bytes = decode_bounded(input, limit, protocol)?;
    String::from_utf8(bytes).map_err(|e| ParseError::Encoding { protocol, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    const P: ProtocolKind = ProtocolKind::VMess;

    #[test]
    fn decodes_standard_padded() {
        assert_eq!(decode_bounded_utf8("aGVsbG8gd29ybGQ=", 1024, P).unwrap(), "hello world");
    }

    #[test]
    fn decodes_without_padding_and_with_whitespace() {
        assert_eq!(decode_bounded_utf8("aGVs\nbG8g\td29ybGQ", 1024, P).unwrap(), "hello world");
    }

    #[test]
    fn decodes_url_safe() {
        let data = [0xfbu8, 0xff, 0xfe, 0x01];
        let enc = URL_SAFE_NO_PAD.encode(data);
        assert!(enc.contains('-') || enc.contains('_'));
        assert_eq!(decode_bounded(&enc, 1024, P).unwrap(), data);
    }

    #[test]
    fn decodes_percent_escaped_padding() {
        assert_eq!(decode_bounded_utf8("aGk%3D", 1024, P).unwrap(), "hi");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_bounded("not base64!!!", 1024, P), Err(ParseError::Encoding { .. })));
        assert!(matches!(decode_bounded("", 1024, P), Err(ParseError::Encoding { .. })));
    }

    #[test]
    fn rejects_oversized_before_decoding() {
        let enc = STANDARD.encode(vec![b'a'; 4096]);
        let err = decode_bounded(&enc, 1024, P).unwrap_err();
        assert!(matches!(err, ParseError::PayloadTooLarge { limit: 1024, .. }));
    }

    #[test]
    fn estimate_matches_exact_sizes() {
        for n in 0..20 {
            let enc = STANDARD.encode(vec![0u8; n]);
            assert_eq!(estimated_decoded_len(&enc), n, "len {n}");
        }
    }

    #[test]
    fn rejects_invalid_utf8() {
        let enc = STANDARD.encode([0xffu8, 0xfe]);
        assert!(matches!(decode_bounded_utf8(&enc, 1024, P), Err(ParseError::Encoding { .. })));
    }
}
