use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::migration::DecodeError;

pub(crate) const MIGRATION_SCHEME: &str = "otpauth-migration";

// Standard alphabet, accepting non-zero bits after the last full byte
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Text(String),
    Bytes(Vec<u8>),
}

// Turns percent-encoded, URL-safe, possibly unpadded base64 into bytes
pub fn normalize(text: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = text.trim();
    let unescaped = percent_decode_str(trimmed)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| trimmed.to_string());

    let mut adjusted: String = unescaped
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let remainder = adjusted.len() % 4;
    if remainder != 0 {
        adjusted.extend(std::iter::repeat_n('=', 4 - remainder));
    }

    Ok(LENIENT.decode(adjusted)?)
}

// Text when the decoded bytes are UTF-8, the raw bytes otherwise
pub fn decode_base64_text(text: &str) -> Result<Decoded, DecodeError> {
    let bytes = normalize(text)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => Decoded::Text(text),
        Err(e) => Decoded::Bytes(e.into_bytes()),
    })
}

// Raw `data` value of a migration URI, left percent-encoded since '+' is base64 here
pub fn migration_data(input: &str) -> anyhow::Result<String> {
    let trimmed = input.trim();
    if !trimmed.starts_with(MIGRATION_SCHEME) {
        return Ok(trimmed.to_string());
    }

    let url = Url::parse(trimmed)?;
    if url.scheme() != MIGRATION_SCHEME {
        anyhow::bail!("Unexpected scheme: {}", url.scheme());
    }

    url.query()
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("data="))
        .filter(|data| !data.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("The migration URI has no 'data' parameter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use proptest::prelude::*;

    #[test]
    fn decodes_percent_escapes() {
        // "%2B" and "%2F" are '+' and '/'
        let bytes = normalize("%2B%2F8").unwrap();
        assert_eq!(bytes, vec![0xfb, 0xff]);
    }

    #[test]
    fn pads_unpadded_input() {
        assert_eq!(normalize("aGk").unwrap(), b"hi");
        assert_eq!(normalize("aGk=").unwrap(), b"hi");
        assert_eq!(normalize("").unwrap(), b"");
    }

    #[test]
    fn accepts_trailing_bits_in_last_symbol() {
        assert_eq!(normalize("aGl").unwrap(), b"hi");
        assert_eq!(normalize("aGl=").unwrap(), b"hi");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            normalize("a!bc"),
            Err(DecodeError::InvalidBase64(_))
        ));
        // a single trailing character can never be valid
        assert!(matches!(
            normalize("aGkaa"),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn returns_text_when_utf8() {
        assert_eq!(
            decode_base64_text("SGVsbG8").unwrap(),
            Decoded::Text("Hello".to_string())
        );
    }

    #[test]
    fn returns_bytes_when_not_utf8() {
        assert_eq!(
            decode_base64_text("3q2-7w").unwrap(),
            Decoded::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn extracts_data_from_migration_uri() {
        let data = migration_data("otpauth-migration://offline?data=CjkK%2B8wF").unwrap();
        assert_eq!(data, "CjkK%2B8wF");

        let data = migration_data("otpauth-migration://offline?data=ab+c&x=1").unwrap();
        assert_eq!(data, "ab+c");
    }

    #[test]
    fn passes_bare_payload_through() {
        assert_eq!(migration_data("  CjkK  ").unwrap(), "CjkK");
    }

    #[test]
    fn rejects_migration_uri_without_data() {
        assert!(migration_data("otpauth-migration://offline?foo=bar").is_err());
        assert!(migration_data("otpauth-migration://offline?data=").is_err());
    }

    proptest! {
        #[test]
        fn url_safe_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = URL_SAFE_NO_PAD.encode(&bytes);
            prop_assert_eq!(normalize(&encoded).unwrap(), bytes.clone());

            match decode_base64_text(&encoded).unwrap() {
                Decoded::Text(text) => prop_assert_eq!(text.into_bytes(), bytes),
                Decoded::Bytes(raw) => prop_assert_eq!(raw, bytes),
            }
        }
    }
}
