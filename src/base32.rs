use ::base32::Alphabet;

// Base32 encoder, RFC 4648 alphabet with '=' padding
pub fn base32_encode(secret: &[u8]) -> String {
    ::base32::encode(Alphabet::Rfc4648 { padding: true }, secret)
}

// Base32 decoder, tolerant of lowercase, spaces and missing padding
pub fn base32_decode(input: &str) -> anyhow::Result<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_uppercase();

    ::base32::decode(Alphabet::Rfc4648 { padding: false }, &cleaned)
        .ok_or_else(|| anyhow::anyhow!("Invalid base32 character"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_with_padding() {
        assert_eq!(base32_encode(b"Hello!\xde\xad\xbe\xef"), "JBSWY3DPEHPK3PXP");
        assert_eq!(base32_encode(b"f"), "MY======");
        assert_eq!(base32_encode(b""), "");
    }

    #[test]
    fn decodes_loose_input() {
        assert_eq!(
            base32_decode("jbsw y3dp ehpk 3pxp").unwrap(),
            b"Hello!\xde\xad\xbe\xef"
        );
        assert_eq!(base32_decode("MY======").unwrap(), b"f");
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(base32_decode("JBSW1").is_err());
    }

    proptest! {
        #[test]
        fn secret_round_trip(secret in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encoded = base32_encode(&secret);
            prop_assert_eq!(encoded.len() % 8, 0);
            prop_assert_eq!(base32_decode(&encoded).unwrap(), secret);
        }
    }
}
