//! RS256 JWT signing.
//!
//! Serialization is delegated to `jsonwebtoken`, which produces the
//! unpadded base64url segments the service requires. We only need to make
//! sure the header carries `kid` set to the key's fingerprint.

use serde::Serialize;

use super::key::RsaKeyMaterial;
use crate::errors::Error;

/// Signs `claims` with `key` using RS256, producing a compact JWT whose
/// header is `{alg:"RS256", typ:"JWT", kid:<fingerprint>}`.
pub fn sign<T: Serialize>(key: &RsaKeyMaterial, claims: &T) -> Result<String, Error> {
    use rsa::pkcs1::EncodeRsaPrivateKey as _;

    let pkcs1 = key
        .private_key()
        .to_pkcs1_der()
        .map_err(|e| Error::Key(format!("PKCS#1 DER encode failed: {e}")))?;
    let encoding_key = jsonwebtoken::EncodingKey::from_rsa_der(pkcs1.as_bytes());

    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(key.fingerprint().to_string());

    jsonwebtoken::encode(&header, claims, &encoding_key)
        .map_err(|e| Error::JwtSign(format!("JWT signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::Value;

    use super::*;

    const TEST_RSA_PRIVKEY_PEM: &str = include_str!("../../tests/fixtures/id_rsa.pem");

    #[derive(Serialize)]
    struct Claims {
        iss: String,
        sub: String,
        iat: u64,
        exp: u64,
    }

    fn decode_segment(jwt: &str, idx: usize) -> Value {
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        let bytes = URL_SAFE_NO_PAD.decode(parts[idx]).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn header_carries_rs256_and_kid() {
        let key = RsaKeyMaterial::from_pem(TEST_RSA_PRIVKEY_PEM, None).unwrap();
        let claims = Claims {
            iss: "ISS".into(),
            sub: "SUB".into(),
            iat: 0,
            exp: 60,
        };
        let jwt = sign(&key, &claims).unwrap();
        let header = decode_segment(&jwt, 0);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["kid"], key.fingerprint());
    }

    #[test]
    fn payload_round_trips_claims() {
        let key = RsaKeyMaterial::from_pem(TEST_RSA_PRIVKEY_PEM, None).unwrap();
        let claims = Claims {
            iss: "ISS".into(),
            sub: "SUB".into(),
            iat: 100,
            exp: 640,
        };
        let jwt = sign(&key, &claims).unwrap();
        let payload = decode_segment(&jwt, 1);
        assert_eq!(payload["iss"], "ISS");
        assert_eq!(payload["sub"], "SUB");
        assert_eq!(payload["iat"], 100);
        assert_eq!(payload["exp"], 640);
    }

    #[test]
    fn segments_are_unpadded_base64url() {
        let key = RsaKeyMaterial::from_pem(TEST_RSA_PRIVKEY_PEM, None).unwrap();
        let claims = Claims {
            iss: "ISS".into(),
            sub: "SUB".into(),
            iat: 0,
            exp: 60,
        };
        let jwt = sign(&key, &claims).unwrap();
        for segment in jwt.split('.') {
            assert!(!segment.contains('='));
            assert!(URL_SAFE_NO_PAD.decode(segment).is_ok());
        }
    }
}
