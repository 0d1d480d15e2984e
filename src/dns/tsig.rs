//! BIND-style TSIG key file parsing for authenticated zone transfers.

use std::fs;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hickory_client::client::Signer;
use hickory_client::proto::rr::dnssec::tsig::TSigner;
use hickory_client::rr::Name;
use hickory_client::rr::rdata::tsig::TsigAlgorithm;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsigKeyError {
    #[error("failed to read TSIG key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSIG key file is missing a key name or secret")]
    MissingField,

    #[error("unsupported TSIG algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("TSIG secret is not valid base64: {0}")]
    BadSecret(#[from] base64::DecodeError),

    #[error("invalid TSIG key: {0}")]
    Invalid(String),
}

/// The four HMAC algorithms accepted for transfer authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

impl KeyAlgorithm {
    fn parse(token: &str) -> Result<Self, TsigKeyError> {
        match token.to_ascii_uppercase().as_str() {
            "HMAC-MD5" | "HMAC-MD5.SIG-ALG.REG.INT" => Ok(Self::HmacMd5),
            "HMAC-SHA1" => Ok(Self::HmacSha1),
            "HMAC-SHA256" => Ok(Self::HmacSha256),
            "HMAC-SHA512" => Ok(Self::HmacSha512),
            _ => Err(TsigKeyError::UnsupportedAlgorithm(token.to_string())),
        }
    }

    fn to_wire(self) -> TsigAlgorithm {
        match self {
            Self::HmacMd5 => TsigAlgorithm::HmacMd5,
            Self::HmacSha1 => TsigAlgorithm::HmacSha1,
            Self::HmacSha256 => TsigAlgorithm::HmacSha256,
            Self::HmacSha512 => TsigAlgorithm::HmacSha512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TsigKey {
    pub name: String,
    pub secret: String,
    pub algorithm: KeyAlgorithm,
}

impl TsigKey {
    pub fn from_file(path: &Path) -> Result<Self, TsigKeyError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses a `key "name" { algorithm x; secret "y"; };` stanza. Name and
    /// secret are mandatory; the algorithm token must map to one of the four
    /// supported HMACs and the secret must decode as base64.
    pub fn parse(text: &str) -> Result<Self, TsigKeyError> {
        let mut name = String::new();
        let mut secret = String::new();
        let mut algorithm = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("//")
                || line.starts_with("/*")
            {
                continue;
            }
            if line.starts_with("key") && line.ends_with('{') {
                if let Some(word) = line.split_whitespace().nth(1) {
                    name = word.trim_matches('"').to_string();
                }
            } else if let Some((_, rest)) = line.split_once("algorithm") {
                algorithm = trim_value(rest);
            } else if let Some((_, rest)) = line.split_once("secret") {
                secret = trim_value(rest);
            }
        }

        if name.is_empty() || secret.is_empty() {
            return Err(TsigKeyError::MissingField);
        }
        let algorithm = KeyAlgorithm::parse(&algorithm)?;

        let key = Self {
            name,
            secret,
            algorithm,
        };
        key.secret_bytes()?;
        Ok(key)
    }

    pub fn secret_bytes(&self) -> Result<Vec<u8>, TsigKeyError> {
        Ok(BASE64.decode(self.secret.as_bytes())?)
    }

    /// Builds the hickory signer used on transfer connections.
    pub fn signer(&self) -> Result<Signer, TsigKeyError> {
        let name =
            Name::from_utf8(&self.name).map_err(|e| TsigKeyError::Invalid(e.to_string()))?;
        let tsigner = TSigner::new(self.secret_bytes()?, self.algorithm.to_wire(), name, 300)
            .map_err(|e| TsigKeyError::Invalid(e.to_string()))?;
        Ok(Signer::from(tsigner))
    }
}

fn trim_value(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == ';' || c == '"')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const KEY_FILE: &str = r#"
key "transfer-key" {
    algorithm hmac-sha256;
    secret "c2VjcmV0LXNlY3JldC1zZWNyZXQ=";
};
"#;

    #[test]
    fn test_parse_key_file() {
        let key = TsigKey::parse(KEY_FILE).unwrap();
        assert_eq!(key.name, "transfer-key");
        assert_eq!(key.secret, "c2VjcmV0LXNlY3JldC1zZWNyZXQ=");
        assert_eq!(key.algorithm, KeyAlgorithm::HmacSha256);
        assert_eq!(key.secret_bytes().unwrap(), b"secret-secret-secret");
    }

    #[test]
    fn test_parse_skips_comments() {
        let text = format!("# keyfile\n// managed\n{KEY_FILE}");
        assert!(TsigKey::parse(&text).is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_algorithm() {
        let text = KEY_FILE.replace("hmac-sha256", "hmac-sha224");
        assert_matches!(
            TsigKey::parse(&text),
            Err(TsigKeyError::UnsupportedAlgorithm(_))
        );
    }

    #[test]
    fn test_parse_rejects_missing_secret() {
        let text = "key \"k\" {\n    algorithm hmac-sha256;\n};\n";
        assert_matches!(TsigKey::parse(text), Err(TsigKeyError::MissingField));
    }

    #[test]
    fn test_parse_rejects_bad_base64() {
        let text = KEY_FILE.replace("c2VjcmV0LXNlY3JldC1zZWNyZXQ=", "not base64 at all");
        assert_matches!(TsigKey::parse(&text), Err(TsigKeyError::BadSecret(_)));
    }

    #[test]
    fn test_legacy_md5_token_maps() {
        let text = KEY_FILE.replace("hmac-sha256", "HMAC-MD5.SIG-ALG.REG.INT");
        assert_eq!(
            TsigKey::parse(&text).unwrap().algorithm,
            KeyAlgorithm::HmacMd5
        );
    }
}
