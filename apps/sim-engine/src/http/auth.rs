//! Basic-auth verification against configured API key pairs.
//!
//! Keys are provisioned through indexed environment variables
//! (`ApiKeys__0__Key`, `ApiKeys__0__Secret`, `ApiKeys__0__Name`, ...).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::SimError;

/// One provisioned API key pair.
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Display name; becomes the session owner key.
    pub name: String,
    /// Key id presented as the basic-auth username.
    pub key: String,
    /// Secret presented as the basic-auth password.
    pub secret: String,
}

/// The set of accepted API keys.
#[derive(Debug, Clone, Default)]
pub struct ApiKeySet {
    keys: Vec<ApiKey>,
}

impl ApiKeySet {
    /// Build a set from explicit keys (tests, embedding).
    #[must_use]
    pub fn new(keys: Vec<ApiKey>) -> Self {
        Self { keys }
    }

    /// Read `ApiKeys__N__Key` / `__Secret` / `__Name` triples from the
    /// environment, stopping at the first missing index.
    #[must_use]
    pub fn from_env() -> Self {
        let mut keys = Vec::new();
        for n in 0.. {
            let Ok(key) = std::env::var(format!("ApiKeys__{n}__Key")) else {
                break;
            };
            let secret = std::env::var(format!("ApiKeys__{n}__Secret")).unwrap_or_default();
            let name =
                std::env::var(format!("ApiKeys__{n}__Name")).unwrap_or_else(|_| format!("key-{n}"));
            keys.push(ApiKey { name, key, secret });
        }
        Self { keys }
    }

    /// Number of provisioned keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no keys are provisioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verify an `Authorization: Basic <base64(key:secret)>` header value.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a missing, malformed, or unknown credential.
    pub fn verify(&self, authorization: Option<&str>) -> Result<&ApiKey, SimError> {
        let header = authorization
            .ok_or_else(|| SimError::Unauthenticated("missing Authorization header".into()))?;
        let token = header
            .strip_prefix("Basic ")
            .ok_or_else(|| SimError::Unauthenticated("expected Basic authentication".into()))?;
        let decoded = BASE64
            .decode(token.trim())
            .map_err(|_| SimError::Unauthenticated("malformed basic-auth token".into()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| SimError::Unauthenticated("malformed basic-auth token".into()))?;
        let (key, secret) = decoded
            .split_once(':')
            .ok_or_else(|| SimError::Unauthenticated("malformed basic-auth token".into()))?;

        self.keys
            .iter()
            .find(|k| k.key == key && k.secret == secret)
            .ok_or_else(|| SimError::Unauthenticated("unknown API key".into()))
    }
}

/// Encode a `key:secret` pair as a basic-auth header value.
#[must_use]
pub fn basic_header(key: &str, secret: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{key}:{secret}")))
}
