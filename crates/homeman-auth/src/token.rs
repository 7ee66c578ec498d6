//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs. The library checks the signature and the presence
//! of `sub` and `exp`; expiry itself is compared here against the injected
//! [`Clock`], at millisecond precision and with no leeway, so a token whose
//! expiry equals "now" is already expired.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use homeman_core::{Clock, Error, Principal, Result, SystemClock};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Longest lifetime a token may be issued with.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

fn check_ttl(ttl: Duration) -> std::result::Result<(), String> {
    if ttl < Duration::zero() {
        return Err("token lifetime must not be negative".to_string());
    }
    if ttl > Duration::days(MAX_TOKEN_TTL_DAYS) {
        return Err(format!("token lifetime must not exceed {MAX_TOKEN_TTL_DAYS} days"));
    }
    Ok(())
}

/// Signing configuration, built once from the loaded config.
#[derive(Clone)]
pub struct TokenSettings {
    secret: String,
    default_ttl: Duration,
}

impl TokenSettings {
    /// Validates and wraps the signing secret and default lifetime.
    pub fn new(secret: impl Into<String>, default_ttl: Duration) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::config("token signing secret must not be empty"));
        }
        check_ttl(default_ttl).map_err(Error::config)?;
        Ok(Self {
            secret,
            default_ttl,
        })
    }

    /// Lifetime used by [`TokenService::issue_default`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    exp_ms: i64,
    #[serde(default)]
    privileged: bool,
}

impl Claims {
    /// Placeholder checked in place of claims that failed to decode.
    fn rejected() -> Self {
        Self {
            sub: String::new(),
            iat: 0,
            exp: 0,
            exp_ms: i64::MIN,
            privileged: false,
        }
    }
}

/// A signed credential as handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// User the token was issued for.
    pub subject_id: Uuid,
    /// First instant at which the token is no longer valid.
    pub expires_at: DateTime<Utc>,
    token: String,
}

impl AccessToken {
    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Consumes the token, returning its encoded form.
    pub fn into_string(self) -> String {
        self.token
    }

    /// Raw signature bytes.
    pub fn signature(&self) -> Result<Vec<u8>> {
        let segment = self
            .token
            .rsplit('.')
            .next()
            .ok_or_else(|| Error::invalid_data("token has no signature segment"))?;
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| Error::invalid_data(e.to_string()))
    }
}

/// Issues and verifies access tokens.
///
/// Holds only read-only keys and settings; share it behind an `Arc`.
pub struct TokenService {
    settings: TokenSettings,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Creates a service on the system clock.
    pub fn new(settings: TokenSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Creates a service on the given clock.
    pub fn with_clock(settings: TokenSettings, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            settings,
            validation,
            clock,
        }
    }

    /// The configured settings.
    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issues a token for `principal` that expires `ttl` from now.
    ///
    /// The privilege flag is a snapshot: a user promoted or demoted after
    /// issue keeps the old flag until the token expires. `ttl` must lie in
    /// `0..=MAX_TOKEN_TTL_DAYS` days.
    pub fn issue(&self, principal: &Principal, ttl: Duration) -> Result<AccessToken> {
        check_ttl(ttl).map_err(Error::invalid_data)?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::invalid_data("token expiry is out of range"))?;
        let claims = Claims {
            sub: principal.subject_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            exp_ms: expires_at.timestamp_millis(),
            privileged: principal.is_privileged,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::backend(format!("failed to sign token: {e}")))?;

        Ok(AccessToken {
            subject_id: principal.subject_id,
            expires_at,
            token,
        })
    }

    /// Issues a token with the configured default lifetime.
    pub fn issue_default(&self, principal: &Principal) -> Result<AccessToken> {
        self.issue(principal, self.settings.default_ttl)
    }

    /// Recovers the principal from an encoded token.
    ///
    /// Every failure is [`Error::Unauthorized`]; the reason is only logged.
    /// The expiry and subject checks run even when the signature is bad, so
    /// all rejections take the same path.
    pub fn verify(&self, raw: &str) -> Result<Principal> {
        let now_ms = self.clock.now().timestamp_millis();
        let (claims, signature) = match decode::<Claims>(raw, &self.decoding, &self.validation) {
            Ok(data) => (data.claims, Ok(())),
            Err(err) => (Claims::rejected(), Err(err)),
        };
        let live = now_ms < claims.exp_ms;
        let subject = Uuid::parse_str(&claims.sub);

        match (signature, live, subject) {
            (Ok(()), true, Ok(subject_id)) => Ok(Principal {
                subject_id,
                is_privileged: claims.privileged,
            }),
            (signature, live, subject) => {
                if let Err(err) = signature {
                    debug!(error = %err, "token rejected");
                } else if !live {
                    debug!(sub = %claims.sub, "token rejected: expired");
                } else if let Err(err) = subject {
                    debug!(error = %err, "token rejected: bad subject");
                }
                Err(Error::Unauthorized)
            }
        }
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
