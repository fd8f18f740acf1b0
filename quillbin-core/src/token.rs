//! Capability tokens.
//!
//! A token is a compact HS256 JWT whose claims bind one document ID to a
//! permission set:
//!
//! ```text
//! base64url({"alg":"HS256","typ":"JWT"}) . base64url(claims) . base64url(HMAC-SHA256)
//! claims = {"sub": "<document id>", "permissions": ["write", ...], "iat": <unix seconds>}
//! ```
//!
//! Verification is a pure function of the token and the server secret: no
//! session table, no revocation list. A missing token verifies to empty
//! claims, which hold no permissions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// A mutating capability. Reading is never gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Write,
    Delete,
    Share,
}

impl Permission {
    /// Every permission, as granted to a document's creator.
    pub const ALL: [Permission; 3] = [Permission::Write, Permission::Delete, Permission::Share];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Share => "share",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(Permission::Write),
            "delete" => Ok(Permission::Delete),
            "share" => Ok(Permission::Share),
            other => Err(Error::invalid(format!("unknown permission: {other}"))),
        }
    }
}

/// Verified token claims.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Document ID the token is scoped to
    #[serde(rename = "sub")]
    pub subject: String,
    /// Granted permissions
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    /// Issued-at, Unix seconds
    #[serde(rename = "iat", default)]
    pub issued_at: i64,
}

impl Claims {
    /// Claims of an unauthenticated request.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_empty() && self.permissions.is_empty()
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Token failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Malformed(String),
    #[error("invalid token: unsupported algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid token: signature mismatch")]
    BadSignature,
    #[error("token signing secret is empty")]
    EmptySecret,
}

/// Issues and verifies capability tokens with a symmetric secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    /// Codec stamping `iat` from the given clock.
    pub fn with_clock(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let secret = secret.as_ref().to_vec();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self { secret, clock })
    }

    /// Sign a token granting `permissions` on `document_id`.
    pub fn issue(
        &self,
        document_id: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            subject: document_id.to_string(),
            permissions: permissions.into_iter().collect(),
            issued_at: self.clock.now(),
        };
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };

        let header = serde_json::to_vec(&header).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let payload = serde_json::to_vec(&claims).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let mut token = URL_SAFE_NO_PAD.encode(header);
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(payload));

        let signature = self.mac(token.as_bytes()).finalize().into_bytes();
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(signature));
        Ok(token)
    }

    /// Verify a token and return its claims.
    ///
    /// `None` or an empty string yields [`Claims::empty`].
    pub fn verify(&self, token: Option<&str>) -> Result<Claims, TokenError> {
        let token = match token.map(str::trim) {
            None | Some("") => return Ok(Claims::empty()),
            Some(t) => t,
        };

        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed("expected three segments".into()));
        };

        let header: Header = serde_json::from_slice(&Self::decode_segment(header_b64)?)
            .map_err(|e| TokenError::Malformed(format!("header: {e}")))?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = Self::decode_segment(signature_b64)?;
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        self.mac(&token.as_bytes()[..signing_input_len])
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        serde_json::from_slice(&Self::decode_segment(payload_b64)?)
            .map_err(|e| TokenError::Malformed(format!("claims: {e}")))
    }

    fn mac(&self, input: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length; the secret is non-empty by construction.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
        mac.update(input);
        mac
    }

    fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| TokenError::Malformed(format!("base64 decode failed: {e}")))
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"*".repeat(self.secret.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn codec() -> TokenCodec {
        TokenCodec::with_clock("test-secret", Arc::new(ManualClock::new(1_700_000_000))).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = codec();
        let token = codec.issue("doc1", [Permission::Write, Permission::Share]).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = codec.verify(Some(&token)).unwrap();
        assert_eq!(claims.subject, "doc1");
        assert!(claims.has(Permission::Write));
        assert!(claims.has(Permission::Share));
        assert!(!claims.has(Permission::Delete));
        assert_eq!(claims.issued_at, 1_700_000_000);
    }

    #[test]
    fn test_missing_token_is_empty_claims() {
        let codec = codec();
        assert!(codec.verify(None).unwrap().is_empty());
        assert!(codec.verify(Some("")).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = codec().issue("doc1", Permission::ALL).unwrap();
        let other = TokenCodec::new("another-secret").unwrap();
        assert_eq!(other.verify(Some(&token)), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let codec = codec();
        let token = codec.issue("doc1", [Permission::Write]).unwrap();
        let forged_claims = URL_SAFE_NO_PAD
            .encode(br#"{"sub":"doc1","permissions":["write","delete","share"],"iat":0}"#);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(codec.verify(Some(&forged)), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let codec = codec();
        for token in ["abc", "a.b", "a.b.c.d", "!!!.???.***"] {
            assert!(
                matches!(codec.verify(Some(token)), Err(TokenError::Malformed(_))),
                "{token} should be malformed"
            );
        }
    }

    #[test]
    fn test_alg_none_rejected() {
        let codec = codec();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"doc1","permissions":["write"]}"#);
        let token = format!("{header}.{claims}.");
        assert_eq!(
            codec.verify(Some(&token)),
            Err(TokenError::UnsupportedAlgorithm("none".into()))
        );
    }

    #[test]
    fn test_empty_secret_refused() {
        assert_eq!(TokenCodec::new("").unwrap_err(), TokenError::EmptySecret);
    }

    #[test]
    fn test_permission_parse_and_display() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>().unwrap(), permission);
            assert_eq!(permission.to_string(), permission.as_str());
        }
        assert!(matches!("read".parse::<Permission>(), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_claims_serialize_lowercase() {
        let claims = Claims {
            subject: "doc1".into(),
            permissions: [Permission::Share, Permission::Write].into_iter().collect(),
            issued_at: 5,
        };
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(json, r#"{"sub":"doc1","permissions":["write","share"],"iat":5}"#);
    }

    #[test]
    fn test_debug_masks_secret() {
        let debug = format!("{:?}", codec());
        assert!(!debug.contains("test-secret"));
    }
}
