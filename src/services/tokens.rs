use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_TTL_HOURS: i64 = 4;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Admin session: one principal, four hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
}

/// Payload of the confirm/reject links emailed with a reschedule proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModificationClaims {
    pub booking_id: String,
    pub proposal_id: String,
    pub date: String,
    pub time: String,
    pub exp: i64,
}

trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for SessionClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for ModificationClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

/// HMAC-SHA256 signer for `base64url(json).base64url(mac)` tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).unwrap_or_else(|_| unreachable!())
    }

    fn sign<T: Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    fn verify<T: DeserializeOwned + Expiring>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<T, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: T = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;
        if claims.exp() <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn issue_session(&self, username: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
        self.sign(&SessionClaims {
            sub: username.to_string(),
            exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        })
    }

    pub fn verify_session(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        self.verify(token, now)
    }

    pub fn issue_modification(&self, claims: &ModificationClaims) -> anyhow::Result<String> {
        self.sign(claims)
    }

    pub fn verify_modification(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ModificationClaims, TokenError> {
        self.verify(token, now)
    }
}

/// Constant-time comparison of two hex digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (hex::decode(a), hex::decode(b)) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_roundtrip() {
        let signer = TokenSigner::new("secret");
        let now = Utc::now();
        let token = signer.issue_session("admin", now).unwrap();
        let claims = signer.verify_session(&token, now).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.exp - now.timestamp(), SESSION_TTL_HOURS * 3600);
    }

    #[test]
    fn test_session_expires_after_four_hours() {
        let signer = TokenSigner::new("secret");
        let now = Utc::now();
        let token = signer.issue_session("admin", now).unwrap();
        let later = now + Duration::hours(4) + Duration::seconds(1);
        assert_eq!(signer.verify_session(&token, later), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = Utc::now();
        let token = TokenSigner::new("one").issue_session("admin", now).unwrap();
        assert_eq!(
            TokenSigner::new("two").verify_session(&token, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = TokenSigner::new("secret");
        let now = Utc::now();
        let token = signer.issue_session("admin", now).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&SessionClaims { sub: "admin".into(), exp: i64::MAX }).unwrap(),
        );
        let forged = format!("{forged_payload}.{signature}");
        assert_eq!(signer.verify_session(&forged, now), Err(TokenError::BadSignature));
        assert_eq!(signer.verify_session("garbage", now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_modification_claims_roundtrip() {
        let signer = TokenSigner::new("secret");
        let now = Utc::now();
        let claims = ModificationClaims {
            booking_id: "bk-1".into(),
            proposal_id: "prop-1".into(),
            date: "2030-06-18".into(),
            time: "12:00".into(),
            exp: (now + Duration::hours(72)).timestamp(),
        };
        let token = signer.issue_modification(&claims).unwrap();
        assert_eq!(signer.verify_modification(&token, now).unwrap(), claims);
    }

    #[test]
    fn test_digests_match() {
        let a = crate::config::hash_password("pw");
        assert!(digests_match(&a, &a));
        assert!(!digests_match(&a, &crate::config::hash_password("other")));
        assert!(!digests_match(&a, "zz"));
    }
}
