use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

const SHARE_AUDIENCE: &str = "media-share";

#[derive(Debug, Serialize, Deserialize)]
struct ShareClaims {
    /// Media item id
    sub: String,
    aud: String,
    exp: i64,
    iat: i64,
}

/// Signs and checks the expiring download links handed out for media items.
#[derive(Clone)]
pub struct ShareLinkSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl ShareLinkSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign(&self, media_id: Uuid, valid_for: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = ShareClaims {
            sub: media_id.to_string(),
            aud: SHARE_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + valid_for).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign share link: {}", e)))
    }

    /// Returns the media id the token grants access to.
    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_audience(&[SHARE_AUDIENCE]);

        let data = decode::<ShareClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            log::info!("Rejected share link: {}", e);
            AppError::NotFound("This link is invalid or has expired".to_string())
        })?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::NotFound("This link is invalid or has expired".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let signer = ShareLinkSigner::new(SECRET);
        let id = Uuid::new_v4();
        let token = signer.sign(id, Duration::hours(1)).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = ShareLinkSigner::new(SECRET);
        let token = signer.sign(Uuid::new_v4(), Duration::hours(-1)).unwrap();
        assert!(matches!(signer.verify(&token), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = ShareLinkSigner::new(SECRET)
            .sign(Uuid::new_v4(), Duration::hours(1))
            .unwrap();
        let other = ShareLinkSigner::new("ffffffffffffffffffffffffffffffff");
        assert!(other.verify(&token).is_err());
    }
}
