use crate::config::AppConfig;
use crate::models::user::Claims;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature does not verify")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies HS256 bearer tokens carrying a user id.
///
/// The secret is handed in at construction and never leaves this struct.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        TokenService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::days(config.token_ttl_days))
    }

    pub fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Mint a token as if issued at `issued_at`.
    pub fn issue_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_owned(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Valid only while `now < exp`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        // jsonwebtoken still accepts exp == now
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(secret, Duration::days(7))
    }

    #[test]
    fn test_issue_then_verify_resolves_user() {
        let tokens = service("test-secret-key");
        let token = tokens.issue("test-user-456").unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "test-user-456");
        assert_eq!(token.matches('.').count(), 2);
    }

    #[test]
    fn test_expiry_is_seven_days() {
        let tokens = service("test-secret-key");
        let now = Utc::now();
        let claims = tokens.verify(&tokens.issue_at("u", now).unwrap()).unwrap();

        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_tokens_are_distinct_within_one_second() {
        let tokens = service("test-secret-key");
        let now = Utc::now();
        let a = tokens.issue_at("u", now).unwrap();
        let b = tokens.issue_at("u", now).unwrap();

        assert_ne!(a, b);
        assert_eq!(tokens.verify(&a).unwrap().sub, tokens.verify(&b).unwrap().sub);
    }

    #[test]
    fn test_payload_has_no_secret_material() {
        let tokens = service("super-secret-value");
        let token = tokens.issue("u").unwrap();
        assert!(!token.contains("super-secret-value"));
    }

    #[test]
    fn test_verify_invalid_token() {
        let tokens = service("test-secret-key");
        assert!(matches!(
            tokens.verify("invalid.token.here"),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(tokens.verify(""), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = service("secret1").issue("user").unwrap();
        assert!(matches!(
            service("secret2").verify(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_any_modified_byte_fails() {
        let tokens = service("test-secret-key");
        let token = tokens.issue("user-1").unwrap();
        let bytes = token.as_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            // swap in a different character, dots included
            tampered[i] = match tampered[i] {
                b'.' => b'A',
                b'A' => b'B',
                _ => b'A',
            };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                tokens.verify(&tampered).is_err(),
                "tampered byte {} still verified",
                i
            );
        }
    }

    #[test]
    fn test_expired_token_is_rejected_as_expired() {
        let tokens = service("test-secret-key");
        let issued = Utc::now() - Duration::days(8);
        let token = tokens.issue_at("user", issued).unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_at_exact_expiry_is_rejected() {
        let tokens = service("test-secret-key");
        let token = tokens
            .issue_at("user", Utc::now() - Duration::days(7))
            .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_one_minute_before_expiry_is_accepted() {
        let tokens = service("test-secret-key");
        let issued = Utc::now() - Duration::days(7) + Duration::minutes(1);
        let token = tokens.issue_at("user", issued).unwrap();

        assert_eq!(tokens.verify(&token).unwrap().sub, "user");
    }
}
