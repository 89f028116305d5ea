use crate::entities::users::Role;
use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // username
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
    pub jti: String,
}

/// Issues a bearer token for `username`. Without a TTL the token never expires
/// and is only invalidated by a later login.
pub fn create_jwt(
    username: &str,
    role: Role,
    secret: &str,
    ttl_hours: Option<i64>,
) -> Result<String> {
    let exp = match ttl_hours {
        Some(hours) => Some(
            Utc::now()
                .checked_add_signed(Duration::hours(hours))
                .ok_or_else(|| anyhow!("token expiry out of range"))?
                .timestamp() as usize,
        ),
        None => None,
    };

    let claims = Claims {
        sub: username.to_owned(),
        role,
        exp,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| anyhow!("invalid hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_cycle() {
        let secret = "test_secret";
        let token = create_jwt("alice", Role::Admin, secret, None).unwrap();
        let claims = validate_jwt(&token, secret).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_jwt_with_ttl() {
        let token = create_jwt("bob", Role::User, "s", Some(1)).unwrap();
        let claims = validate_jwt(&token, "s").unwrap();
        assert!(claims.exp.is_some());
    }

    #[test]
    fn test_jwt_wrong_secret() {
        let token = create_jwt("alice", Role::User, "one", None).unwrap();
        assert!(validate_jwt(&token, "two").is_err());
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }
}
