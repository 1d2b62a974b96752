//! Caller identity: bearer JWT → [`Principal`], plus password hashing.

use std::fmt;
use std::str::FromStr;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(ApiError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// Resolved caller: who they are, what they may do, which tenant they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Relational user id. Absent for token-only operators.
    pub user_id: Option<i64>,
    pub username: String,
    pub role: Role,
    pub domain_id: Option<i64>,
}

impl Principal {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<i64>,
    pub exp: i64,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Principal, ApiError>;
}

pub struct JwtIdentityResolver {
    decoding: DecodingKey,
    encoding: EncodingKey,
    algorithm: Algorithm,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, ApiError> {
        let algorithm = match algorithm {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(ApiError::Validation(format!(
                    "Unsupported JWT algorithm '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            algorithm,
        })
    }

    /// Signs claims with the configured secret. Issuance flows live elsewhere;
    /// this exists for operators and tests.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(ApiError::internal)
    }

    fn decode(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["sub", "exp"]);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!("Rejected bearer token: {}", err);
                ApiError::Unauthorized
            })
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, ApiError> {
        let claims = self.decode(credential)?;
        if claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized);
        }
        // A tenant-bound role without a tenant can never pass an access check.
        if claims.role != Role::SuperAdmin && claims.domain_id.is_none() {
            return Err(ApiError::Unauthorized);
        }
        Ok(Principal {
            user_id: claims.uid,
            username: claims.sub,
            role: claims.role,
            domain_id: claims.domain_id,
        })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(token)
}

pub async fn require_principal(
    headers: &HeaderMap,
    resolver: &dyn IdentityResolver,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?;
    resolver.resolve(token).await
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ApiError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn verify_password(password: &str, hash: &str) -> bool {
        use argon2::password_hash::{PasswordHash, PasswordVerifier};
        let parsed = PasswordHash::new(hash).unwrap();
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    fn resolver() -> JwtIdentityResolver {
        JwtIdentityResolver::new("test-secret", "HS256").unwrap()
    }

    fn claims(role: Role, domain_id: Option<i64>) -> Claims {
        Claims {
            sub: "alice".to_string(),
            uid: Some(3),
            role,
            domain_id,
            exp: chrono::Utc::now().timestamp() + 600,
        }
    }

    #[tokio::test]
    async fn resolves_valid_token_into_principal() {
        let resolver = resolver();
        let token = resolver.encode_claims(&claims(Role::Admin, Some(1))).unwrap();

        let principal = resolver.resolve(&token).await.unwrap();

        assert_eq!(principal.user_id, Some(3));
        assert_eq!(principal.role, Role::Admin);
        assert_eq!(principal.domain_id, Some(1));
    }

    #[tokio::test]
    async fn rejects_expired_foreign_and_tenantless_tokens() {
        let resolver = resolver();

        let mut expired = claims(Role::User, Some(1));
        expired.exp = chrono::Utc::now().timestamp() - 3_600;
        let token = resolver.encode_claims(&expired).unwrap();
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ApiError::Unauthorized)
        ));

        let other = JwtIdentityResolver::new("other-secret", "HS256").unwrap();
        let token = other.encode_claims(&claims(Role::User, Some(1))).unwrap();
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ApiError::Unauthorized)
        ));

        let token = resolver.encode_claims(&claims(Role::User, None)).unwrap();
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn super_admin_may_omit_domain() {
        let resolver = resolver();
        let token = resolver
            .encode_claims(&claims(Role::SuperAdmin, None))
            .unwrap();
        let principal = resolver.resolve(&token).await.unwrap();
        assert!(principal.is_super_admin());
        assert_eq!(principal.domain_id, None);
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn password_hash_round_trip_and_minimum_length() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse!", &hash));
        assert!(matches!(hash_password("short"), Err(ApiError::Validation(_))));
    }

    #[test]
    fn role_parses_from_wire_names() {
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
