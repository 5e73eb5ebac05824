use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Identity attached to an authenticated connection.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: String,
    name: String,
    email: String,
    exp: i64,
}

/// Verifies HS256 bearer tokens minted by the external auth collaborator.
///
/// Verified identities are cached for a few minutes so reconnect storms do
/// not pay the signature check repeatedly.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    cache: Cache<String, AuthUser>,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(Duration::from_secs(5 * 60))
                .build(),
        }
    }

    /// Validate a token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<AuthUser, String> {
        if let Some(user) = self.cache.get(token) {
            return Ok(user);
        }

        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| format!("JWT validation failed: {}", e))?;

        let user = AuthUser {
            user_id: token_data.claims.user_id,
            user_name: token_data.claims.name,
            user_email: token_data.claims.email,
        };
        debug!("token verified for user {}", user.user_id);
        self.cache.insert(token.to_string(), user.clone());
        Ok(user)
    }

    pub fn cached_identities(&self) -> u64 {
        self.cache.entry_count()
    }
}
