//! Bearer-token identity resolution.
//!
//! Tokens are HS256 JWTs issued by the account service; `sub` carries the
//! numeric user id. Handlers take [`Authenticated`] as their first extractor,
//! so a bad token is rejected with 401 before a WebSocket upgrade happens.

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_shared::UserId;
use parley_store::{StoreError, User};

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    pub sub: String,
    /// Expiry (Unix timestamp).
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// The user a token speaks for, if its signature and expiry check out.
    pub fn verify(&self, token: &str) -> Option<UserId> {
        let data = match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "token rejected");
                return None;
            }
        };
        data.claims.sub.parse::<i64>().ok().map(UserId)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `?token=`, else from `Authorization: Bearer`.
fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Ok(Query(query)) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
        if let Some(token) = query.token.filter(|t| !t.is_empty()) {
            return Some(token);
        }
    }

    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(strip_bearer)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Token part of an `Authorization` value. The scheme is case-insensitive.
fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}

/// The account behind the request's bearer token.
pub struct Authenticated(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(ServerError::Unauthorized)?;
        let id = state
            .verifier
            .verify(&token)
            .ok_or(ServerError::Unauthorized)?;

        match state.store.run(move |db| db.get_user(id)).await {
            Ok(user) => Ok(Authenticated(user)),
            Err(StoreError::NotFound) => Err(ServerError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub(crate) fn mint(secret: &str, user: UserId, ttl_secs: i64) -> String {
        let claims = Claims {
            sub: user.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode token")
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::testing::mint;
    use super::*;

    fn parts(uri: &str, bearer: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::new("secret");
        let token = mint("secret", UserId(7), 60);
        assert_eq!(verifier.verify(&token), Some(UserId(7)));
    }

    #[test]
    fn rejects_wrong_secret_expired_and_garbage() {
        let verifier = TokenVerifier::new("secret");
        assert_eq!(verifier.verify(&mint("other", UserId(7), 60)), None);
        assert_eq!(verifier.verify(&mint("secret", UserId(7), -3600)), None);
        assert_eq!(verifier.verify("not-a-jwt"), None);
    }

    #[test]
    fn token_location() {
        assert_eq!(
            token_from_parts(&parts("/ws/inbox?token=abc", None)).as_deref(),
            Some("abc")
        );
        assert_eq!(
            token_from_parts(&parts("/ws/inbox", Some("xyz"))).as_deref(),
            Some("xyz")
        );
        assert_eq!(
            token_from_parts(&parts("/ws/inbox?token=abc", Some("xyz"))).as_deref(),
            Some("abc")
        );
        assert_eq!(token_from_parts(&parts("/ws/inbox?token=", None)), None);
        assert_eq!(token_from_parts(&parts("/ws/inbox", None)), None);
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let lower = Request::builder()
            .uri("/users")
            .header(AUTHORIZATION, "bearer abc")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(token_from_parts(&lower).as_deref(), Some("abc"));

        let shouty = Request::builder()
            .uri("/users")
            .header(AUTHORIZATION, "BEARER xyz")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(token_from_parts(&shouty).as_deref(), Some("xyz"));

        assert_eq!(strip_bearer("Basic abc"), None);
        assert_eq!(strip_bearer("Bearer"), None);
    }
}
