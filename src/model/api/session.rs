use std::fmt::Display;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::config::Config;
use crate::error::Error;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "__session";

/// Different privilege levels.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    #[default]
    Voter = 0,
    Admin = 1,
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// The verified identity behind a request: the per-request context object
/// populated from the signed session cookie. Never trusts client-supplied
/// claims; everything here is re-derived from the JWT signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    /// Subject identifier, as asserted by the bearer credential at sign-in.
    pub uid: String,
    #[serde(rename = "rol")]
    pub role: Role,
}

impl SessionToken {
    /// Create a new token for the given subject.
    pub fn new(uid: String, role: Role) -> Self {
        Self { uid, role }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into the session cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.session_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(SESSION_COOKIE, token)
            .max_age(Duration::seconds(config.session_ttl().num_seconds()))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize and verify a token from the session cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: SessionToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = Error;

    /// Get a verified [`SessionToken`] from the session cookie.
    ///
    /// Forwards on any failure; the session gate has already redirected
    /// unauthenticated traffic, so a forward here ends in a 404 rather than
    /// leaking which routes exist.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // Forward if there is no session cookie.
        let cookie = try_outcome!(req.cookies().get(SESSION_COOKIE).or_forward(()));

        // Decode and verify the token.
        let token = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        Outcome::Success(token)
    }
}

/// A [`SessionToken`] that is additionally known to carry admin rights.
#[derive(Debug, Clone)]
pub struct AdminSession(pub SessionToken);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = try_outcome!(req.guard::<SessionToken>().await);
        if token.role != Role::Admin {
            return Outcome::Forward(());
        }
        Outcome::Success(Self(token))
    }
}

/// Claims carried by the bearer credential presented at sign-in. The token
/// itself is minted by the authentication provider; we only ever verify it.
#[derive(Debug, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: String,
    #[serde(default, rename = "rol")]
    pub role: Role,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

impl BearerClaims {
    /// Verify a bearer credential and extract its claims.
    pub fn verify(id_token: &str, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode(
            id_token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Self>| data.claims)?;
        Ok(claims)
    }
}
