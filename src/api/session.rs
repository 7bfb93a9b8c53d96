//! The session verification endpoint: establish, query, and revoke the
//! `__session` cookie. This is also the endpoint the session gate calls on
//! its same-origin verification round-trip.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use rocket::{
    http::{Cookie, CookieJar, Status},
    response::status::Custom,
    serde::json::Json,
    Route, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::api::session::{BearerClaims, SessionToken, SESSION_COOKIE};

/// Machine-readable code for an expired session, so the client can tell
/// "log in again" apart from a transient failure.
const EXPIRED_CODE: &str = "auth/session-cookie-expired";

pub fn routes() -> Vec<Route> {
    routes![establish, status, revoke]
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    #[serde(rename = "idToken")]
    id_token: String,
}

#[derive(Debug, Serialize)]
struct SignInOutcome {
    success: bool,
    data: String,
}

#[derive(Debug, Serialize)]
struct SessionStatus {
    #[serde(rename = "isLogged")]
    is_logged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

/// Exchange a bearer credential for the session cookie.
///
/// After setting the cookie we immediately re-read and re-verify it; a
/// cookie write that silently failed must surface as an overall failure,
/// never as partial success.
#[post("/api/signin", data = "<request>", format = "json")]
async fn establish(
    request: Json<SignInRequest>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Custom<Json<SignInOutcome>> {
    match try_establish(&request.id_token, cookies, config) {
        Ok(()) => Custom(
            Status::Ok,
            Json(SignInOutcome {
                success: true,
                data: "session established".to_string(),
            }),
        ),
        Err(e) => {
            warn!("Sign-in failed: {e}");
            // No half-set session: whatever was written is taken back.
            cookies.remove(Cookie::named(SESSION_COOKIE));
            Custom(
                Status::Unauthorized,
                Json(SignInOutcome {
                    success: false,
                    data: e.to_string(),
                }),
            )
        }
    }
}

fn try_establish(id_token: &str, cookies: &CookieJar<'_>, config: &Config) -> Result<()> {
    // Identity comes from the signed credential, nowhere else.
    let bearer = BearerClaims::verify(id_token, config)?;
    let token = SessionToken::new(bearer.sub, bearer.role);
    cookies.add(token.into_cookie(config));

    // Self-check: the cookie we just wrote must read back and verify.
    let pending = cookies.get_pending(SESSION_COOKIE);
    verify_written_cookie(pending, config)
}

/// The establish self-check, split out so the cookie-write-failure path is
/// testable without a jar that misbehaves on demand.
fn verify_written_cookie(pending: Option<Cookie<'static>>, config: &Config) -> Result<()> {
    let cookie = pending.ok_or_else(|| Error::unauthorized("session cookie was not set"))?;
    SessionToken::from_cookie(&cookie, config)?;
    Ok(())
}

/// Report whether the presented session cookie currently verifies.
#[get("/api/signin")]
async fn status(cookies: &CookieJar<'_>, config: &State<Config>) -> Custom<Json<SessionStatus>> {
    let Some(cookie) = cookies.get(SESSION_COOKIE) else {
        return Custom(
            Status::Unauthorized,
            Json(SessionStatus {
                is_logged: false,
                code: None,
            }),
        );
    };

    match SessionToken::from_cookie(cookie, config) {
        Ok(_) => Custom(
            Status::Ok,
            Json(SessionStatus {
                is_logged: true,
                code: None,
            }),
        ),
        Err(Error::Jwt(e)) if matches!(e.kind(), JwtErrorKind::ExpiredSignature) => Custom(
            Status::PaymentRequired,
            Json(SessionStatus {
                is_logged: false,
                code: Some(EXPIRED_CODE),
            }),
        ),
        Err(e) => {
            warn!("Session verification failed: {e}");
            Custom(
                Status::PaymentRequired,
                Json(SessionStatus {
                    is_logged: false,
                    code: None,
                }),
            )
        }
    }
}

/// Sign out: drop the session cookie.
#[delete("/api/signin")]
async fn revoke(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(Cookie::named(SESSION_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header};
    use rocket::local::asynchronous::Client;

    use crate::model::api::session::Role;

    use super::*;

    const JWT_SECRET: &str = "unit-test-jwt-secret";

    async fn client() -> Client {
        // The gate never fires for `/api/signin`, so the verification URL
        // does not need to resolve.
        Client::tracked(crate::test_build("http://127.0.0.1:9"))
            .await
            .unwrap()
    }

    fn bearer_token(sub: &str, role: Role) -> String {
        let claims = BearerClaims {
            sub: sub.to_string(),
            role,
            expire_at: Utc::now() + Duration::hours(1),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    /// A session cookie value whose underlying credential expired long ago.
    fn expired_session_value() -> String {
        let claims = serde_json::json!({
            "uid": "uid-1a2b3c",
            "rol": 0,
            "exp": (Utc::now() - Duration::hours(2)).timestamp(),
        });
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[rocket::async_test]
    async fn establish_then_query_happy_path() {
        let client = client().await;

        let response = client
            .post("/api/signin")
            .header(rocket::http::ContentType::JSON)
            .body(
                serde_json::json!({ "idToken": bearer_token("uid-1a2b3c", Role::Voter) })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Documented cookie attributes.
        let set_cookie = response.headers().get_one("Set-Cookie").unwrap().to_string();
        assert!(set_cookie.starts_with(&format!("{SESSION_COOKIE}=")));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Max-Age=432000"));

        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"success\":true"));

        // The client kept the cookie; querying reports logged in.
        let response = client.get("/api/signin").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"isLogged\":true"));
    }

    #[rocket::async_test]
    async fn establish_rejects_invalid_bearer() {
        let client = client().await;

        let response = client
            .post("/api/signin")
            .header(rocket::http::ContentType::JSON)
            .body(serde_json::json!({ "idToken": "not-a-jwt" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        // Any session Set-Cookie on a failed sign-in must be a removal,
        // never a usable value.
        for header in response.headers().get("Set-Cookie") {
            if header.starts_with(SESSION_COOKIE) {
                assert!(
                    header.starts_with(&format!("{SESSION_COOKIE}=;")),
                    "failed sign-in leaked a session cookie: {header}"
                );
            }
        }
        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"success\":false"));
        assert!(client.cookies().get(SESSION_COOKIE).is_none());
    }

    #[rocket::async_test]
    async fn query_without_cookie_is_401() {
        let client = client().await;

        let response = client.get("/api/signin").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"isLogged\":false"));
    }

    #[rocket::async_test]
    async fn expired_cookie_is_402_with_code() {
        let client = client().await;

        let response = client
            .get("/api/signin")
            .cookie(Cookie::new(SESSION_COOKIE, expired_session_value()))
            .dispatch()
            .await;
        assert_eq!(Status::PaymentRequired, response.status());
        let body = response.into_string().await.unwrap();
        assert!(body.contains("auth/session-cookie-expired"));
        assert!(body.contains("\"isLogged\":false"));
    }

    #[rocket::async_test]
    async fn garbage_cookie_is_402_without_code() {
        let client = client().await;

        let response = client
            .get("/api/signin")
            .cookie(Cookie::new(SESSION_COOKIE, "not-a-valid-jwt"))
            .dispatch()
            .await;
        assert_eq!(Status::PaymentRequired, response.status());
        let body = response.into_string().await.unwrap();
        assert!(!body.contains("auth/session-cookie-expired"));
    }

    #[rocket::async_test]
    async fn cookie_write_failure_is_overall_failure() {
        let client = client().await;
        let config = client.rocket().state::<Config>().unwrap();

        // Simulate the cookie being absent on re-read.
        assert!(verify_written_cookie(None, config).is_err());

        // And a cookie that reads back corrupted.
        let corrupt = Cookie::new(SESSION_COOKIE, "corrupted-on-write");
        assert!(verify_written_cookie(Some(corrupt), config).is_err());
    }

    #[rocket::async_test]
    async fn revoke_drops_the_cookie() {
        let client = client().await;

        client
            .post("/api/signin")
            .header(rocket::http::ContentType::JSON)
            .body(
                serde_json::json!({ "idToken": bearer_token("uid-1a2b3c", Role::Voter) })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert!(client.cookies().get(SESSION_COOKIE).is_some());

        let response = client.delete("/api/signin").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(SESSION_COOKIE).is_none());
    }
}
