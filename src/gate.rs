//! The session gate: a fairing that walls off every non-public path behind
//! a verified session.
//!
//! Requests to public paths pass through untouched. Anything else must carry
//! the `__session` cookie, which the gate forwards to the same-origin
//! verification endpoint; only a 200 lets the request through. Every failure
//! mode (missing cookie, non-200, transport error, timeout) converges on the
//! same outcome, a redirect to `/signin`, so no partial-authentication state
//! ever reaches a handler and no error detail leaks to the client.

use reqwest::Client as HttpClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{uri::Origin, Method},
    response::Redirect,
    Build, Data, Request, Rocket, Route,
};

use crate::config::Config;
use crate::model::api::session::SESSION_COOKIE;

/// Paths that are reachable without a session. Exact match; static
/// configuration, never derived at runtime.
pub const PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/signin",
    "/signup",
    "/signup-success",
    "/about",
    "/roadmap",
    "/api/signin",
];

/// Where unauthenticated traffic ends up.
const SIGNIN_PATH: &str = "/signin";

/// Internal route the gate reroutes denied requests to.
const DENIED_PATH: &str = "/gate/denied";

/// Is this path exempt from the gate?
pub fn is_public(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&path) || is_asset(path)
}

/// Static assets are served without authentication.
pub(crate) fn is_asset(path: &str) -> bool {
    const IMAGE_EXTENSIONS: &[&str] = &[".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico"];
    path.starts_with("/static/")
        || path == "/favicon.ico"
        || IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// The gate's verification client: an HTTP client with an explicit timeout
/// and the resolved same-origin verification URL. Built once at ignition.
struct GateClient {
    http: HttpClient,
    verify_url: String,
}

impl GateClient {
    /// Forward the session cookie to the verification endpoint. Only a 200
    /// counts as authenticated; transport errors and timeouts fail closed.
    async fn verify(&self, cookie_value: &str) -> bool {
        let response = self
            .http
            .get(&self.verify_url)
            .header(
                reqwest::header::COOKIE,
                format!("{SESSION_COOKIE}={cookie_value}"),
            )
            .send()
            .await;
        match response {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                warn!("Session verification round-trip failed: {e}");
                false
            }
        }
    }
}

/// The session gate fairing. See the module docs.
pub struct SessionGate;

#[rocket::async_trait]
impl Fairing for SessionGate {
    fn info(&self) -> Info {
        Info {
            name: "Session gate",
            kind: Kind::Ignite | Kind::Request,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // `ConfigFairing` is attached first, so the config is managed.
        let (timeout, verify_url) = match rocket.state::<Config>() {
            Some(config) => (
                config.gate_timeout(),
                format!("{}/api/signin", config.site_url()),
            ),
            None => {
                error!("Session gate requires the application config");
                return Err(rocket);
            }
        };
        let http = match HttpClient::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                error!("Failed to build the gate's HTTP client: {e}");
                return Err(rocket);
            }
        };
        info!("Session gate verifying against {verify_url}");
        Ok(rocket.manage(GateClient { http, verify_url }))
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let path = req.uri().path().as_str().to_string();
        if is_public(&path) {
            return;
        }

        // Unwrap is safe as `on_ignite` managed the client.
        let gate = req.rocket().state::<GateClient>().unwrap();

        let authenticated = match req.cookies().get(SESSION_COOKIE) {
            // No cookie: denied without any outbound call.
            None => false,
            Some(cookie) => gate.verify(cookie.value()).await,
        };

        if !authenticated {
            // Reroute to the denied route, which answers with the redirect.
            req.set_method(Method::Get);
            req.set_uri(Origin::parse(DENIED_PATH).expect("static path parses"));
        }
    }
}

pub fn routes() -> Vec<Route> {
    routes![denied]
}

/// Terminal route for gated-out requests.
#[get("/gate/denied")]
fn denied() -> Redirect {
    Redirect::to(SIGNIN_PATH)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rocket::{
        http::{Cookie, Status},
        local::asynchronous::Client,
    };

    use super::*;

    /// A throwaway loopback verification endpoint answering every request
    /// with the given status line, counting the requests it sees.
    fn spawn_stub_verifier(status_line: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                hits_inner.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let response =
                    format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), hits)
    }

    async fn client(site_url: &str) -> Client {
        Client::tracked(crate::test_build(site_url)).await.unwrap()
    }

    #[test]
    fn public_route_set_is_exact_match() {
        assert!(is_public("/"));
        assert!(is_public("/signin"));
        assert!(is_public("/api/signin"));
        assert!(!is_public("/signin/extra"));
        assert!(!is_public("/api/votes"));
        // Assets are exempt too.
        assert!(is_public("/favicon.ico"));
        assert!(is_public("/static/banner.css"));
        assert!(is_public("/logo.png"));
    }

    #[rocket::async_test]
    async fn public_path_passes_with_zero_outbound_calls() {
        let (url, hits) = spawn_stub_verifier("HTTP/1.1 200 OK");
        let client = client(&url).await;

        // No cookie at all; the paths still pass through to routing (404,
        // not a redirect, since no page routes are mounted).
        for path in ["/", "/about", "/roadmap", "/signup"] {
            let response = client.get(path).dispatch().await;
            assert_eq!(Status::NotFound, response.status(), "path {path}");
        }
        assert_eq!(0, hits.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn missing_cookie_redirects_with_zero_outbound_calls() {
        let (url, hits) = spawn_stub_verifier("HTTP/1.1 200 OK");
        let client = client(&url).await;

        let response = client.get("/api/votes").dispatch().await;
        assert_eq!(Status::SeeOther, response.status());
        assert_eq!(Some("/signin"), response.headers().get_one("Location"));
        assert_eq!(0, hits.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn rejected_verification_redirects() {
        let (url, hits) = spawn_stub_verifier("HTTP/1.1 401 Unauthorized");
        let client = client(&url).await;

        let response = client
            .get("/api/votes")
            .cookie(Cookie::new(SESSION_COOKIE, "syntactically-present"))
            .dispatch()
            .await;
        assert_eq!(Status::SeeOther, response.status());
        assert_eq!(Some("/signin"), response.headers().get_one("Location"));
        assert_eq!(1, hits.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn accepted_verification_passes_through() {
        let (url, hits) = spawn_stub_verifier("HTTP/1.1 200 OK");
        let client = client(&url).await;

        // No such route is mounted, so passing the gate means a 404 rather
        // than a redirect.
        let response = client
            .get("/api/does-not-exist")
            .cookie(Cookie::new(SESSION_COOKIE, "verified-elsewhere"))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        assert_eq!(1, hits.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn transport_failure_fails_closed() {
        // Nothing is listening here.
        let client = client("http://127.0.0.1:9").await;

        let response = client
            .get("/api/votes")
            .cookie(Cookie::new(SESSION_COOKIE, "destined-to-fail"))
            .dispatch()
            .await;
        assert_eq!(Status::SeeOther, response.status());
        assert_eq!(Some("/signin"), response.headers().get_one("Location"));
    }

    #[rocket::async_test]
    async fn non_get_requests_are_gated_too() {
        let (url, _hits) = spawn_stub_verifier("HTTP/1.1 200 OK");
        let client = client(&url).await;

        let response = client.post("/api/votes").dispatch().await;
        assert_eq!(Status::SeeOther, response.status());
        assert_eq!(Some("/signin"), response.headers().get_one("Location"));
    }
}
