//! Backend server for Election PH, an unofficial public-opinion survey
//! platform modeled on elections. Users sign in via a bearer-token exchange,
//! browse candidates, cast sealed votes, and view tallied results;
//! administrators manage elections and candidates.
//!
//! Authentication is enforced at two levels: the [`gate::SessionGate`]
//! fairing walls off every non-public path behind a same-origin session
//! verification round-trip, and individual handlers derive the caller's
//! identity from the signed `__session` cookie via request guards.

#[macro_use]
extern crate log;
#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

pub mod api;
pub mod cipher;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use gate::SessionGate;
use logging::LoggerFairing;

/// Build the rocket instance with all fairings and routes attached.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LoggerFairing)
        .attach(SessionGate)
}

/// A rocket instance for endpoint tests: real config and gate, no database.
/// Handlers that take a `Coll<T>` guard cannot be dispatched against it.
#[cfg(test)]
pub(crate) fn test_build(site_url: &str) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("site_url", site_url))
        .merge(("session_ttl", 432000))
        .merge(("gate_timeout_ms", 500))
        .merge(("jwt_secret", "unit-test-jwt-secret"))
        .merge((
            "vote_secret",
            // 32 zero bytes, base64.
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
        ));
    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(SessionGate)
}
