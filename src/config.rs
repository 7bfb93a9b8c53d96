use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::cipher::VoteSealer;
use crate::model::mongodb::ensure_indexes_exist;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    site_url: String,
    session_ttl: u32,
    gate_timeout_ms: u32,
    // secrets
    jwt_secret: String,
    vote_secret: String,
}

impl Config {
    /// The base URL this deployment is reachable on. The session gate
    /// resolves its same-origin verification endpoint against this, so it
    /// must be correct per environment (local dev vs deployed); a wrong
    /// value makes verification fail closed.
    pub fn site_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Valid lifetime of the session cookie in seconds.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Budget for the gate's verification round-trip. A hung verification
    /// endpoint must not hang the gate.
    pub fn gate_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.gate_timeout_ms.into())
    }

    /// Secret key used to sign and verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Base64-encoded 32-byte secret key for sealing vote values.
    pub fn vote_secret(&self) -> &str {
        &self.vote_secret
    }
}

/// A fairing that loads the application config and puts it in managed state,
/// along with the [`VoteSealer`] derived from the vote secret. A missing or
/// malformed vote secret aborts ignition rather than failing on first use.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config: {e}");
                return Err(rocket);
            }
        };

        // Derive the vote sealer up front.
        let sealer = match VoteSealer::from_base64_key(config.vote_secret()) {
            Ok(sealer) => sealer,
            Err(e) => {
                error!("Invalid `vote_secret`: {e}");
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config).manage(sealer);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config: {e}");
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "electionph".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn bad_vote_secret_aborts_ignition() {
        let figment = rocket::Config::figment()
            .merge(("site_url", "http://localhost:8000"))
            .merge(("session_ttl", 432000))
            .merge(("gate_timeout_ms", 500))
            .merge(("jwt_secret", "unit-test-jwt-secret"))
            .merge(("vote_secret", "not-base64!!"));
        let result = rocket::custom(figment).attach(ConfigFairing).ignite().await;
        assert!(result.is_err());
        // Inspect the error kind so Rocket's Error doesn't panic on drop.
        if let Err(e) = &result {
            let _ = e.kind();
        }
    }

    #[rocket::async_test]
    async fn short_vote_secret_aborts_ignition() {
        let figment = rocket::Config::figment()
            .merge(("site_url", "http://localhost:8000"))
            .merge(("session_ttl", 432000))
            .merge(("gate_timeout_ms", 500))
            .merge(("jwt_secret", "unit-test-jwt-secret"))
            // 16 bytes, base64.
            .merge(("vote_secret", "AAAAAAAAAAAAAAAAAAAAAA=="));
        let result = rocket::custom(figment).attach(ConfigFairing).ignite().await;
        assert!(result.is_err());
        // Inspect the error kind so Rocket's Error doesn't panic on drop.
        if let Err(e) = &result {
            let _ = e.kind();
        }
    }
}
