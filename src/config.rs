use std::{env, fmt::Display, str::FromStr};

use tracing::{debug, warn};

pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_FIELD_LENGTH: usize = 5000;

pub const USERS_LIST_KEY: &str = "users_list";
pub const LISTINGS_LIST_KEY: &str = "listings_list";
pub const SESSIONS_INDEX_KEY: &str = "sessions_index";

pub const SESSION_COOKIE: &str = "listings.sid";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn listing_key(id: &str) -> String {
    format!("listing:{}", id)
}

pub fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Label of the Spin key-value store backing the component.
    pub kv_store: String,
    /// Inactivity window of a session, refreshed on every request.
    pub session_max_age_secs: i64,
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            kv_store: "default".to_string(),
            session_max_age_secs: 3600,
            cookie_secure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: try_load("LISTINGS_HOST", defaults.host),
            port: try_load("LISTINGS_PORT", defaults.port),
            kv_store: try_load("LISTINGS_KV_STORE", defaults.kv_store),
            session_max_age_secs: try_load(
                "LISTINGS_SESSION_MAX_AGE_SECS",
                defaults.session_max_age_secs,
            ),
            cookie_secure: try_load("LISTINGS_COOKIE_SECURE", defaults.cookie_secure),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            // The component reloads config on every request, so this stays quiet.
            debug!("{key} not set, using default: {default}");
            default
        }
    }
}
