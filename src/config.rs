//! Runtime configuration from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `PAYDESK_ADDR` | `127.0.0.1:8080` |
//! | `PAYDESK_SESSION_COOKIE` | `paydesk_session` |
//! | `PAYDESK_SESSION_TTL_SECS` | `7200` |
//! | `PAYDESK_LOGIN_PATH` | `/login` |
//! | `PAYDESK_HOME_PATH` | `/` |
//! | `PAYDESK_COOKIE_SECURE` | `false` |
//!
//! A `.env` file in the working directory is loaded first, if present.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub session_cookie: String,
    /// Inactivity after which a session expires.
    pub session_ttl: Duration,
    /// Where anonymous visitors are sent by the `auth` middleware.
    pub login_path: String,
    /// Where signed-in users are sent by the `guest` middleware.
    pub home_path: String,
    /// Adds `Secure` to the session cookie. Enable behind TLS.
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            session_cookie: "paydesk_session".to_owned(),
            session_ttl: Duration::from_secs(7200),
            login_path: "/login".to_owned(),
            home_path: "/".to_owned(),
            cookie_secure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            addr: parsed(&lookup, "PAYDESK_ADDR")?.unwrap_or(defaults.addr),
            session_cookie: lookup("PAYDESK_SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            session_ttl: parsed::<u64>(&lookup, "PAYDESK_SESSION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            login_path: lookup("PAYDESK_LOGIN_PATH").unwrap_or(defaults.login_path),
            home_path: lookup("PAYDESK_HOME_PATH").unwrap_or(defaults.home_path),
            cookie_secure: parsed(&lookup, "PAYDESK_COOKIE_SECURE")?.unwrap_or(defaults.cookie_secure),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        let cookie_ok = !self.session_cookie.is_empty()
            && self.session_cookie.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !cookie_ok {
            return Err(Error::Config(format!(
                "PAYDESK_SESSION_COOKIE `{}` is not a valid cookie name",
                self.session_cookie
            )));
        }
        for (key, path) in [("PAYDESK_LOGIN_PATH", &self.login_path), ("PAYDESK_HOME_PATH", &self.home_path)] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("{key} must be an absolute path, got `{path}`")));
            }
        }
        if self.session_ttl.is_zero() {
            return Err(Error::Config("PAYDESK_SESSION_TTL_SECS must be positive".into()));
        }
        Ok(())
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, Error>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| raw.trim().parse().map_err(|e| Error::Config(format!("{key}=`{raw}`: {e}"))))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let map: HashMap<String, String> = pairs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn unset_keys_use_defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.session_cookie, "paydesk_session");
        assert_eq!(config.login_path, "/login");
        assert!(!config.cookie_secure);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = from(&[
            ("PAYDESK_ADDR", "0.0.0.0:3000"),
            ("PAYDESK_SESSION_TTL_SECS", "60"),
            ("PAYDESK_COOKIE_SECURE", "true"),
            ("PAYDESK_LOGIN_PATH", "/signin"),
        ])
        .unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert!(config.cookie_secure);
        assert_eq!(config.login_path, "/signin");
    }

    #[test]
    fn bad_values_are_config_errors() {
        for pairs in [
            [("PAYDESK_ADDR", "nowhere")],
            [("PAYDESK_SESSION_TTL_SECS", "soon")],
            [("PAYDESK_SESSION_TTL_SECS", "0")],
            [("PAYDESK_LOGIN_PATH", "login")],
            [("PAYDESK_SESSION_COOKIE", "bad cookie")],
        ] {
            assert!(matches!(from(&pairs), Err(Error::Config(_))), "{pairs:?}");
        }
    }
}
