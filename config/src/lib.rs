//! Load prismic-client settings from the process environment, a project `.env` and the XDG
//! `config.toml`, with priority: **existing env > .env > XDG**.
//!
//! Every source speaks the same keys (`PRISMIC_REPOSITORY`, `PRISMIC_ACCESS_TOKEN`, …). The
//! XDG file keeps them in an `[env]` table:
//!
//! ```toml
//! [env]
//! PRISMIC_REPOSITORY = "my-repo"
//! PRISMIC_METADATA_TTL_MS = "5000"
//! ```

mod env_file;
mod xdg_toml;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Repository name or full API endpoint.
pub const ENV_REPOSITORY: &str = "PRISMIC_REPOSITORY";
/// Access token for private repositories.
pub const ENV_ACCESS_TOKEN: &str = "PRISMIC_ACCESS_TOKEN";
/// Ref to pin every query to.
pub const ENV_REF: &str = "PRISMIC_REF";
/// Minimum spacing between body-bearing requests to one host, in milliseconds.
pub const ENV_REQUEST_INTERVAL_MS: &str = "PRISMIC_REQUEST_INTERVAL_MS";
/// Repository metadata cache lifetime, in milliseconds.
pub const ENV_METADATA_TTL_MS: &str = "PRISMIC_METADATA_TTL_MS";

const KEYS: [&str; 5] = [
    ENV_REPOSITORY,
    ENV_ACCESS_TOKEN,
    ENV_REF,
    ENV_REQUEST_INTERVAL_MS,
    ENV_METADATA_TTL_MS,
];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    Dotenv(#[from] ::dotenv::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings a client can be built from. Unset keys stay `None` so the client keeps its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub repository: Option<String>,
    pub access_token: Option<String>,
    pub pinned_ref: Option<String>,
    pub request_interval: Option<Duration>,
    pub metadata_ttl: Option<Duration>,
}

/// Loads settings for `app_name`.
///
/// * `app_name`: used for the XDG path `~/.config/<app_name>/config.toml`.
/// * `override_dir`: if `Some`, look for `.env` there instead of the current directory.
pub fn load_settings(app_name: &str, override_dir: Option<&Path>) -> Result<ClientSettings, LoadError> {
    let xdg_map = match xdg_toml::config_path(app_name)? {
        Some(path) => xdg_toml::load_env_map(&path)?,
        None => HashMap::new(),
    };
    let dotenv_map = env_file::load_env_map(override_dir)?;
    resolve_settings(|key| std::env::var(key).ok(), &dotenv_map, &xdg_map)
}

/// Merges the three layers key by key (`env` > `dotenv` > `xdg`) and parses the result.
///
/// Empty values count as unset.
pub fn resolve_settings<E>(
    env: E,
    dotenv: &HashMap<String, String>,
    xdg: &HashMap<String, String>,
) -> Result<ClientSettings, LoadError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut merged: HashMap<&'static str, String> = HashMap::new();
    for key in KEYS {
        let non_empty = |v: &String| !v.trim().is_empty();
        let value = env(key)
            .filter(non_empty)
            .or_else(|| dotenv.get(key).cloned().filter(non_empty))
            .or_else(|| xdg.get(key).cloned().filter(non_empty));
        if let Some(v) = value {
            merged.insert(key, v.trim().to_string());
        }
    }

    Ok(ClientSettings {
        repository: merged.remove(ENV_REPOSITORY),
        access_token: merged.remove(ENV_ACCESS_TOKEN),
        pinned_ref: merged.remove(ENV_REF),
        request_interval: parse_millis(ENV_REQUEST_INTERVAL_MS, merged.remove(ENV_REQUEST_INTERVAL_MS))?,
        metadata_ttl: parse_millis(ENV_METADATA_TTL_MS, merged.remove(ENV_METADATA_TTL_MS))?,
    })
}

fn parse_millis(key: &'static str, value: Option<String>) -> Result<Option<Duration>, LoadError> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| LoadError::InvalidValue { key, value: v })
        })
        .transpose()
}
