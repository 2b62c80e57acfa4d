use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

/// Used when `COLLEGED_JWT_SECRET` is unset. Fine for local use only.
const DEV_JWT_SECRET: &str = "college-management-dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub jwt_secret: String,
    pub allow_dev_tokens: bool,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        Self {
            data_dir: var("COLLEGED_DATA_DIR").ok().map(PathBuf::from),
            uploads_dir: var("COLLEGED_UPLOADS_DIR").ok().map(PathBuf::from),
            jwt_secret: var("COLLEGED_JWT_SECRET").unwrap_or_else(|_| {
                warn!("COLLEGED_JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }),
            allow_dev_tokens: try_load("COLLEGED_DEV_TOKENS", false),
            admin_password: var("COLLEGED_ADMIN_PASSWORD").ok(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(()) => default,
    }
}
