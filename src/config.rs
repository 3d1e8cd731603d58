//! Startup Configuration
//! Mission: Load runtime settings from the environment, refusing to boot insecure

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

/// Minimum length for HS256 signing secrets.
const MIN_SECRET_LEN: usize = 32;

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the API server binds to.
    pub bind_addr: String,
    /// SQLite file holding users and refresh tokens.
    pub db_path: String,
    /// Secret signing short-lived access tokens.
    pub access_token_secret: String,
    /// Independent secret signing refresh tokens.
    pub refresh_token_secret: String,
}

impl AppConfig {
    /// Resolve configuration from the environment.
    ///
    /// Token secrets have no fallback: a missing, short, or shared secret
    /// aborts startup instead of signing tokens with a known-weak key.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_path = resolve_data_path(env::var("AUTH_DB_PATH").ok(), "plateful_auth.db");

        let access_token_secret = env::var("ACCESS_TOKEN_SECRET")
            .context("ACCESS_TOKEN_SECRET is not set - refusing to start")?;
        let refresh_token_secret = env::var("REFRESH_TOKEN_SECRET")
            .context("REFRESH_TOKEN_SECRET is not set - refusing to start")?;

        validate_secret("ACCESS_TOKEN_SECRET", &access_token_secret)?;
        validate_secret("REFRESH_TOKEN_SECRET", &refresh_token_secret)?;

        if access_token_secret == refresh_token_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        Ok(Self {
            bind_addr,
            db_path,
            access_token_secret,
            refresh_token_secret,
        })
    }
}

fn validate_secret(name: &str, value: &str) -> Result<()> {
    if value.len() < MIN_SECRET_LEN {
        bail!("{name} must be at least {MIN_SECRET_LEN} characters");
    }
    Ok(())
}

/// Resolve a data file path. Relative paths are anchored at the crate
/// directory so running from a different working directory doesn't create a
/// second empty database.
fn resolve_data_path(configured: Option<String>, default_name: &str) -> String {
    match configured {
        Some(p) if !p.trim().is_empty() => p,
        _ => {
            let manifest_dir = env!("CARGO_MANIFEST_DIR");
            Path::new(manifest_dir)
                .join(default_name)
                .to_string_lossy()
                .into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_length_enforced() {
        assert!(validate_secret("X", "short").is_err());
        assert!(validate_secret("X", &"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_resolve_data_path_prefers_configured() {
        let p = resolve_data_path(Some("/tmp/auth.db".to_string()), "default.db");
        assert_eq!(p, "/tmp/auth.db");

        let p = resolve_data_path(None, "default.db");
        assert!(p.ends_with("default.db"));
    }
}
