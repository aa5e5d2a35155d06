//! Runtime secret resolution.
//!
//! Config holds the NAME of the env var carrying the database URL
//! (`store.database_url_env`); this module reads the value, once, at
//! startup. Errors name the variable, never its value, and `Debug` redacts.
//!
//! | Backend    | Required                  |
//! |------------|---------------------------|
//! | `postgres` | database URL env var      |
//! | `memory`   | nothing                   |

use anyhow::{bail, Result};
use serde_json::Value;

use crate::settings::DEFAULT_DATABASE_URL_ENV;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the env var the URL came from.
    pub database_url_env: String,
    /// `None` when the variable is unset or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the store secrets for the configured backend.
///
/// # Errors
/// `SECRETS_MISSING` when the backend is `postgres` and the named variable
/// is unset; `SECRETS_UNKNOWN_BACKEND` for an unrecognised backend.
pub fn resolve_store_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let database_url_env = read_str_at(config_json, "/store/database_url_env")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string());
    let backend = read_str_at(config_json, "/store/backend")
        .unwrap_or_else(|| "memory".to_string())
        .to_ascii_lowercase();

    let database_url = resolve_env(&database_url_env);

    match backend.as_str() {
        "postgres" => {
            if database_url.is_none() {
                bail!(
                    "SECRETS_MISSING backend=postgres: required env var '{}' \
                     (database url) is not set or empty",
                    database_url_env,
                );
            }
        }
        "memory" => {}
        other => {
            bail!(
                "SECRETS_UNKNOWN_BACKEND: unrecognised store backend '{}'; \
                 expected one of: memory | postgres",
                other,
            );
        }
    }

    Ok(ResolvedSecrets {
        database_url_env,
        database_url,
    })
}
