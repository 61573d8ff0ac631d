//! Secrets from the process environment, optionally seeded from a `.env` file.

use crate::utils::error::{PrepError, Result};
use std::path::Path;

/// Loads `env_file` into the process environment, overriding variables that
/// are already set. Returns whether a file was loaded.
pub fn load_env_file(env_file: &Path) -> bool {
    if !env_file.exists() {
        tracing::debug!("No env file at {}", env_file.display());
        return false;
    }
    match dotenvy::from_path_override(env_file) {
        Ok(()) => {
            tracing::info!("Loaded environment from {}", env_file.display());
            true
        }
        Err(e) => {
            tracing::warn!("⚠️ Could not read {}: {}", env_file.display(), e);
            false
        }
    }
}

/// A non-blank environment variable.
pub fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| PrepError::MissingConfigError {
        field: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_env_file_overrides() {
        let dir = TempDir::new().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "MAPPREP_ENV_TEST=from_file\n").unwrap();

        std::env::set_var("MAPPREP_ENV_TEST", "from_process");
        assert!(load_env_file(&env_file));
        assert_eq!(optional_var("MAPPREP_ENV_TEST").as_deref(), Some("from_file"));
        std::env::remove_var("MAPPREP_ENV_TEST");

        assert!(!load_env_file(&dir.path().join("missing.env")));
    }

    #[test]
    fn test_required_var_missing() {
        let err = required_var("MAPPREP_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, PrepError::MissingConfigError { .. }));
    }
}
