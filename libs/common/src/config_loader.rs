//! Configuration loading helper functions
//! Provides utilities for resolving single values with fallback logic

use tracing::debug;

/// Get string configuration value with priority: config file > ENV > default
///
/// Empty strings are treated as unset at every level.
pub fn get_string_config(file_value: Option<String>, env_var: &str, default: &str) -> String {
    if let Some(val) = file_value.filter(|v| !v.is_empty()) {
        debug!("Using {} from configuration file", env_var);
        return val;
    }

    if let Ok(env_val) = std::env::var(env_var) {
        if !env_val.is_empty() {
            debug!("Using {} from environment", env_var);
            return env_val;
        }
    }

    debug!("Using default value for {}", env_var);
    default.to_string()
}
