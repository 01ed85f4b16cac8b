use regex::{Captures, Regex};
use std::env;

use crate::ConfigError;

const ENV_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

/// Interpolate environment variables in a config document.
///
/// `${VAR}` is replaced with the value of `VAR`; `${VAR:-fallback}` uses
/// `fallback` when `VAR` is unset. Every unset variable without a fallback
/// is reported at once.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(ENV_PATTERN).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        match (env::var(name), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                if !missing.iter().any(|m: &String| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result.into_owned())
}
