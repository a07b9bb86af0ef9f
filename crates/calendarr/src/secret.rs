//! Secret reference resolver.
//!
//! Values in `config.toml` can point outside the file:
//!
//! - `env::VAR_NAME` - reads `$VAR_NAME` from the environment
//! - anything else - returned as-is (plain text)

/// Resolves a value that may contain a secret reference prefix.
///
/// The error message names the reference, never the resolved value.
pub fn resolve(value: &str) -> Result<String, String> {
    match value.strip_prefix("env::") {
        Some(var) => resolve_env(var.trim()),
        None => Ok(value.to_string()),
    }
}

/// Returns true when `value` is a reference rather than plain text.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("env::")
}

fn resolve_env(var: &str) -> Result<String, String> {
    if var.is_empty() {
        return Err("`env::` reference without a variable name".to_string());
    }
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Ok(_) => Err(format!("environment variable `{var}` is empty")),
        Err(_) => Err(format!("environment variable `{var}` is not set")),
    }
}
