use std::env;

/// Reads an environment variable, parsing it into the requested type and
/// falling back to the given default when absent or unparseable.
pub fn get_env_var_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
