//! Default values for configuration

/// Default copy-host label: the machine's hostname when the environment
/// carries it, a placeholder otherwise.
pub fn default_host() -> String {
    std::env::var("GBTIM_HOST")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Default: read the pointing table, not just the header
pub fn default_full_data() -> bool {
    true
}
