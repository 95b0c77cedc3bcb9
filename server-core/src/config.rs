//! Bootstrap configuration (C0). Read once at process start from
//! environment variables with typed defaults — no config file hot-reload,
//! since §6 only names environment variables as the configuration surface,
//! but the same "load once, hand down as a plain struct" shape used
//! elsewhere in this codebase.

use std::env;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_port: u16,
    pub udp_port: u16,
    pub voice_port: u16,
    pub admin_port: u16,
    pub admin_token: String,
}

impl Config {
    /// Never panics on a missing variable — every field has a default
    /// matching §6's documented port assignment.
    pub fn from_env() -> Self {
        Config {
            tcp_port: env_or("RTYPE_TCP_PORT", 4125),
            udp_port: env_or("RTYPE_UDP_PORT", 4124),
            voice_port: env_or("RTYPE_VOICE_PORT", 4126),
            admin_port: env_or("RTYPE_ADMIN_PORT", 4127),
            admin_token: env::var("RTYPE_ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ports() {
        // SAFETY: test runs single-threaded within this process; no other
        // test in this crate reads these particular variable names.
        unsafe {
            env::remove_var("RTYPE_TCP_PORT");
            env::remove_var("RTYPE_UDP_PORT");
            env::remove_var("RTYPE_VOICE_PORT");
            env::remove_var("RTYPE_ADMIN_PORT");
        }
        let config = Config::from_env();
        assert_eq!(config.tcp_port, 4125);
        assert_eq!(config.udp_port, 4124);
        assert_eq!(config.voice_port, 4126);
        assert_eq!(config.admin_port, 4127);
    }
}
