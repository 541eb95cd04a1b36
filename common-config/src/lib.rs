//! Environment-driven configuration for the three services, following the
//! teacher's `TelemetryConfig::from_env` idiom: a plain struct with a
//! `from_env()` constructor, defaults baked in, and explicit validation
//! rather than silent fallback for security-sensitive values.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },
    #[error("{var} must be at least {min} characters, got {actual}")]
    TooShort { var: &'static str, min: usize, actual: usize },
    #[error("{var} must not equal the built-in placeholder value")]
    UsesDefault { var: &'static str },
    #[error("{var} could not be parsed: {reason}")]
    Invalid { var: &'static str, reason: String },
}

const JWT_SECRET_PLACEHOLDER: &str =
    "dev-only-placeholder-secret-do-not-use-in-production-ever";

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { var: name, reason: format!("expected a value parseable from '{raw}'") }),
    }
}

/// JWT issuance and verification configuration (spec §6, §4.1).
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_duration: Duration,
    pub refresh_duration: Duration,
    pub refresh_duration_remember_me: Duration,
    pub refresh_duration_extended: Duration,
    pub issuer: String,
}

impl JwtConfig {
    /// Load from environment, enforcing the secret-strength requirement in
    /// spec §6: `JWT_SECRET` must be set, at least 32 bytes, and must not
    /// equal the built-in development placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env_var("JWT_SECRET").ok_or(ConfigError::Missing { var: "JWT_SECRET" })?;
        if secret.len() < 32 {
            return Err(ConfigError::TooShort { var: "JWT_SECRET", min: 32, actual: secret.len() });
        }
        if secret == JWT_SECRET_PLACEHOLDER {
            return Err(ConfigError::UsesDefault { var: "JWT_SECRET" });
        }

        let access_secs: u64 = env_or("JWT_ACCESS_DURATION_SECS", 15 * 60)?;
        let refresh_secs: u64 = env_or("JWT_REFRESH_DURATION_SECS", 7 * 24 * 60 * 60)?;
        let refresh_remember_secs: u64 = env_or("JWT_REFRESH_DURATION_REMEMBER_SECS", 30 * 24 * 60 * 60)?;
        let refresh_extended_secs: u64 = env_or("JWT_REFRESH_DURATION_EXTENDED_SECS", 90 * 24 * 60 * 60)?;
        let issuer = env_var("JWT_ISSUER").unwrap_or_else(|| "identity-service".to_string());

        Ok(Self {
            secret,
            access_duration: Duration::from_secs(access_secs),
            refresh_duration: Duration::from_secs(refresh_secs),
            refresh_duration_remember_me: Duration::from_secs(refresh_remember_secs),
            refresh_duration_extended: Duration::from_secs(refresh_extended_secs),
            issuer,
        })
    }

    /// Build a config for tests without touching the environment.
    pub fn for_tests() -> Self {
        Self {
            secret: "test-only-secret-at-least-32-bytes-long!!".to_string(),
            access_duration: Duration::from_secs(15 * 60),
            refresh_duration: Duration::from_secs(7 * 24 * 60 * 60),
            refresh_duration_remember_me: Duration::from_secs(30 * 24 * 60 * 60),
            refresh_duration_extended: Duration::from_secs(90 * 24 * 60 * 60),
            issuer: "identity-service-test".to_string(),
        }
    }
}

/// Gateway transport requirements (spec §6: `HTTP2_ENABLED`, `TLS_ENABLED`
/// must both be true at start).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub http2_enabled: bool,
    pub tls_enabled: bool,
}

impl TransportConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let http2_enabled: bool = env_or("HTTP2_ENABLED", true)?;
        let tls_enabled: bool = env_or("TLS_ENABLED", true)?;
        if !http2_enabled || !tls_enabled {
            return Err(ConfigError::Invalid {
                var: "HTTP2_ENABLED/TLS_ENABLED",
                reason: "both must be true at start".to_string(),
            });
        }
        Ok(Self { http2_enabled, tls_enabled })
    }
}

/// Mesh pool/health defaults (spec §4.2, §6).
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub health_interval: Duration,
    pub registry_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub pool_manager_refresh_interval: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout: Duration,
    pub circuit_request_timeout: Duration,
}

impl MeshConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let min_connections: usize = env_or("MESH_MIN_CONNECTIONS", 5)?;
        let max_connections: usize = env_or("MESH_MAX_CONNECTIONS", 20)?;
        let max_connections = max_connections.max(min_connections);
        let health_interval_secs: u64 = env_or("MESH_HEALTH_INTERVAL", 30)?;

        Ok(Self {
            min_connections,
            max_connections,
            health_interval: Duration::from_secs(health_interval_secs),
            registry_ttl: Duration::from_secs(45),
            heartbeat_interval: Duration::from_secs(15),
            pool_manager_refresh_interval: Duration::from_secs(30),
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: Duration::from_secs(30),
            circuit_request_timeout: Duration::from_secs(5),
        })
    }

    pub fn for_tests() -> Self {
        Self {
            min_connections: 2,
            max_connections: 3,
            health_interval: Duration::from_secs(30),
            registry_ttl: Duration::from_secs(45),
            heartbeat_interval: Duration::from_secs(15),
            pool_manager_refresh_interval: Duration::from_secs(30),
            circuit_failure_threshold: 3,
            circuit_recovery_timeout: Duration::from_millis(1000),
            circuit_request_timeout: Duration::from_millis(50),
        }
    }
}

/// Rate-limit and lockout policy (spec §4.1, §6: `RATE_LIMIT_RPM`).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub lockout_threshold: u32,
    pub lockout_window: Duration,
    pub verification_attempts_per_window: u32,
    pub verification_window: Duration,
    pub reset_attempts_per_window: u32,
    pub reset_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let requests_per_minute: u32 = env_or("RATE_LIMIT_RPM", 60)?;
        Ok(Self {
            requests_per_minute,
            lockout_threshold: 5,
            lockout_window: Duration::from_secs(15 * 60),
            verification_attempts_per_window: 3,
            verification_window: Duration::from_secs(60 * 60),
            reset_attempts_per_window: 3,
            reset_window: Duration::from_secs(60 * 60),
        })
    }

    pub fn for_tests() -> Self {
        Self {
            requests_per_minute: 600,
            lockout_threshold: 5,
            lockout_window: Duration::from_secs(15 * 60),
            verification_attempts_per_window: 3,
            verification_window: Duration::from_secs(60 * 60),
            reset_attempts_per_window: 3,
            reset_window: Duration::from_secs(60 * 60),
        }
    }
}

/// Simulation tick configuration (spec §4.3).
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_duration: Duration,
    pub as_fast_as_possible: bool,
    pub mailbox_capacity: usize,
    pub mailbox_full_grace: Duration,
    pub startup_batch_size: usize,
}

impl SimConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let tick_micros: u64 = env_or("SIM_TICK_DURATION_MICROS", 1000)?;
        let as_fast_as_possible: bool = env_or("SIM_AS_FAST_AS_POSSIBLE", false)?;
        let mailbox_capacity: usize = env_or("SIM_MAILBOX_CAPACITY", 64)?;
        let grace_millis: u64 = env_or("SIM_MAILBOX_GRACE_MILLIS", 500)?;
        let startup_batch_size: usize = env_or("SIM_STARTUP_BATCH_SIZE", 3)?;

        Ok(Self {
            tick_duration: Duration::from_micros(tick_micros),
            as_fast_as_possible,
            mailbox_capacity,
            mailbox_full_grace: Duration::from_millis(grace_millis),
            startup_batch_size,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            tick_duration: Duration::from_micros(200),
            as_fast_as_possible: true,
            mailbox_capacity: 64,
            mailbox_full_grace: Duration::from_millis(500),
            startup_batch_size: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_secret_must_be_set() {
        // SAFETY: tests run single-threaded for env-var mutation via serial harness below.
        temp_env(&[("JWT_SECRET", None)], || {
            assert!(matches!(JwtConfig::from_env(), Err(ConfigError::Missing { var: "JWT_SECRET" })));
        });
    }

    #[test]
    fn jwt_secret_must_be_long_enough() {
        temp_env(&[("JWT_SECRET", Some("short"))], || {
            assert!(matches!(JwtConfig::from_env(), Err(ConfigError::TooShort { .. })));
        });
    }

    #[test]
    fn jwt_secret_must_not_be_placeholder() {
        temp_env(&[("JWT_SECRET", Some(JWT_SECRET_PLACEHOLDER))], || {
            assert!(matches!(JwtConfig::from_env(), Err(ConfigError::UsesDefault { .. })));
        });
    }

    #[test]
    fn transport_requires_both_http2_and_tls() {
        temp_env(&[("HTTP2_ENABLED", Some("true")), ("TLS_ENABLED", Some("false"))], || {
            assert!(TransportConfig::from_env().is_err());
        });
    }

    #[test]
    fn mesh_clips_max_to_at_least_min() {
        temp_env(&[("MESH_MIN_CONNECTIONS", Some("10")), ("MESH_MAX_CONNECTIONS", Some("2"))], || {
            let cfg = MeshConfig::from_env().unwrap();
            assert_eq!(cfg.min_connections, 10);
            assert_eq!(cfg.max_connections, 10);
        });
    }

    // Minimal serialized env-var helper; avoids pulling in a crate just for tests.
    fn temp_env(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        let _guard = LOCK.lock().unwrap();
        let previous: Vec<(String, Option<String>)> =
            vars.iter().map(|(k, _)| (k.to_string(), std::env::var(k).ok())).collect();
        for (k, v) in vars {
            match v {
                Some(val) => unsafe { std::env::set_var(k, val) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
        f();
        for (k, v) in previous {
            match v {
                Some(val) => unsafe { std::env::set_var(&k, val) },
                None => unsafe { std::env::remove_var(&k) },
            }
        }
    }
}
