//! Environment-driven configuration (spec.md §4.2, §6, §9).
//!
//! The original Django settings module reads these straight off
//! `os.environ` via `django.conf.settings`, coercing stringly-typed values
//! (`int(settings.MAX_ACTIVE_K8S_JOBS)`, `util.strtobool(str(settings.WATCH_K8S))`)
//! at the point of use. Hydra centralizes the same coercions into one typed
//! struct built once at startup, so a malformed env var fails fast instead
//! of surfacing as a confusing runtime type error deep in the scheduler.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub enum ClusterAuth {
    /// `K8S_API_URL` was set: token-auth mode.
    Token {
        api_url: String,
        cacert_base64: String,
        token: String,
    },
    /// `K8S_API_URL` was unset: discover from the environment (kubeconfig).
    Kubeconfig,
}

#[derive(Debug, Clone)]
pub struct HydraConfig {
    pub cluster_auth: ClusterAuth,
    pub max_active_k8s_jobs: i64,
    pub watch_k8s: bool,
    pub watch_k8s_namespace: String,
    pub watch_k8s_timeout: Duration,
    pub watch_k8s_request_timeout: Duration,
    pub process_batch_test_image: Option<String>,
    pub houston_url: Option<String>,
    pub houston_token: Option<String>,
    pub root_cert_verify: bool,
    /// Whether `on_save_batch_job_event`'s parent→child cascade is wired.
    /// The original signal handler that would drive this is commented out
    /// in the source (spec.md §9); Hydra defaults this on since a
    /// `trigger_children` spec is otherwise inert, but keeps the flag so an
    /// operator can reproduce the dormant-source behavior if needed.
    pub cascade_enabled: bool,
}

fn env_string(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Parses a stringly-typed boolean the way `distutils.util.strtobool` does:
/// `y/yes/t/true/on/1` → true, `n/no/f/false/off/0` → false.
fn parse_bool_loose(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => parse_bool_loose(&raw).ok_or_else(|| ConfigError::Invalid(key, raw)),
    }
}

fn env_i64(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<i64>().map_err(|_| ConfigError::Invalid(key, raw)),
    }
}

fn env_secs(key: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(Duration::from_secs(default_secs)),
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid(key, raw)),
    }
}

impl HydraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cluster_auth = match env_opt_string("K8S_API_URL") {
            Some(api_url) => ClusterAuth::Token {
                api_url,
                cacert_base64: env_string("K8S_CACERT")?,
                token: env_string("K8S_TOKEN")?,
            },
            None => ClusterAuth::Kubeconfig,
        };

        Ok(HydraConfig {
            cluster_auth,
            max_active_k8s_jobs: env_i64("MAX_ACTIVE_K8S_JOBS", 5)?,
            watch_k8s: env_bool("WATCH_K8S", false)?,
            watch_k8s_namespace: env_opt_string("WATCH_K8S_NAMESPACE").unwrap_or_else(|| "processing".to_string()),
            watch_k8s_timeout: env_secs("WATCH_K8S_TIMEOUT", 300)?,
            watch_k8s_request_timeout: env_secs("WATCH_K8S_REQUEST_TIMEOUT", 310)?,
            process_batch_test_image: env_opt_string("PROCESS_BATCH_TEST_IMAGE"),
            houston_url: env_opt_string("HOUSTON_URL"),
            houston_token: env_opt_string("HOUSTON_TOKEN"),
            root_cert_verify: env_bool("ROOT_CERT", true)?,
            cascade_enabled: env_bool("HYDRA_CASCADE_ENABLED", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_bool_accepts_source_style_strings() {
        assert_eq!(parse_bool_loose("true"), Some(true));
        assert_eq!(parse_bool_loose("True"), Some(true));
        assert_eq!(parse_bool_loose("1"), Some(true));
        assert_eq!(parse_bool_loose("no"), Some(false));
        assert_eq!(parse_bool_loose("banana"), None);
    }
}
