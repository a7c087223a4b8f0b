//! Sealer configuration

use liberty_consensus::PowMode;
use serde::{Deserialize, Serialize};

/// Configuration for the sealing engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SealerConfig {
    /// Proof-of-work mode
    pub pow_mode: PowMode,
    /// Local search threads. Zero disables local search, negative values
    /// are treated as zero.
    pub threads: i64,
    /// Whether to run the remote sealer for external miners
    pub remote: bool,
    /// Endpoints notified whenever new work is pushed
    pub notify: Vec<String>,
    /// Send the full header to notify endpoints instead of the work package
    pub notify_full: bool,
    /// Accept remote solutions without verifying them
    pub noverify: bool,
}

impl Default for SealerConfig {
    fn default() -> Self {
        Self {
            pow_mode: PowMode::Normal,
            threads: num_cpus::get() as i64,
            remote: true,
            notify: Vec::new(),
            notify_full: false,
            noverify: false,
        }
    }
}

impl SealerConfig {
    /// Config with the given PoW mode
    pub fn with_mode(mut self, mode: PowMode) -> Self {
        self.pow_mode = mode;
        self
    }

    /// Config with specific thread count
    pub fn with_threads(mut self, threads: i64) -> Self {
        self.threads = threads;
        self
    }

    /// Config with notification endpoints
    pub fn with_notify(mut self, urls: Vec<String>, full: bool) -> Self {
        self.notify = urls;
        self.notify_full = full;
        self
    }

    /// Disable verification of remote solutions
    pub fn with_noverify(mut self, noverify: bool) -> Self {
        self.noverify = noverify;
        self
    }

    /// Disable the remote sealer
    pub fn local_only(mut self) -> Self {
        self.remote = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SealerConfig::default();
        assert_eq!(config.pow_mode, PowMode::Normal);
        assert!(config.threads >= 1);
        assert!(config.remote);
        assert!(config.notify.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SealerConfig = serde_json::from_str(
            r#"{"pow-mode":"test","threads":-3,"notify":["http://127.0.0.1:8080"],"notify-full":true}"#,
        )
        .unwrap();

        assert_eq!(config.pow_mode, PowMode::Test);
        assert_eq!(config.threads, -3);
        assert!(config.remote);
        assert!(config.notify_full);
        assert_eq!(config.notify.len(), 1);
    }
}
