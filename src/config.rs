//! Runtime configuration.
//!
//! Every value can be overridden through the environment (or a `.env` file
//! loaded at startup):
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | TABLESIDE_DATA_DIR | ./data | directory holding `tableside.db` |
//! | TABLESIDE_LOG_DIR | {data_dir}/logs | rolling log directory |
//! | TABLESIDE_HTTP_ADDR | 0.0.0.0:3000 | HTTP bind address |
//! | TABLESIDE_PRESENCE_TTL_SECS | 120 | heartbeat TTL before a staff member is flipped offline |
//! | TABLESIDE_PRESENCE_SWEEP_SECS | 30 | presence sweep interval |
//! | TABLESIDE_WATER_ACK_WINDOW_SECS | 300 | look-back window for water acknowledgments |
//! | TABLESIDE_LOG_RETENTION | 14 | rolling log files kept |

use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub http_addr: String,
    pub presence_ttl_secs: i64,
    pub presence_sweep_secs: u64,
    pub water_ack_window_secs: i64,
    pub log_retention: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            http_addr: "0.0.0.0:3000".into(),
            presence_ttl_secs: 120,
            presence_sweep_secs: 30,
            water_ack_window_secs: 300,
            log_retention: 14,
        }
    }
}

impl AppConfig {
    /// Load from the environment, falling back to defaults for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let data_dir = std::env::var("TABLESIDE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let log_dir = std::env::var("TABLESIDE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("logs"));

        Self {
            data_dir,
            log_dir,
            http_addr: std::env::var("TABLESIDE_HTTP_ADDR").unwrap_or(defaults.http_addr),
            presence_ttl_secs: env_parse("TABLESIDE_PRESENCE_TTL_SECS")
                .unwrap_or(defaults.presence_ttl_secs),
            presence_sweep_secs: env_parse("TABLESIDE_PRESENCE_SWEEP_SECS")
                .unwrap_or(defaults.presence_sweep_secs),
            water_ack_window_secs: env_parse("TABLESIDE_WATER_ACK_WINDOW_SECS")
                .unwrap_or(defaults.water_ack_window_secs),
            log_retention: env_parse("TABLESIDE_LOG_RETENTION").unwrap_or(defaults.log_retention),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.presence_ttl_secs, 120);
        assert_eq!(cfg.water_ack_window_secs, 300);
        assert_eq!(cfg.log_dir, PathBuf::from("./data/logs"));
    }
}
