use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `LEASESTAT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wal_file: String,
    pub metrics_port: Option<u16>,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_file: "leasestat.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("LEASESTAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_file: lookup("LEASESTAT_WAL_FILE")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.wal_file),
            metrics_port: lookup("LEASESTAT_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("LEASESTAT_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("LEASESTAT_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/leasestat.wal"));
    }

    #[test]
    fn values_are_parsed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("LEASESTAT_DATA_DIR", "/var/lib/leasestat"),
            ("LEASESTAT_WAL_FILE", "units.wal"),
            ("LEASESTAT_METRICS_PORT", "9100"),
            ("LEASESTAT_COMPACT_THRESHOLD", "50"),
            ("LEASESTAT_COMPACT_INTERVAL_SECS", "5"),
        ]));
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/leasestat/units.wal"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.compact_interval, Duration::from_secs(5));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("LEASESTAT_METRICS_PORT", "not-a-port"),
            ("LEASESTAT_COMPACT_THRESHOLD", "-3"),
            ("LEASESTAT_COMPACT_INTERVAL_SECS", "0"),
            ("LEASESTAT_WAL_FILE", ""),
        ]));
        assert_eq!(cfg, Config::default());
    }
}
