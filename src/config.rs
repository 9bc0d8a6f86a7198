use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("invalid {var}={value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Runtime settings, read once from `AREABOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    /// JSON file with the common-area catalog. Without one every area is free
    /// and availability queries return `NotFound`.
    pub catalog_path: Option<PathBuf>,
    pub currency: String,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            catalog_path: None,
            currency: "BOB".into(),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

fn parse<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        reason: e.to_string(),
        value: raw,
    })
}

fn parse_currency(raw: String) -> Result<String, ConfigError> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ConfigError {
            var: "AREABOOK_CURRENCY",
            value: raw,
            reason: "expected a three-letter currency code".into(),
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their defaults; set-but-invalid keys fail.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        if let Some(v) = lookup("AREABOOK_BIND") {
            cfg.bind = parse("AREABOOK_BIND", v)?;
        }
        if let Some(v) = lookup("AREABOOK_PORT") {
            cfg.port = parse("AREABOOK_PORT", v)?;
        }
        if let Some(v) = lookup("AREABOOK_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        cfg.catalog_path = lookup("AREABOOK_CATALOG")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(v) = lookup("AREABOOK_CURRENCY") {
            cfg.currency = parse_currency(v)?;
        }
        if let Some(v) = lookup("AREABOOK_METRICS_PORT") {
            cfg.metrics_port = Some(parse("AREABOOK_METRICS_PORT", v)?);
        }
        if let Some(v) = lookup("AREABOOK_COMPACT_THRESHOLD") {
            cfg.compact_threshold = parse("AREABOOK_COMPACT_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("AREABOOK_COMPACT_INTERVAL_SECS") {
            let secs: u64 = parse("AREABOOK_COMPACT_INTERVAL_SECS", v.clone())?;
            if secs == 0 {
                return Err(ConfigError {
                    var: "AREABOOK_COMPACT_INTERVAL_SECS",
                    value: v,
                    reason: "must be at least 1".into(),
                });
            }
            cfg.compact_interval = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}
