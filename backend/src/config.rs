use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub max_upload_bytes: usize,
    pub scratch_dir: PathBuf,
    pub model: ModelSettings,
    pub storage: StorageSettings,
    pub notify: NotifySettings,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub endpoint: Url,
    pub timeout: Duration,
    pub target_class: String,
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    pub public_base_url: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub endpoint: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub publish_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_count: 3,
            queue_capacity: 64,
            publish_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let min_confidence: f32 = parse_or(&lookup, "MIN_CONFIDENCE", 0.25)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ConfigError::Invalid {
                name: "MIN_CONFIDENCE",
                reason: format!("{} is outside 0..=1", min_confidence),
            });
        }

        let worker_count: usize = parse_or(&lookup, "WORKER_COUNT", 3)?;
        let queue_capacity: usize = parse_or(&lookup, "QUEUE_CAPACITY", 64)?;
        if worker_count == 0 || queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_COUNT/QUEUE_CAPACITY",
                reason: "must be greater than zero".to_string(),
            });
        }

        let target_class = lookup("TARGET_CLASS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "bottle".to_string());

        let public_base_url = match lookup("PUBLIC_BASE_URL") {
            Some(raw) => Some(parse_url("PUBLIC_BASE_URL", &raw)?),
            None => None,
        };

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            scratch_dir: lookup("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmp")),
            model: ModelSettings {
                endpoint: required_url(&lookup, "MODEL_ENDPOINT")?,
                timeout: Duration::from_secs(parse_or(&lookup, "MODEL_TIMEOUT_SECS", 60)?),
                target_class,
                min_confidence,
            },
            storage: StorageSettings {
                bucket: lookup("S3_BUCKET_NAME").ok_or(ConfigError::Missing("S3_BUCKET_NAME"))?,
                public_base_url,
            },
            notify: NotifySettings {
                endpoint: required_url(&lookup, "NOTIFY_ENDPOINT")?,
                timeout: Duration::from_secs(parse_or(&lookup, "NOTIFY_TIMEOUT_SECS", 10)?),
            },
            dispatch: DispatchSettings {
                worker_count,
                queue_capacity,
                publish_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "PUBLISH_TIMEOUT_SECS",
                    30,
                )?),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn required_url<F>(lookup: &F, name: &'static str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name).ok_or(ConfigError::Missing(name))?;
    parse_url(name, &raw)
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("MODEL_ENDPOINT", "http://localhost:9000/detect"),
            ("S3_BUCKET_NAME", "vending-bucket"),
            ("NOTIFY_ENDPOINT", "http://localhost:3000/api/endpoint"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = load(&base_env()).unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:8080");
        assert_eq!(settings.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(settings.model.target_class, "bottle");
        assert_eq!(settings.model.min_confidence, 0.25);
        assert_eq!(settings.dispatch.worker_count, 3);
        assert_eq!(settings.dispatch.queue_capacity, 64);
        assert!(settings.storage.public_base_url.is_none());
    }

    #[test]
    fn missing_bucket_is_reported() {
        let mut vars = base_env();
        vars.remove("S3_BUCKET_NAME");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("S3_BUCKET_NAME"))));
    }

    #[test]
    fn threshold_outside_unit_range_is_rejected() {
        let mut vars = base_env();
        vars.insert("MIN_CONFIDENCE", "1.5");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "MIN_CONFIDENCE", .. })
        ));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut vars = base_env();
        vars.insert("WORKER_COUNT", "0");
        assert!(load(&vars).is_err());
    }
}
