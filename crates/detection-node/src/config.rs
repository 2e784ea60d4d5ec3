use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use common::alerts::AlertPolicy;
use common::cameras::CameraConfig;
use common::error::ConfigError;

use crate::capture::{CaptureSettings, RestartPolicy};
use crate::stream::StreamSettings;

/// SMTP settings for the email notification channel. Only present when the
/// full set of SMTP variables is configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    pub node_id: String,
    /// Base URL of the external classification service.
    pub classifier_url: String,
    pub classify_timeout: Duration,
    /// Minimum spacing between classifier calls per camera.
    pub inference_interval: Duration,
    pub capture: CaptureSettings,
    pub stream: StreamSettings,
    pub alert_policy: AlertPolicy,
    pub snapshot_dir: PathBuf,
    pub database_url: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub webhook_url: Option<String>,
    /// Cameras registered at startup.
    pub cameras: Vec<CameraConfig>,
    /// How long stop waits for pipeline tasks before aborting them.
    pub stop_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            node_id: "detection-node".to_string(),
            classifier_url: "http://127.0.0.1:8090".to_string(),
            classify_timeout: Duration::from_millis(5_000),
            inference_interval: Duration::from_millis(1_500),
            capture: CaptureSettings::default(),
            stream: StreamSettings::default(),
            alert_policy: AlertPolicy::default(),
            snapshot_dir: PathBuf::from("data/snapshots"),
            database_url: None,
            smtp: None,
            webhook_url: None,
            cameras: Vec::new(),
            stop_grace: Duration::from_millis(3_000),
        }
    }
}

impl Config {
    /// Loads configuration from the environment. Unset variables fall back
    /// to defaults; values that are present but unparseable are rejected
    /// instead of silently defaulted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("DETECTION_NODE_ADDR") {
            config.bind_addr = addr;
        }
        config.node_id = env::var("NODE_ID").unwrap_or_else(|_| default_node_id());
        if let Ok(url) = env::var("CLASSIFIER_URL") {
            config.classifier_url = url;
        }
        config.classify_timeout =
            Duration::from_millis(env_parsed("CLASSIFY_TIMEOUT_MS", 5_000u64)?);
        config.inference_interval =
            Duration::from_millis(env_parsed("INFERENCE_INTERVAL_MS", 1_500u64)?);

        config.capture = CaptureSettings {
            fps: env_parsed("CAPTURE_FPS", 15u32)?,
            width: env_parsed("FRAME_WIDTH", 640u32)?,
            jpeg_quality: env_parsed("JPEG_QUALITY", 5u32)?,
            restart: RestartPolicy {
                max_retries: env_parsed("CAPTURE_MAX_RETRIES", 5u32)?,
                backoff_start_ms: env_parsed("CAPTURE_BACKOFF_MS", 500u64)?,
                backoff_max_ms: env_parsed("CAPTURE_BACKOFF_MAX_MS", 10_000u64)?,
            },
        };
        config.stream = StreamSettings {
            fps: env_parsed("STREAM_FPS", 15u32)?,
            overlay: env_bool("STREAM_OVERLAY", true)?,
        };

        config.alert_policy = AlertPolicy {
            confidence_threshold: env_parsed("ALERT_CONFIDENCE_THRESHOLD", 0.75f32)?,
            required_repeats: env_parsed("ALERT_REQUIRED_REPEATS", 1u32)?,
            cooldown: Duration::from_secs(env_parsed("ALERT_COOLDOWN_SECS", 8u64)?),
            normal_labels: normal_labels_from_env(),
        };
        config.alert_policy.validate()?;

        if let Ok(dir) = env::var("SNAPSHOT_DIR") {
            config.snapshot_dir = PathBuf::from(dir);
        }
        config.database_url = env::var("DATABASE_URL").ok();
        config.smtp = smtp_from_env()?;
        config.webhook_url = env::var("ALERT_WEBHOOK_URL").ok();
        if let Ok(path) = env::var("CAMERAS_FILE") {
            config.cameras = load_cameras_file(&path)?;
        }
        config.stop_grace = Duration::from_millis(env_parsed("STOP_GRACE_MS", 3_000u64)?);

        Ok(config)
    }
}

fn default_node_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("detection-node-{}", host)
}

fn env_parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("could not parse '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                reason: format!("could not parse '{}' as a boolean", raw),
            }),
        },
        Err(_) => Ok(default),
    }
}

fn normal_labels_from_env() -> HashSet<String> {
    let mut labels: HashSet<String> = match env::var("ALERT_NORMAL_LABELS") {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => AlertPolicy::default_normal_labels(),
    };
    // a blank label is never worth alerting on
    labels.insert(String::new());
    labels
}

fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
    if let (Ok(host), Ok(username), Ok(password), Ok(from)) = (
        env::var("SMTP_HOST"),
        env::var("SMTP_USERNAME"),
        env::var("SMTP_PASSWORD"),
        env::var("SMTP_FROM"),
    ) {
        let to: Vec<String> = env::var("ALERT_EMAIL_TO")
            .map_err(|_| ConfigError::Missing("ALERT_EMAIL_TO"))?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if to.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ALERT_EMAIL_TO",
                reason: "no recipients configured".to_string(),
            });
        }
        Ok(Some(SmtpConfig {
            host,
            port: env_parsed("SMTP_PORT", 587u16)?,
            username,
            password,
            from,
            to,
        }))
    } else {
        Ok(None)
    }
}

fn load_cameras_file(path: &str) -> Result<Vec<CameraConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
        key: "CAMERAS_FILE",
        reason: format!("{}: {}", path, e),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
        key: "CAMERAS_FILE",
        reason: format!("{}: {}", path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.alert_policy.validate().is_ok());
        assert_eq!(config.inference_interval, Duration::from_millis(1_500));
        assert_eq!(config.capture.fps, 15);
        assert!(config.stream.overlay);
    }

    #[test]
    fn test_env_parsed_rejects_garbage() {
        env::set_var("DETECTION_TEST_BOGUS_U32", "not-a-number");
        let parsed: Result<u32, _> = env_parsed("DETECTION_TEST_BOGUS_U32", 7);
        assert!(parsed.is_err());
        env::remove_var("DETECTION_TEST_BOGUS_U32");

        let parsed: Result<u32, _> = env_parsed("DETECTION_TEST_BOGUS_U32", 7);
        assert_eq!(parsed.unwrap(), 7);
    }

    #[test]
    fn test_normal_labels_always_include_blank() {
        env::set_var("ALERT_NORMAL_LABELS", "Normal, Walking ");
        let labels = normal_labels_from_env();
        env::remove_var("ALERT_NORMAL_LABELS");

        assert!(labels.contains("normal"));
        assert!(labels.contains("walking"));
        assert!(labels.contains(""));
        assert!(!labels.contains("assault"));
    }

    #[test]
    fn test_cameras_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "cam-1", "name": "Lobby", "source": {{"type": "test_pattern"}}}}]"#
        )
        .unwrap();

        let cameras = load_cameras_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].id, "cam-1");

        assert!(load_cameras_file("/nonexistent/cameras.json").is_err());
    }
}
