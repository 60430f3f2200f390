use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use reqwest::Url;

use crate::endpoint::{EndpointConfig, Tier};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub log_dir: PathBuf,
    pub camera_back_device: Option<String>,
    pub camera_front_device: Option<String>,
    pub camera_input_format: String,
    pub capture_width: u32,
    pub capture_height: u32,
    pub first_frame_timeout: Duration,
    pub primary_analyze_url: Url,
    pub primary_health_url: Url,
    pub fallback_analyze_url: Url,
    pub fallback_health_url: Url,
    pub primary_probe_timeout: Duration,
    pub fallback_probe_timeout: Duration,
    pub analyze_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "QuizCam".to_owned());
        let log_dir = PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_owned()));

        let camera_back_device = Some(
            env::var("CAMERA_BACK_DEVICE").unwrap_or_else(|_| "/dev/video0".to_owned()),
        )
        .filter(|value| !value.trim().is_empty());
        let camera_front_device = non_empty("CAMERA_FRONT_DEVICE");
        let camera_input_format =
            env::var("CAMERA_INPUT_FORMAT").unwrap_or_else(|_| "mjpeg".to_owned());
        let capture_width = number("CAPTURE_WIDTH", 640);
        let capture_height = number("CAPTURE_HEIGHT", 480);
        let first_frame_timeout =
            Duration::from_millis(number("CAMERA_FIRST_FRAME_TIMEOUT_MS", 5000));

        let primary_analyze_url = url("PRIMARY_ANALYZE_URL", "http://localhost:8080/api/quiz")?;
        let primary_health_url = url("PRIMARY_HEALTH_URL", "http://localhost:8080/health")?;
        let fallback_analyze_url = url("FALLBACK_ANALYZE_URL", "http://localhost:5000/api/quiz")?;
        let fallback_health_url = url("FALLBACK_HEALTH_URL", "http://localhost:5000/health")?;
        let primary_probe_timeout =
            Duration::from_millis(number("PRIMARY_PROBE_TIMEOUT_MS", 5000));
        let fallback_probe_timeout =
            Duration::from_millis(number("FALLBACK_PROBE_TIMEOUT_MS", 3000));
        let analyze_timeout = Duration::from_secs(number("ANALYZE_TIMEOUT_SECONDS", 30));

        Ok(Self {
            app_name,
            log_dir,
            camera_back_device,
            camera_front_device,
            camera_input_format,
            capture_width,
            capture_height,
            first_frame_timeout,
            primary_analyze_url,
            primary_health_url,
            fallback_analyze_url,
            fallback_health_url,
            primary_probe_timeout,
            fallback_probe_timeout,
            analyze_timeout,
        })
    }

    /// Candidate endpoints in probe order.
    pub fn endpoints(&self) -> Vec<EndpointConfig> {
        vec![
            EndpointConfig {
                analyze_url: self.primary_analyze_url.clone(),
                health_url: self.primary_health_url.clone(),
                tier: Tier::Primary,
            },
            EndpointConfig {
                analyze_url: self.fallback_analyze_url.clone(),
                health_url: self.fallback_health_url.clone(),
                tier: Tier::Fallback,
            },
        ]
    }

    pub fn probe_timeout(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Primary => self.primary_probe_timeout,
            Tier::Fallback => self.fallback_probe_timeout,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn url(key: &str, default: &str) -> Result<Url> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_owned());
    Url::parse(raw.trim()).with_context(|| format!("{key} is not a valid url: {raw}"))
}
