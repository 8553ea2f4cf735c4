//! Worker configuration from environment variables.
//!
//! - `REDIS_URL`: Redis connection string (default: redis://127.0.0.1/)
//! - `STORE_KEY_PREFIX`: key namespace for document records (default: render)
//! - `WORKER_CONCURRENCY`: number of concurrent workers (default: 16)
//! - `QUEUE_CAPACITY`: jobs buffered before submitters wait (default: 64)
//! - `RENDER_TIMEOUT_SECS`: per-render time limit (default: 60)
//! - `RENDERER`: `html` (headless Chromium) or `svg` (svg2pdf) (default: html)
//! - `CHROMIUM_PATH`: browser binary used by the html renderer (default: chromium)

use crate::chromium::DEFAULT_CHROMIUM_PATH;
use crate::error::ConfigError;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_KEY_PREFIX: &str = "render";
pub const DEFAULT_POOL_SIZE: usize = 16;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

/// Which `Renderer` the service binary runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RendererKind {
    #[default]
    Html,
    Svg,
}

impl FromStr for RendererKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "chromium" => Ok(Self::Html),
            "svg" => Ok(Self::Svg),
            _ => Err(ConfigError::UnknownRenderer(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub render_timeout: Duration,
    pub renderer: RendererKind,
    pub chromium_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            renderer: RendererKind::default(),
            chromium_path: PathBuf::from(DEFAULT_CHROMIUM_PATH),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: lookup("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            pool_size: positive(&lookup, "WORKER_CONCURRENCY", DEFAULT_POOL_SIZE as u64)? as usize,
            queue_capacity: positive(&lookup, "QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY as u64)?
                as usize,
            render_timeout: Duration::from_secs(positive(
                &lookup,
                "RENDER_TIMEOUT_SECS",
                DEFAULT_RENDER_TIMEOUT_SECS,
            )?),
            renderer: match lookup("RENDERER") {
                Some(value) => value.parse()?,
                None => defaults.renderer,
            },
            chromium_path: lookup("CHROMIUM_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.chromium_path),
        })
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.redis_url, "redis://127.0.0.1/");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REDIS_URL", "redis://cache:6379/2"),
            ("STORE_KEY_PREFIX", "pdf"),
            ("WORKER_CONCURRENCY", "4"),
            ("QUEUE_CAPACITY", " 10 "),
            ("RENDER_TIMEOUT_SECS", "5"),
            ("RENDERER", "SVG"),
            ("CHROMIUM_PATH", "/usr/bin/google-chrome"),
        ])
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6379/2");
        assert_eq!(config.key_prefix, "pdf");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.render_timeout, Duration::from_secs(5));
        assert_eq!(config.renderer, RendererKind::Svg);
        assert_eq!(config.chromium_path, PathBuf::from("/usr/bin/google-chrome"));
    }

    #[test]
    fn test_renderer_selection() {
        assert_eq!(config_from(&[]).unwrap().renderer, RendererKind::Html);
        assert_eq!(
            config_from(&[("RENDERER", "png")]),
            Err(ConfigError::UnknownRenderer("png".to_string()))
        );
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        assert_eq!(
            config_from(&[("WORKER_CONCURRENCY", "0")]),
            Err(ConfigError::InvalidNumber {
                name: "WORKER_CONCURRENCY",
                value: "0".to_string(),
            })
        );
        assert!(config_from(&[("QUEUE_CAPACITY", "lots")]).is_err());
    }
}
