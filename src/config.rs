// src/config.rs
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            other => Err(format!("unknown provider `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    /// Credential for the selected provider. Missing keys surface as a
    /// configuration error on the first analysis, not at startup.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: Option<String>,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub jpeg_quality: u8,
    pub extra_fabrics: Vec<String>,
    pub bind_addr: String,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = match get("METHEU_PROVIDER") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{e}; falling back to gemini");
                Provider::Gemini
            }),
            None => Provider::Gemini,
        };

        let api_key = match provider {
            Provider::Gemini => get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            Provider::OpenAi => get("OPENAI_API_KEY"),
        };

        let model = get("METHEU_MODEL").unwrap_or_else(|| {
            match provider {
                Provider::Gemini => DEFAULT_GEMINI_MODEL,
                Provider::OpenAi => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        });

        let timeout_secs: u64 = parse_or(get("METHEU_TIMEOUT_SECS"), "METHEU_TIMEOUT_SECS", 60);
        let max_upload_mb: usize = parse_or(get("METHEU_MAX_UPLOAD_MB"), "METHEU_MAX_UPLOAD_MB", 10);
        let jpeg_quality: u8 = parse_or(get("METHEU_JPEG_QUALITY"), "METHEU_JPEG_QUALITY", 90);

        let extra_fabrics = get("METHEU_EXTRA_FABRICS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            provider,
            api_key,
            model,
            api_base: get("METHEU_API_BASE").map(|b| b.trim_end_matches('/').to_string()),
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            max_upload_bytes: max_upload_mb.max(1) * 1024 * 1024,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            extra_fabrics,
            bind_addr: get("METHEU_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            static_dir: get("METHEU_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {key}={value}, using {default}");
            default
        }),
        None => default,
    }
}
