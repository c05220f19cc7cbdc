use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/** \brief 默认配置文件名（当前工作目录下）。 */
pub const DEFAULT_CONFIG_FILE: &str = "kurumi.toml";

pub const ENV_API_KEY: &str = "KURUMI_API_KEY";
pub const ENV_API_BASE: &str = "KURUMI_API_BASE";
pub const ENV_MODEL: &str = "KURUMI_MODEL";
pub const ENV_SITE_BASE: &str = "KURUMI_SITE_BASE";

/**
 * \brief 聊天补全中继配置：端点、密钥、窗口大小与采样参数。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /** \brief API 基地址，请求路径为 {base_url}/chat/completions */
    #[serde(default = "default_relay_base")]
    pub base_url: String,
    /** \brief Bearer 密钥，不写入源码，由配置文件或环境变量提供 */
    #[serde(default)]
    pub api_key: String,
    /** \brief 远端模型名 */
    #[serde(default = "default_model")]
    pub model: String,
    /** \brief 历史窗口条数 */
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /** \brief 回复长度上限（token） */
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /** \brief 单次请求超时（秒） */
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/**
 * \brief 角色站点后端（图片墙、书架）配置。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_base")]
    pub base_url: String,
    /** \brief 上传书籍时默认归属的角色 */
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/**
 * \brief 应用总配置。
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_relay_base() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_window_size() -> usize {
    20
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    300
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_site_base() -> String {
    "http://localhost:3000".to_string()
}

fn default_role() -> String {
    "kurumi".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_base(),
            api_key: String::new(),
            model: default_model(),
            window_size: default_window_size(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_base(),
            default_role: default_role(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

impl RelayConfig {
    /**
     * \brief 指向指定端点的配置，其余取默认值；便于对接本地或 mock 服务。
     */
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /**
     * \brief 校验取值范围。api_key 为空不在此处报错，发请求前再检查。
     */
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.base_url.trim().is_empty() {
            return Err(RelayError::Config("relay.base_url 不能为空".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(RelayError::Config("relay.model 不能为空".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RelayError::Config(format!(
                "relay.temperature 超出范围 [0, 2]: {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(RelayError::Config(format!(
                "relay.top_p 超出范围 (0, 1]: {}",
                self.top_p
            )));
        }
        if self.max_tokens == 0 {
            return Err(RelayError::Config("relay.max_tokens 必须大于 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(RelayError::Config("relay.timeout_secs 必须大于 0".to_string()));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl AppConfig {
    /**
     * \brief 从 TOML 文件读取配置。
     */
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file failed: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("parse config file failed: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /**
     * \brief 按“默认值 → 配置文件 → 环境变量”的顺序解析配置并校验。
     * \param path 显式指定的配置文件；为空时尝试当前目录下的 kurumi.toml
     */
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.relay.validate()?;
        Ok(config)
    }

    /**
     * \brief 用环境变量覆盖端点与密钥；空值视为未设置。
     */
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_API_KEY) {
            self.relay.api_key = v;
        }
        if let Some(v) = get(ENV_API_BASE) {
            self.relay.base_url = v;
        }
        if let Some(v) = get(ENV_MODEL) {
            self.relay.model = v;
        }
        if let Some(v) = get(ENV_SITE_BASE) {
            self.site.base_url = v;
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("serialize config failed")?;
        std::fs::write(path, content)
            .with_context(|| format!("write config file failed: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_original_generation_parameters() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.window_size, 20);
        assert_eq!(cfg.temperature, 0.7);
        assert_eq!(cfg.top_p, 0.9);
        assert_eq!(cfg.max_tokens, 300);
        assert_eq!(cfg.model, "deepseek-chat");
        assert!(cfg.api_key.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [relay]
            api_key = "sk-test"
            window_size = 8

            [telemetry]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.relay.api_key, "sk-test");
        assert_eq!(cfg.relay.window_size, 8);
        assert_eq!(cfg.relay.max_tokens, 300);
        assert_eq!(cfg.site.default_role, "kurumi");
        assert!(cfg.telemetry.enabled);
        assert_eq!(cfg.telemetry.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn env_overrides_replace_non_empty_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "sk-env"),
            (ENV_API_BASE, "http://127.0.0.1:9000/v1"),
            (ENV_MODEL, "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.relay.api_key, "sk-env");
        assert_eq!(cfg.relay.base_url, "http://127.0.0.1:9000/v1");
        assert_eq!(cfg.relay.model, "deepseek-chat");
        assert_eq!(cfg.site.base_url, "http://localhost:3000");
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = RelayConfig::default();
        cfg.temperature = 2.5;
        assert!(matches!(cfg.validate(), Err(RelayError::Config(_))));

        let mut cfg = RelayConfig::default();
        cfg.top_p = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.max_tokens = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.base_url = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kurumi.toml");
        let mut cfg = AppConfig::default();
        cfg.relay.window_size = 5;
        cfg.save_to_file(&path).unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.relay.window_size, 5);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let cfg = RelayConfig::new("https://api.deepseek.com/v1/", "k");
        assert_eq!(
            cfg.endpoint("chat/completions"),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }
}
