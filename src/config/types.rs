use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證各個部分的配置
        self.engine.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 實盤時間規則輪詢週期（秒）
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 等待最新價格的最大嘗試次數
    #[serde(default = "default_price_retry_limit")]
    pub price_retry_limit: u32,
    /// 等待最新價格的重試間隔（秒）
    #[serde(default = "default_price_retry_interval_secs")]
    pub price_retry_interval_secs: u64,
    /// 實盤當前價格訂閱的數據源名稱
    #[serde(default = "default_live_price_feed")]
    pub live_price_feed: String,
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_price_retry_limit() -> u32 {
    20
}

fn default_price_retry_interval_secs() -> u64 {
    1
}

fn default_live_price_feed() -> String {
    "tick".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            price_retry_limit: default_price_retry_limit(),
            price_retry_interval_secs: default_price_retry_interval_secs(),
            live_price_feed: default_live_price_feed(),
        }
    }
}

impl EngineConfig {
    /// 獲取輪詢週期持續時間
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// 獲取價格重試間隔持續時間
    pub fn price_retry_interval(&self) -> Duration {
        Duration::from_secs(self.price_retry_interval_secs)
    }
}

impl Validator for EngineConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證引擎配置
        ValidationUtils::in_range(self.poll_interval_secs, 1, 3600, "engine.poll_interval_secs")?;
        ValidationUtils::in_range(self.price_retry_limit, 1, 1000, "engine.price_retry_limit")?;
        ValidationUtils::not_empty(&self.live_price_feed, "engine.live_price_feed")?;

        Ok(())
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證日誌級別
        ValidationUtils::one_of(
            &self.level.to_lowercase(),
            &["trace", "debug", "info", "warn", "error"]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>(),
            "log.level",
        )?;

        // 驗證日誌格式
        ValidationUtils::one_of(
            &self.format.to_lowercase(),
            &["pretty", "json"]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>(),
            "log.format",
        )?;

        Ok(())
    }
}
