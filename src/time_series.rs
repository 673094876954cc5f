//! Time-series repository and feed seam
//!
//! The engine never owns market-data storage or live delivery; it consumes
//! feeds through these traits. A feed is looked up by name, answers bulk
//! historical queries keyed by (visible time, code), and delivers live
//! arrivals to registered listeners on whatever threads the transport owns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain_types::TsData;

/// 歷史數據查詢命令
#[derive(Debug, Clone)]
pub struct HistoryDataQueryCommand {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub codes: Vec<String>,
}

impl HistoryDataQueryCommand {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, codes: Vec<String>) -> Self {
        Self { start, end, codes }
    }
}

/// 歷史資料列的形狀相關欄位
///
/// 儲存層若以 `date` 欄位表示 bar 的區間起點，須在回傳前正規化為
/// `start_time`。
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryColumns {
    Bar {
        start_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    },
    Tick {
        price: f64,
        size: f64,
    },
    Other(serde_json::Value),
}

impl HistoryColumns {
    /// 形狀名稱，用於錯誤訊息
    pub fn shape_name(&self) -> &'static str {
        match self {
            HistoryColumns::Bar { .. } => "bar",
            HistoryColumns::Tick { .. } => "tick",
            HistoryColumns::Other(_) => "other",
        }
    }
}

/// 歷史資料列，以 (visible_time, code) 為鍵
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub visible_time: DateTime<Utc>,
    pub code: String,
    pub columns: HistoryColumns,
}

/// 即時數據監聽器，由外部數據源在其自己的線程上回調
pub trait TsDataListener: Send + Sync {
    fn on_data(&self, data: TsData);
}

/// 時間序列介面
#[async_trait]
pub trait TimeSeries: Send + Sync {
    /// 數據源名稱
    fn name(&self) -> &str;

    /// 查詢區間內的歷史資料列
    async fn history_data(
        &self,
        command: &HistoryDataQueryCommand,
    ) -> anyhow::Result<Vec<HistoryRow>>;

    /// 訂閱指定標的的即時推送
    fn subscribe(&self, listener: Arc<dyn TsDataListener>, codes: &[String]) -> anyhow::Result<()>;
}

/// 時間序列儲存庫，依名稱查找數據源
pub trait TimeSeriesRepo: Send + Sync {
    fn find_one(&self, name: &str) -> Option<Arc<dyn TimeSeries>>;
}

/// 以名稱映射實現的儲存庫，供測試與嵌入方組裝數據源
#[derive(Default)]
pub struct MapTimeSeriesRepo {
    feeds: HashMap<String, Arc<dyn TimeSeries>>,
}

impl MapTimeSeriesRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// 註冊一個數據源，以其名稱為鍵
    pub fn insert(&mut self, feed: Arc<dyn TimeSeries>) {
        self.feeds.insert(feed.name().to_string(), feed);
    }
}

impl TimeSeriesRepo for MapTimeSeriesRepo {
    fn find_one(&self, name: &str) -> Option<Arc<dyn TimeSeries>> {
        self.feeds.get(name).cloned()
    }
}
