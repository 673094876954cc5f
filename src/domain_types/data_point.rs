use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bar 數據點結構
///
/// `visible_time` 是數據可見（發布）時間，`start_time` 是區間起點，兩者不同。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    /// 所屬數據源名稱
    pub feed: String,
    pub visible_time: DateTime<Utc>,
    pub code: String,
    pub start_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Tick 數據點結構
///
/// 合成 tick（由 bar 的開/收盤價衍生）以 `size = -1.0` 標記。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    /// 所屬數據源名稱
    pub feed: String,
    pub visible_time: DateTime<Utc>,
    pub code: String,
    pub price: f64,
    pub size: f64,
}

/// 某標的當前價格，每次更新整筆覆寫，不保留歷史
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub code: String,
    pub price: f64,
    /// 觀測時間
    pub time: DateTime<Utc>,
}

/// 時間序列數據，數據源推送與歷史查詢共用的載體
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TsData {
    Bar(Bar),
    Tick(Tick),
    /// 其他形狀的數據原樣傳遞
    Other {
        feed: String,
        visible_time: DateTime<Utc>,
        code: String,
        fields: serde_json::Value,
    },
}

impl TsData {
    /// 數據可見時間
    pub fn visible_time(&self) -> DateTime<Utc> {
        match self {
            TsData::Bar(bar) => bar.visible_time,
            TsData::Tick(tick) => tick.visible_time,
            TsData::Other { visible_time, .. } => *visible_time,
        }
    }

    /// 標的代碼
    pub fn code(&self) -> &str {
        match self {
            TsData::Bar(bar) => &bar.code,
            TsData::Tick(tick) => &tick.code,
            TsData::Other { code, .. } => code,
        }
    }

    /// 所屬數據源名稱
    pub fn feed(&self) -> &str {
        match self {
            TsData::Bar(bar) => &bar.feed,
            TsData::Tick(tick) => &tick.feed,
            TsData::Other { feed, .. } => feed,
        }
    }
}
