// 事件定義
//
// 一個已註冊的觸發源：時間規則或具名數據源，加上排序用的 tie-break
// 欄位。定義建構後不可變，並在建構時取得穩定的生成 id，註冊表以 id
// 為鍵，不依賴引用相等性。

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::event::rule::TimeRule;

/// 事件定義的穩定識別碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionId(Uuid);

impl DefinitionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 觸發源類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Time,
    Data,
}

/// 數據事件的形狀標記
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventDataKind {
    Bar,
    Tick,
    Other,
}

/// Bar 事件轉合成 tick 的配置
///
/// `market_open_as_tick` 與 `bar_open_as_tick` 描述的是同一個 bar 開盤
/// 時點，兩者互斥，建構時檢查；`market_close_as_tick` 描述收盤時點，
/// 可與任一開盤旗標並用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarEventConfig {
    pub market_open_as_tick: bool,
    pub market_open_as_tick_delta: Duration,
    pub bar_open_as_tick: bool,
    pub bar_open_as_tick_delta: Duration,
    pub market_close_as_tick: bool,
    pub market_close_as_tick_delta: Duration,
}

impl Default for BarEventConfig {
    fn default() -> Self {
        Self {
            market_open_as_tick: false,
            market_open_as_tick_delta: Duration::zero(),
            bar_open_as_tick: false,
            bar_open_as_tick_delta: Duration::zero(),
            market_close_as_tick: false,
            market_close_as_tick_delta: Duration::zero(),
        }
    }
}

impl BarEventConfig {
    pub fn new(
        market_open_as_tick: bool,
        market_open_as_tick_delta: Duration,
        bar_open_as_tick: bool,
        bar_open_as_tick_delta: Duration,
        market_close_as_tick: bool,
        market_close_as_tick_delta: Duration,
    ) -> EngineResult<Self> {
        if market_open_as_tick && bar_open_as_tick {
            return Err(EngineError::ConflictingBarConfig);
        }
        Ok(Self {
            market_open_as_tick,
            market_open_as_tick_delta,
            bar_open_as_tick,
            bar_open_as_tick_delta,
            market_close_as_tick,
            market_close_as_tick_delta,
        })
    }

    /// 只開啟 market_open_as_tick，偏移為零
    pub fn market_open_only() -> Self {
        Self {
            market_open_as_tick: true,
            ..Self::default()
        }
    }
}

/// 事件定義
#[derive(Debug, Clone)]
pub struct EventDefinition {
    id: DefinitionId,
    trigger_kind: TriggerKind,
    time_rule: Option<TimeRule>,
    feed: Option<String>,
    data_kind: Option<EventDataKind>,
    bar_config: Option<BarEventConfig>,
    order: i32,
}

impl EventDefinition {
    /// 時間觸發定義，tie-break 順位為 0
    pub fn time(rule: TimeRule) -> Self {
        Self::time_with_order(rule, 0)
    }

    /// 時間觸發定義，指定 tie-break 順位
    pub fn time_with_order(rule: TimeRule, order: i32) -> Self {
        Self {
            id: DefinitionId::generate(),
            trigger_kind: TriggerKind::Time,
            time_rule: Some(rule),
            feed: None,
            data_kind: None,
            bar_config: None,
            order,
        }
    }

    /// 數據觸發定義
    pub fn data(
        feed: impl Into<String>,
        data_kind: EventDataKind,
        bar_config: Option<BarEventConfig>,
        order: i32,
    ) -> Self {
        Self {
            id: DefinitionId::generate(),
            trigger_kind: TriggerKind::Data,
            time_rule: None,
            feed: Some(feed.into()),
            data_kind: Some(data_kind),
            bar_config,
            order,
        }
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger_kind
    }

    pub fn time_rule(&self) -> Option<&TimeRule> {
        self.time_rule.as_ref()
    }

    /// 時間規則，缺失時回報不完整定義
    pub fn require_time_rule(&self) -> EngineResult<&TimeRule> {
        self.time_rule
            .as_ref()
            .ok_or(EngineError::IncompleteDefinition("時間觸發定義缺少規則"))
    }

    pub fn feed(&self) -> Option<&str> {
        self.feed.as_deref()
    }

    /// 數據源名稱，缺失時回報不完整定義
    pub fn require_feed(&self) -> EngineResult<&str> {
        self.feed
            .as_deref()
            .ok_or(EngineError::IncompleteDefinition("數據觸發定義缺少數據源"))
    }

    pub fn data_kind(&self) -> Option<EventDataKind> {
        self.data_kind
    }

    pub fn bar_config(&self) -> BarEventConfig {
        self.bar_config.unwrap_or_default()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// 同時刻事件的決勝比較：同類型比 tie-break 順位，不同類型時
    /// 數據事件恆先於時間事件
    pub fn compare(&self, other: &EventDefinition) -> std::cmp::Ordering {
        self.kind_rank()
            .cmp(&other.kind_rank())
            .then_with(|| self.order.cmp(&other.order))
    }

    /// 排序用的類型位階：數據在前
    fn kind_rank(&self) -> u8 {
        match self.trigger_kind {
            TriggerKind::Data => 0,
            TriggerKind::Time => 1,
        }
    }
}
