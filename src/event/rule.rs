// 時間規則
//
// 相對於交易日曆的觸發條件（開盤/收盤 ± 分秒偏移）。規則本身是純
// 數據，`next_trigger` 是純計算；「上次算出的下一個觸發時間」由
// `TimeRuleState` 在規則之外持有，展開循環與輪詢任務各自擁有自己的
// 狀態表。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::error::{EngineError, EngineResult};

/// 日曆相對時間規則
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRule {
    /// 相對下一個開盤時間的偏移
    MarketOpen { minute_offset: i64, second_offset: i64 },
    /// 相對下一個收盤時間的偏移
    MarketClose { minute_offset: i64, second_offset: i64 },
}

impl TimeRule {
    pub fn market_open(minute_offset: i64, second_offset: i64) -> Self {
        TimeRule::MarketOpen {
            minute_offset,
            second_offset,
        }
    }

    pub fn market_close(minute_offset: i64, second_offset: i64) -> Self {
        TimeRule::MarketClose {
            minute_offset,
            second_offset,
        }
    }

    /// 秒級偏移（回測展開前會檢查必須為零）
    pub fn second_offset(&self) -> i64 {
        match self {
            TimeRule::MarketOpen { second_offset, .. }
            | TimeRule::MarketClose { second_offset, .. } => *second_offset,
        }
    }

    /// 計算嚴格在 `now` 之後的下一個觸發時間
    ///
    /// 開盤變體因日曆的「開盤時間」慣例是實際開盤後一分鐘，需先做
    /// 負一分鐘修正；收盤變體直接以偏移平移。偏移後的時間若不在
    /// `now` 之後（例如大幅負偏移、查詢時間已在盤前），則跳到再下
    /// 一個時段套用同樣偏移，保證觸發時間單調遞增。
    pub fn next_trigger(
        &self,
        calendar: &dyn TradingCalendar,
        now: DateTime<Utc>,
    ) -> EngineResult<DateTime<Utc>> {
        match *self {
            TimeRule::MarketOpen {
                minute_offset,
                second_offset,
            } => {
                let shift = Duration::minutes(minute_offset - 1) + Duration::seconds(second_offset);
                let open = calendar
                    .next_open(now)
                    .ok_or_else(|| EngineError::Calendar(format!("{} 之後沒有開盤時間", now)))?;
                let dt = open + shift;
                if dt <= now {
                    let following = calendar.next_open(open).ok_or_else(|| {
                        EngineError::Calendar(format!("{} 之後沒有開盤時間", open))
                    })?;
                    Ok(following + shift)
                } else {
                    Ok(dt)
                }
            }
            TimeRule::MarketClose {
                minute_offset,
                second_offset,
            } => {
                let shift = Duration::minutes(minute_offset) + Duration::seconds(second_offset);
                let close = calendar
                    .next_close(now)
                    .ok_or_else(|| EngineError::Calendar(format!("{} 之後沒有收盤時間", now)))?;
                let dt = close + shift;
                if dt <= now {
                    let following = calendar.next_close(close).ok_or_else(|| {
                        EngineError::Calendar(format!("{} 之後沒有收盤時間", close))
                    })?;
                    Ok(following + shift)
                } else {
                    Ok(dt)
                }
            }
        }
    }
}

/// 時間規則的評估狀態：快取的下一個觸發時間
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRuleState {
    next_time: Option<DateTime<Utc>>,
}

impl TimeRuleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `now` 到達或越過快取的觸發時間時回傳 true，並重新計算快取為
    /// 剛觸發時間之後的下一個觸發時間；首次呼叫惰性初始化。
    ///
    /// `now` 未前進時重複呼叫恆為 false 且不改變快取。
    pub fn evaluate(
        &mut self,
        rule: &TimeRule,
        calendar: &dyn TradingCalendar,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let next_time = match self.next_time {
            Some(t) => t,
            None => {
                let t = rule.next_trigger(calendar, now)?;
                self.next_time = Some(t);
                t
            }
        };

        if now >= next_time {
            self.next_time = Some(rule.next_trigger(calendar, now)?);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 目前快取的下一個觸發時間
    pub fn next_time(&self) -> Option<DateTime<Utc>> {
        self.next_time
    }
}
