//! Trading calendar seam
//!
//! The engine consumes the calendar as an opaque service: the next open or
//! close after an instant, plus bulk open/close schedules for a range.
//! `StaticCalendar` is the session-table implementation used by tests and
//! by embedders that load exchange schedules from elsewhere.
//!
//! Convention inherited from the upstream schedule data: a stored "open"
//! instant is one minute *after* the session actually opens. Time-rule
//! arithmetic corrects for this (see `event::rule`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 交易日曆介面
pub trait TradingCalendar: Send + Sync {
    /// 嚴格在 `t` 之後的下一個開盤時間（含上述一分鐘慣例）
    fn next_open(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// 嚴格在 `t` 之後的下一個收盤時間
    fn next_close(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// 區間 `[start, end]` 內的所有開盤時間（昇冪）
    fn opens_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>>;

    /// 區間 `[start, end]` 內的所有收盤時間（昇冪）
    fn closes_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>>;
}

/// 單一交易時段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 開盤時間（開盤後一分鐘，見模組說明）
    pub open: DateTime<Utc>,
    /// 收盤時間
    pub close: DateTime<Utc>,
}

/// 以時段表驅動的交易日曆
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    sessions: Vec<Session>,
}

impl StaticCalendar {
    /// 以時段列表建立日曆，時段會依開盤時間排序
    pub fn new(mut sessions: Vec<Session>) -> Self {
        sessions.sort_by_key(|s| s.open);
        Self { sessions }
    }

    /// 時段數量
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// 是否沒有任何時段
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl TradingCalendar for StaticCalendar {
    fn next_open(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.sessions.iter().map(|s| s.open).find(|open| *open > t)
    }

    fn next_close(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.sessions
            .iter()
            .map(|s| s.close)
            .find(|close| *close > t)
    }

    fn opens_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.sessions
            .iter()
            .map(|s| s.open)
            .filter(|open| *open >= start && *open <= end)
            .collect()
    }

    fn closes_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.sessions
            .iter()
            .map(|s| s.close)
            .filter(|close| *close >= start && *close <= end)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(day: u32, open_h: u32, close_h: u32) -> Session {
        Session {
            open: Utc.with_ymd_and_hms(2023, 1, day, open_h, 31, 0).unwrap(),
            close: Utc.with_ymd_and_hms(2023, 1, day, close_h, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_next_open_is_strictly_after() {
        let cal = StaticCalendar::new(vec![session(2, 9, 16), session(3, 9, 16)]);
        let day2_open = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();

        let before = Utc.with_ymd_and_hms(2023, 1, 2, 8, 0, 0).unwrap();
        assert_eq!(cal.next_open(before), Some(day2_open));

        // 查詢時間恰為開盤時間時必須回傳下一個時段
        let day3_open = Utc.with_ymd_and_hms(2023, 1, 3, 9, 31, 0).unwrap();
        assert_eq!(cal.next_open(day2_open), Some(day3_open));
    }

    #[test]
    fn test_schedule_exhausted() {
        let cal = StaticCalendar::new(vec![session(2, 9, 16)]);
        let late = Utc.with_ymd_and_hms(2023, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(cal.next_open(late), None);
        assert_eq!(cal.next_close(late), None);
    }

    #[test]
    fn test_range_queries_are_inclusive() {
        let cal = StaticCalendar::new(vec![session(2, 9, 16), session(3, 9, 16)]);
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 3, 9, 31, 0).unwrap();
        assert_eq!(cal.opens_between(start, end).len(), 2);
        assert_eq!(cal.closes_between(start, end).len(), 1);
    }
}
