// 事件
//
// 一次具體的觸發：哪個定義、何時可見、帶什麼負載。事件不可變，
// 全序為 (可見時間, 數據先於時間, tie-break 順位)。負載含浮點欄位，
// 因此不實作 Ord，排序一律走 `cmp_order` 比較器。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain_types::TsData;
use crate::event::definition::EventDefinition;

/// 事件負載
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// 時間事件的空負載
    Empty,
    /// 數據事件的負載
    Data(TsData),
}

/// 一次事件發生
#[derive(Debug, Clone)]
pub struct Event {
    pub definition: Arc<EventDefinition>,
    pub visible_time: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(
        definition: Arc<EventDefinition>,
        visible_time: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            definition,
            visible_time,
            payload,
        }
    }

    /// 空負載事件（時間觸發）
    pub fn empty(definition: Arc<EventDefinition>, visible_time: DateTime<Utc>) -> Self {
        Self::new(definition, visible_time, EventPayload::Empty)
    }

    /// 事件全序比較器
    pub fn cmp_order(&self, other: &Event) -> std::cmp::Ordering {
        self.visible_time
            .cmp(&other.visible_time)
            .then_with(|| self.definition.compare(&other.definition))
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Event] definition: {}, visible_time: {}, payload: {:?}",
            self.definition.id(),
            self.visible_time,
            self.payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::definition::{EventDataKind, EventDefinition};
    use crate::event::rule::TimeRule;
    use chrono::TimeZone;
    use std::cmp::Ordering;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 2, 9, minute, 0).unwrap()
    }

    #[test]
    fn test_earlier_visible_time_wins() {
        let ed = Arc::new(EventDefinition::time(TimeRule::market_close(0, 0)));
        let e1 = Event::empty(ed.clone(), at(31));
        let e2 = Event::empty(ed, at(32));
        assert_eq!(e1.cmp_order(&e2), Ordering::Less);
    }

    #[test]
    fn test_data_beats_time_on_tie() {
        let time_ed = Arc::new(EventDefinition::time(TimeRule::market_close(0, 0)));
        let data_ed = Arc::new(EventDefinition::data("min_bar", EventDataKind::Bar, None, 0));

        let time_event = Event::empty(time_ed, at(31));
        let data_event = Event::empty(data_ed, at(31));
        assert_eq!(data_event.cmp_order(&time_event), Ordering::Less);
    }

    #[test]
    fn test_same_kind_tie_breaks_by_order() {
        let high = Arc::new(EventDefinition::data("a", EventDataKind::Bar, None, -100));
        let low = Arc::new(EventDefinition::data("b", EventDataKind::Bar, None, -10));
        let e_high = Event::empty(high, at(31));
        let e_low = Event::empty(low, at(31));
        assert_eq!(e_high.cmp_order(&e_low), Ordering::Less);
    }
}
