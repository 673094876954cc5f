// 待處理事件緩衝
//
// 回測驅動的工作佇列：批次插入後整體重排（穩定排序，同序事件保持
// 插入順序），嚴格由前往後消費。緩衝無上限，回測區間預先展開且有
// 界，可接受。

use crate::event::types::Event;

/// 時間有序的待處理事件緩衝
#[derive(Debug, Default)]
pub struct EventLine {
    events: Vec<Event>,
}

impl EventLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 批次插入並依事件全序重排
    pub fn insert_all(&mut self, events: Vec<Event>) {
        self.events.extend(events);
        self.events.sort_by(|a, b| a.cmp_order(b));
    }

    /// 取出並移除最早的事件，緩衝為空時回傳 None
    pub fn pop_front(&mut self) -> Option<Event> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
