// 事件系統模組
//
// 本模組定義觸發規則、事件定義與排序語義、待處理事件緩衝，
// 以及回測展開與實盤推送兩種事件生產方式。

pub mod definition;
pub mod line;
pub mod producer;
pub mod rule;
pub mod types;

// 重新導出核心類型
pub use definition::{BarEventConfig, DefinitionId, EventDataKind, EventDefinition, TriggerKind};
pub use line::EventLine;
pub use producer::{
    EventProducer, EventSubscriber, MockedEventGenerator, MockedEventProducer, ProducerHandle,
};
pub use rule::{TimeRule, TimeRuleState};
pub use types::{Event, EventPayload};
