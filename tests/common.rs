#![allow(dead_code)]
//! 集成測試共用工具：腳本化數據源、記錄型策略與兩日測試日曆

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use trading_engine::account::MemoryAccountRepo;
use trading_engine::calendar::{Session, StaticCalendar};
use trading_engine::config::EngineConfig;
use trading_engine::data_portal::DataPortal;
use trading_engine::domain_types::{Scope, TsData};
use trading_engine::engine::{Engine, Strategy};
use trading_engine::error::EngineResult;
use trading_engine::event::{BarEventConfig, Event, EventDataKind, EventDefinition};
use trading_engine::time_series::{
    HistoryColumns, HistoryDataQueryCommand, HistoryRow, MapTimeSeriesRepo, TimeSeries,
    TimeSeriesRepo, TsDataListener,
};

/// 2023-01 指定日期的時間點
pub fn at(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, day, hour, minute, second)
        .unwrap()
}

/// 單日交易時段：實際開盤 9:30（時段表依慣例記 9:31），收盤 9:33
pub fn session(day: u32) -> Session {
    Session {
        open: at(day, 9, 31, 0),
        close: at(day, 9, 33, 0),
    }
}

/// 1/2 與 1/3 兩個交易時段的測試日曆
///
/// 附帶 1/4 備用時段：規則觸發後會重算下一個觸發時間，日曆必須
/// 延伸到測試區間之後。
pub fn two_day_calendar() -> Arc<StaticCalendar> {
    Arc::new(StaticCalendar::new(vec![
        session(2),
        session(3),
        session(4),
    ]))
}

pub fn scope(codes: &[&str]) -> Scope {
    Scope::new(
        codes.iter().map(|s| s.to_string()).collect(),
        two_day_calendar(),
    )
}

/// 一根分鐘 bar 的歷史資料列，可見時間為該分鐘結束
pub fn bar_row(code: &str, day: u32, minute: u32, close: f64) -> HistoryRow {
    let visible_time = at(day, 9, minute, 0);
    HistoryRow {
        visible_time,
        code: code.to_string(),
        columns: HistoryColumns::Bar {
            start_time: visible_time - Duration::minutes(1),
            open: close - 0.5,
            high: close + 0.5,
            low: close - 1.0,
            close,
            volume: 100.0,
        },
    }
}

/// 一個交易時段的三根分鐘 bar（可見時間 9:31 到 9:33）
pub fn day_bars(code: &str, day: u32, base_close: f64) -> Vec<HistoryRow> {
    (31..=33)
        .map(|minute| bar_row(code, day, minute, base_close + (minute - 30) as f64))
        .collect()
}

/// 以記憶體資料列驅動的腳本化數據源，push 可模擬即時推送
pub struct MemoryTimeSeries {
    name: String,
    rows: Vec<HistoryRow>,
    listeners: Mutex<Vec<Arc<dyn TsDataListener>>>,
}

impl MemoryTimeSeries {
    pub fn new(name: impl Into<String>, rows: Vec<HistoryRow>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rows,
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// 對所有訂閱者同步推送一筆數據
    pub fn push(&self, data: TsData) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.on_data(data.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

#[async_trait]
impl TimeSeries for MemoryTimeSeries {
    fn name(&self) -> &str {
        &self.name
    }

    async fn history_data(
        &self,
        command: &HistoryDataQueryCommand,
    ) -> anyhow::Result<Vec<HistoryRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                row.visible_time >= command.start
                    && row.visible_time <= command.end
                    && command.codes.contains(&row.code)
            })
            .cloned()
            .collect())
    }

    fn subscribe(
        &self,
        listener: Arc<dyn TsDataListener>,
        _codes: &[String],
    ) -> anyhow::Result<()> {
        self.listeners.lock().unwrap().push(listener);
        Ok(())
    }
}

/// 建立帶指定數據源的引擎與帳戶儲存庫
pub fn engine_with(feeds: Vec<Arc<dyn TimeSeries>>) -> (Engine, Arc<MemoryAccountRepo>) {
    let mut ts_repo = MapTimeSeriesRepo::new();
    for feed in feeds {
        ts_repo.insert(feed);
    }
    let ts_repo: Arc<dyn TimeSeriesRepo> = Arc::new(ts_repo);
    let account_repo = Arc::new(MemoryAccountRepo::new());
    let engine = Engine::new(ts_repo, account_repo.clone(), EngineConfig::default());
    (engine, account_repo)
}

/// 註冊單一數據定義並記錄所有分發到的事件的策略
pub struct RecordingStrategy {
    scope: Scope,
    feed: String,
    data_kind: EventDataKind,
    bar_config: Option<BarEventConfig>,
    seen: Arc<Mutex<Vec<Event>>>,
}

impl RecordingStrategy {
    pub fn new(
        scope: Scope,
        feed: impl Into<String>,
        data_kind: EventDataKind,
        bar_config: Option<BarEventConfig>,
    ) -> Self {
        Self {
            scope,
            feed: feed.into(),
            data_kind,
            bar_config,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 至今記錄到的事件
    pub fn seen(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }
}

impl Strategy for RecordingStrategy {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn initialize(&mut self, engine: &mut Engine, _data_portal: &DataPortal) -> EngineResult<()> {
        let seen = self.seen.clone();
        engine.register_event(
            EventDefinition::data(self.feed.clone(), self.data_kind, self.bar_config, 0),
            Box::new(move |event, _account, _data_portal| {
                let seen = seen.clone();
                let event = event.clone();
                Box::pin(async move {
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
            }),
        )
    }
}
