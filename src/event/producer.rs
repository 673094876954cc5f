// 事件生產
//
// 回測：把時間區間展開成完整的確定性事件列表（時間事件以分鐘粒度
// 重放輪詢結果，數據事件來自批次歷史查詢並依配置合成 tick）。
// 實盤：對每個數據定義掛一個訂閱橋接器直通推送，另起一個每秒輪詢
// 時間規則的任務；輪詢任務帶關閉訊號，可乾淨停止並等待結束。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::calendar::TradingCalendar;
use crate::domain_types::{Bar, Scope, Tick, TsData};
use crate::error::{EngineError, EngineResult};
use crate::event::definition::{DefinitionId, EventDataKind, EventDefinition, TriggerKind};
use crate::event::rule::TimeRuleState;
use crate::event::types::{Event, EventPayload};
use crate::time_series::{
    HistoryColumns, HistoryDataQueryCommand, TimeSeriesRepo, TsDataListener,
};

/// 事件接收端，回測與實盤共用的分發契約
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: Event);
}

/// 實盤輪詢任務的控制柄
pub struct ProducerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("task_finished", &self.task.is_finished())
            .finish()
    }
}

impl ProducerHandle {
    /// 發送關閉訊號並等待輪詢任務結束
    pub async fn stop(self) {
        // 接收端可能已自行結束，發送失敗可忽略
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("等待時間事件任務結束失敗: {}", e);
        }
    }
}

/// 每個數據定義一個的訂閱橋接器：把數據源推送包成事件直接轉發，
/// 不做任何緩衝
struct FeedEventBridge {
    definition: Arc<EventDefinition>,
    subscriber: Arc<dyn EventSubscriber>,
}

impl TsDataListener for FeedEventBridge {
    fn on_data(&self, data: TsData) {
        let event = Event::new(
            self.definition.clone(),
            data.visible_time(),
            EventPayload::Data(data),
        );
        self.subscriber.on_event(event);
    }
}

/// 事件生產者
pub struct EventProducer {
    definitions: Vec<Arc<EventDefinition>>,
    ts_repo: Arc<dyn TimeSeriesRepo>,
    poll_interval: StdDuration,
}

impl EventProducer {
    pub fn new(
        definitions: Vec<Arc<EventDefinition>>,
        ts_repo: Arc<dyn TimeSeriesRepo>,
        poll_interval: StdDuration,
    ) -> Self {
        Self {
            definitions,
            ts_repo,
            poll_interval,
        }
    }

    fn time_definitions(&self) -> Vec<Arc<EventDefinition>> {
        self.definitions
            .iter()
            .filter(|ed| ed.trigger_kind() == TriggerKind::Time)
            .cloned()
            .collect()
    }

    fn data_definitions(&self) -> Vec<Arc<EventDefinition>> {
        self.definitions
            .iter()
            .filter(|ed| ed.trigger_kind() == TriggerKind::Data)
            .cloned()
            .collect()
    }

    /// 啟動實盤事件生產
    ///
    /// 數據定義逐一訂閱對應數據源；時間定義交給一個每秒評估的輪詢
    /// 任務。回傳輪詢任務的控制柄。
    pub fn start(
        &self,
        scope: &Scope,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> EngineResult<ProducerHandle> {
        let mut time_definitions = Vec::new();
        for ed in &self.definitions {
            match ed.trigger_kind() {
                TriggerKind::Time => time_definitions.push(ed.clone()),
                TriggerKind::Data => {
                    let feed_name = ed.require_feed()?;
                    let ts = self
                        .ts_repo
                        .find_one(feed_name)
                        .ok_or_else(|| EngineError::UnknownTimeSeries(feed_name.to_string()))?;
                    let bridge = Arc::new(FeedEventBridge {
                        definition: ed.clone(),
                        subscriber: subscriber.clone(),
                    });
                    ts.subscribe(bridge, &scope.codes)?;
                }
            }
        }

        info!(
            "啟動時間事件輪詢任務, 時間定義數: {}",
            time_definitions.len()
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(time_event_loop(
            time_definitions,
            scope.calendar.clone(),
            subscriber,
            self.poll_interval,
            shutdown_rx,
        ));

        Ok(ProducerHandle { shutdown_tx, task })
    }

    /// 回測展開：產生 `[start, end]` 內的全部事件
    ///
    /// 時間事件以一分鐘粒度走訪區間逐一評估規則，重現實盤輪詢在分鐘
    /// 解析度下會產生的序列；數據事件對每個數據定義發一次批次歷史
    /// 查詢，bar 列依配置額外合成 tick。回傳列表不排序，排序是
    /// EventLine 的責任。
    pub async fn history_events(
        &self,
        scope: &Scope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Event>> {
        let mut total = Vec::new();

        let time_definitions = self.time_definitions();
        if !time_definitions.is_empty() {
            total.extend(self.expand_time_events(
                &time_definitions,
                scope.calendar.as_ref(),
                start,
                end,
            )?);
        }

        let data_definitions = self.data_definitions();
        if !data_definitions.is_empty() {
            total.extend(
                self.expand_data_events(&data_definitions, scope, start, end)
                    .await?,
            );
        }

        Ok(total)
    }

    fn expand_time_events(
        &self,
        definitions: &[Arc<EventDefinition>],
        calendar: &dyn TradingCalendar,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Event>> {
        for ed in definitions {
            if ed.require_time_rule()?.second_offset() != 0 {
                return Err(EngineError::SecondOffsetInBacktest);
            }
        }

        let mut states: HashMap<DefinitionId, TimeRuleState> = definitions
            .iter()
            .map(|ed| (ed.id(), TimeRuleState::new()))
            .collect();

        let mut events = Vec::new();
        let mut p = start;
        while p <= end {
            for ed in definitions {
                let rule = ed.require_time_rule()?;
                let state = states
                    .get_mut(&ed.id())
                    .expect("states 以相同定義列表初始化");
                if state.evaluate(rule, calendar, p)? {
                    events.push(Event::empty(ed.clone(), p));
                }
            }
            p += Duration::minutes(1);
        }
        Ok(events)
    }

    async fn expand_data_events(
        &self,
        definitions: &[Arc<EventDefinition>],
        scope: &Scope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Event>> {
        // 開盤時點集合依日曆慣例往前修正一分鐘，再交集到查詢區間
        let one_minute = Duration::minutes(1);
        let market_opens: HashSet<DateTime<Utc>> = scope
            .calendar
            .opens_between(start + one_minute, end + one_minute)
            .into_iter()
            .map(|open| open - one_minute)
            .collect();
        let market_closes: HashSet<DateTime<Utc>> = scope
            .calendar
            .closes_between(start, end)
            .into_iter()
            .collect();

        let mut events = Vec::new();
        for ed in definitions {
            let feed_name = ed.require_feed()?;
            let ts = self
                .ts_repo
                .find_one(feed_name)
                .ok_or_else(|| EngineError::UnknownTimeSeries(feed_name.to_string()))?;
            let command = HistoryDataQueryCommand::new(start, end, scope.codes.clone());
            let rows = ts.history_data(&command).await?;

            for row in rows {
                match ed.data_kind() {
                    Some(EventDataKind::Bar) => {
                        let HistoryColumns::Bar {
                            start_time,
                            open,
                            high,
                            low,
                            close,
                            volume,
                        } = row.columns
                        else {
                            return Err(EngineError::WrongRowShape {
                                expected: "bar",
                                actual: row.columns.shape_name(),
                            });
                        };
                        let bar = Bar {
                            feed: feed_name.to_string(),
                            visible_time: row.visible_time,
                            code: row.code.clone(),
                            start_time,
                            open,
                            high,
                            low,
                            close,
                            volume,
                        };
                        self.push_bar_events(ed, bar, &market_opens, &market_closes, &mut events);
                    }
                    Some(EventDataKind::Tick) => {
                        let HistoryColumns::Tick { price, size } = row.columns else {
                            return Err(EngineError::WrongRowShape {
                                expected: "tick",
                                actual: row.columns.shape_name(),
                            });
                        };
                        let tick = Tick {
                            feed: feed_name.to_string(),
                            visible_time: row.visible_time,
                            code: row.code,
                            price,
                            size,
                        };
                        events.push(Event::new(
                            ed.clone(),
                            tick.visible_time,
                            EventPayload::Data(TsData::Tick(tick)),
                        ));
                    }
                    _ => {
                        let fields = match row.columns {
                            HistoryColumns::Other(value) => value,
                            other => serde_json::to_value(format!("{:?}", other))
                                .unwrap_or(serde_json::Value::Null),
                        };
                        events.push(Event::new(
                            ed.clone(),
                            row.visible_time,
                            EventPayload::Data(TsData::Other {
                                feed: feed_name.to_string(),
                                visible_time: row.visible_time,
                                code: row.code,
                                fields,
                            }),
                        ));
                    }
                }
            }
        }
        Ok(events)
    }

    /// 一筆 bar 產出一個 bar 事件，外加最多兩個合成 tick 事件
    fn push_bar_events(
        &self,
        ed: &Arc<EventDefinition>,
        bar: Bar,
        market_opens: &HashSet<DateTime<Utc>>,
        market_closes: &HashSet<DateTime<Utc>>,
        events: &mut Vec<Event>,
    ) {
        let config = ed.bar_config();
        let feed = bar.feed.clone();

        // bar 事件先入列，同時刻的合成 tick 穩定排序後保持在其後
        events.push(Event::new(
            ed.clone(),
            bar.visible_time,
            EventPayload::Data(TsData::Bar(bar.clone())),
        ));

        if config.market_open_as_tick
            && !config.bar_open_as_tick
            && market_opens.contains(&bar.start_time)
        {
            // 合成 tick 保留 bar 的可見時間，事件時間帶偏移
            events.push(Event::new(
                ed.clone(),
                bar.start_time + config.market_open_as_tick_delta,
                EventPayload::Data(TsData::Tick(Tick {
                    feed: feed.clone(),
                    visible_time: bar.visible_time,
                    code: bar.code.clone(),
                    price: bar.open,
                    size: -1.0,
                })),
            ));
        }

        if config.bar_open_as_tick {
            let tick_visible_time = bar.start_time + config.bar_open_as_tick_delta;
            events.push(Event::new(
                ed.clone(),
                tick_visible_time,
                EventPayload::Data(TsData::Tick(Tick {
                    feed: feed.clone(),
                    visible_time: tick_visible_time,
                    code: bar.code.clone(),
                    price: bar.open,
                    size: -1.0,
                })),
            ));
        }

        if config.market_close_as_tick && market_closes.contains(&bar.visible_time) {
            events.push(Event::new(
                ed.clone(),
                bar.visible_time + config.market_close_as_tick_delta,
                EventPayload::Data(TsData::Tick(Tick {
                    feed,
                    visible_time: bar.visible_time,
                    code: bar.code,
                    price: bar.close,
                    size: -1.0,
                })),
            ));
        }
    }
}

/// 時間事件輪詢循環
///
/// 每個週期讀取牆鐘時間並評估所有時間規則；單次評估失敗只記錄日誌，
/// 循環繼續，孤立的失火不得終止實盤進程。
async fn time_event_loop(
    definitions: Vec<Arc<EventDefinition>>,
    calendar: Arc<dyn TradingCalendar>,
    subscriber: Arc<dyn EventSubscriber>,
    poll_interval: StdDuration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut states: HashMap<DefinitionId, TimeRuleState> = definitions
        .iter()
        .map(|ed| (ed.id(), TimeRuleState::new()))
        .collect();

    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("時間事件任務收到關閉訊號");
                    break;
                }
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                debug!("時間事件輪詢: {}", now);
                for ed in &definitions {
                    let rule = match ed.require_time_rule() {
                        Ok(rule) => rule,
                        Err(e) => {
                            error!("時間事件定義不完整: {}", e);
                            continue;
                        }
                    };
                    let state = states
                        .get_mut(&ed.id())
                        .expect("states 以相同定義列表初始化");
                    match state.evaluate(rule, calendar.as_ref(), now) {
                        Ok(true) => subscriber.on_event(Event::empty(ed.clone(), now)),
                        Ok(false) => {}
                        Err(e) => error!("時間規則評估失敗: {}", e),
                    }
                }
            }
        }
    }
}

/// 模擬事件生成函數：每個事件定義對應一段固定事件列表
pub type MockedEventGenerator = Box<dyn Fn(&EventDefinition) -> Vec<Event> + Send + Sync>;

/// 確定性的離線事件生產者
///
/// 以生成函數算出全部事件、整體排序後同步逐一推給接收端，
/// 用來在沒有牆鐘與網絡依賴下驅動實盤分發路徑。
pub struct MockedEventProducer {
    generator: MockedEventGenerator,
    definitions: Vec<Arc<EventDefinition>>,
}

impl MockedEventProducer {
    pub fn new(generator: MockedEventGenerator, definitions: Vec<Arc<EventDefinition>>) -> Self {
        Self {
            generator,
            definitions,
        }
    }

    /// 計算並推送全部模擬事件
    pub fn start(&self, subscriber: &dyn EventSubscriber) {
        let mut events = Vec::new();
        for ed in &self.definitions {
            events.extend((self.generator)(ed));
        }
        events.sort_by(|a, b| a.cmp_order(b));

        for event in events {
            subscriber.on_event(event);
        }
    }
}
