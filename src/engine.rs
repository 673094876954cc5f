// 引擎：註冊表與分發
//
// 引擎維護 (事件定義 id → 處理器) 的註冊表，驅動兩種運行方式：
// 回測循環（單任務、確定性、會終止）與實盤循環（生產者驅動、
// 無界）。實盤事件一律匯入單消費者通道，由唯一的分發任務串行
// 調用處理器，帳戶與數據門戶的變更因此不會被並發寫入。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::account::{Account, AccountRepo, BacktestAccount};
use crate::config::EngineConfig;
use crate::data_portal::{DataPortal, MockedPrices};
use crate::domain_types::{Scope, TsData};
use crate::error::{EngineError, EngineResult};
use crate::event::definition::{
    BarEventConfig, DefinitionId, EventDataKind, EventDefinition,
};
use crate::event::line::EventLine;
use crate::event::producer::{
    EventProducer, EventSubscriber, MockedEventGenerator, MockedEventProducer, ProducerHandle,
};
use crate::event::rule::TimeRule;
use crate::event::types::{Event, EventPayload};
use crate::time_series::TimeSeriesRepo;

/// 事件處理器：以 (事件, 帳戶, 數據門戶) 被調用的裝箱異步閉包
pub type Handler = Box<
    dyn for<'a> Fn(
            &'a Event,
            &'a mut dyn Account,
            &'a DataPortal,
        ) -> BoxFuture<'a, EngineResult<()>>
        + Send
        + Sync,
>;

/// 策略介面
///
/// `initialize` 在運行循環啟動前被調用，策略在此透過引擎註冊自己的
/// 事件定義與處理器。
pub trait Strategy: Send {
    /// 策略運行範圍
    fn scope(&self) -> &Scope;

    /// 註冊事件定義與處理器
    fn initialize(&mut self, engine: &mut Engine, data_portal: &DataPortal) -> EngineResult<()>;
}

/// 回測運行參數
#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_cash: f64,
    pub account_name: String,
    /// 用於撮合的數據源名稱
    pub match_feed: String,
}

/// 實盤運行選項
#[derive(Default)]
pub struct LiveRunOptions {
    /// 是否為模擬實盤（live test）模式
    pub live_test: bool,
    /// 模擬事件生成函數，設定後以 MockedEventProducer 取代真實生產者
    pub mocked_events: Option<MockedEventGenerator>,
    /// 模擬價格表
    pub mocked_prices: Option<MockedPrices>,
}

/// 實盤運行控制柄
pub struct LiveHandle {
    shutdown_tx: watch::Sender<bool>,
    producer: Option<ProducerHandle>,
    dispatch: JoinHandle<Box<dyn Account>>,
}

impl std::fmt::Debug for LiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveHandle")
            .field("has_producer", &self.producer.is_some())
            .field("dispatch_finished", &self.dispatch.is_finished())
            .finish()
    }
}

impl LiveHandle {
    /// 停止生產者與分發任務，取回帳戶
    ///
    /// 分發任務會先處理完通道中已入列的事件再結束。
    pub async fn stop(self) -> EngineResult<Box<dyn Account>> {
        if let Some(producer) = self.producer {
            producer.stop().await;
        }
        let _ = self.shutdown_tx.send(true);
        self.dispatch
            .await
            .map_err(|e| EngineError::External(anyhow::Error::new(e)))
    }
}

/// 把事件送進分發通道的接收端
struct EngineEventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSubscriber for EngineEventSink {
    fn on_event(&self, event: Event) {
        if self.tx.send(event).is_err() {
            error!("分發通道已關閉，事件被丟棄");
        }
    }
}

/// 事件引擎
pub struct Engine {
    ts_repo: Arc<dyn TimeSeriesRepo>,
    account_repo: Arc<dyn AccountRepo>,
    config: EngineConfig,
    definitions: Vec<Arc<EventDefinition>>,
    handlers: HashMap<DefinitionId, Handler>,
    is_backtest: bool,
}

impl Engine {
    pub fn new(
        ts_repo: Arc<dyn TimeSeriesRepo>,
        account_repo: Arc<dyn AccountRepo>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ts_repo,
            account_repo,
            config,
            definitions: Vec::new(),
            handlers: HashMap::new(),
            is_backtest: false,
        }
    }

    /// 是否運行於回測模式
    pub fn is_backtest(&self) -> bool {
        self.is_backtest
    }

    pub(crate) fn ts_repo(&self) -> Arc<dyn TimeSeriesRepo> {
        self.ts_repo.clone()
    }

    /// 註冊事件定義與處理器
    ///
    /// 重複註冊同一個定義是編程錯誤，立即失敗。
    pub fn register_event(
        &mut self,
        definition: EventDefinition,
        handler: Handler,
    ) -> EngineResult<()> {
        let id = definition.id();
        if self.handlers.contains_key(&id) {
            return Err(EngineError::DuplicateDefinition(id));
        }
        self.handlers.insert(id, handler);
        self.definitions.push(Arc::new(definition));
        Ok(())
    }

    /// 查找處理器並以 (事件, 帳戶, 數據門戶) 調用
    ///
    /// 事件絕不應該由未註冊的定義產生，找不到處理器立即失敗。
    pub async fn dispatch(
        &self,
        event: &Event,
        account: &mut dyn Account,
        data_portal: &DataPortal,
    ) -> EngineResult<()> {
        dispatch_with(&self.handlers, event, account, data_portal).await
    }

    /// 運行回測
    ///
    /// 展開完整歷史事件列表後嚴格按序分發；單一事件的處理失敗只記錄
    /// 日誌，回測總是跑完並保存帳戶。
    pub async fn run_backtest(
        &mut self,
        strategy: &mut dyn Strategy,
        params: BacktestParams,
    ) -> EngineResult<BacktestAccount> {
        self.is_backtest = true;

        if self.account_repo.exists(&params.account_name).await? {
            return Err(EngineError::DuplicateAccountName(params.account_name));
        }

        let data_portal = DataPortal::backtest(params.match_feed.clone(), self)?;
        strategy.initialize(self, &data_portal)?;
        self.register_builtin_net_value()?;
        self.register_builtin_match(&params.match_feed)?;

        let producer = EventProducer::new(
            self.definitions.clone(),
            self.ts_repo.clone(),
            self.config.poll_interval(),
        );
        let mut event_line = EventLine::new();
        event_line.insert_all(
            producer
                .history_events(strategy.scope(), params.start, params.end)
                .await?,
        );
        info!(
            "回測事件展開完成, 區間: [{}, {}], 事件數: {}",
            params.start,
            params.end,
            event_line.len()
        );

        let mut account = BacktestAccount::new(params.account_name, params.initial_cash);
        while let Some(event) = event_line.pop_front() {
            if let Err(e) = self.dispatch(&event, &mut account, &data_portal).await {
                error!("事件處理失敗: {}, {}", e, event);
            }
        }

        // 保存以便後續分析
        self.account_repo.save(&account).await?;
        Ok(account)
    }

    /// 運行實盤（或以模擬生產者驅動的實盤路徑）
    ///
    /// 生產者把事件送入單消費者通道，唯一的分發任務擁有註冊表、
    /// 帳戶與數據門戶並串行處理。回傳的控制柄可停止並取回帳戶。
    pub fn run_live(
        mut self,
        strategy: &mut dyn Strategy,
        account: Box<dyn Account>,
        options: LiveRunOptions,
    ) -> EngineResult<LiveHandle> {
        self.is_backtest = false;

        if options.live_test
            && (options.mocked_events.is_none() || options.mocked_prices.is_none())
        {
            return Err(EngineError::MissingLiveInput(
                "live test 模式需要 mocked_events 與 mocked_prices",
            ));
        }

        self.register_builtin_net_value()?;

        let scope = strategy.scope().clone();
        let data_portal = DataPortal::live(
            self.config.live_price_feed.clone(),
            self.ts_repo.clone(),
            &scope.codes,
            options.mocked_prices,
            self.config.price_retry_limit,
            self.config.price_retry_interval(),
        )?;
        strategy.initialize(&mut self, &data_portal)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSubscriber> = Arc::new(EngineEventSink { tx });

        let producer_handle = match options.mocked_events {
            Some(generator) => {
                let mocked = MockedEventProducer::new(generator, self.definitions.clone());
                mocked.start(sink.as_ref());
                None
            }
            None => {
                let producer = EventProducer::new(
                    self.definitions.clone(),
                    self.ts_repo.clone(),
                    self.config.poll_interval(),
                );
                Some(producer.start(&scope, sink)?)
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatch = tokio::spawn(dispatch_loop(
            self.handlers,
            rx,
            account,
            data_portal,
            shutdown_rx,
        ));

        Ok(LiveHandle {
            shutdown_tx,
            producer: producer_handle,
            dispatch,
        })
    }

    /// 內建淨值重算：收盤後 30 分鐘觸發
    fn register_builtin_net_value(&mut self) -> EngineResult<()> {
        self.register_event(
            EventDefinition::time(TimeRule::market_close(30, 0)),
            Box::new(calc_net_value_handler),
        )
    }

    /// 內建撮合：主數據源 bar 事件，開收盤皆合成 tick（偏移一秒）
    fn register_builtin_match(&mut self, match_feed: &str) -> EngineResult<()> {
        let bar_config = BarEventConfig::new(
            false,
            Duration::zero(),
            true,
            Duration::seconds(1),
            true,
            Duration::seconds(1),
        )?;
        self.register_event(
            EventDefinition::data(match_feed, EventDataKind::Bar, Some(bar_config), -10),
            Box::new(match_handler),
        )
    }
}

/// 在指定註冊表上查找處理器並調用
async fn dispatch_with(
    handlers: &HashMap<DefinitionId, Handler>,
    event: &Event,
    account: &mut dyn Account,
    data_portal: &DataPortal,
) -> EngineResult<()> {
    let id = event.definition.id();
    let handler = handlers
        .get(&id)
        .ok_or(EngineError::UnregisteredDefinition(id))?;
    handler(event, account, data_portal).await
}

/// 實盤分發循環：單消費者串行處理全部事件
///
/// 收到關閉訊號後先清空已入列的事件再結束，並交回帳戶。
async fn dispatch_loop(
    handlers: HashMap<DefinitionId, Handler>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    mut account: Box<dyn Account>,
    data_portal: Arc<DataPortal>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Box<dyn Account> {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("分發任務收到關閉訊號");
                    while let Ok(event) = rx.try_recv() {
                        if let Err(e) =
                            dispatch_with(&handlers, &event, account.as_mut(), &data_portal).await
                        {
                            error!("事件處理失敗: {}, {}", e, event);
                        }
                    }
                    break;
                }
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        if let Err(e) =
                            dispatch_with(&handlers, &event, account.as_mut(), &data_portal).await
                        {
                            error!("事件處理失敗: {}, {}", e, event);
                        }
                    }
                    None => break,
                }
            }
        }
    }
    account
}

/// 內建撮合處理器：負載必須是 bar 或 tick，轉交帳戶的撮合操作
fn match_handler<'a>(
    event: &'a Event,
    account: &'a mut dyn Account,
    _data_portal: &'a DataPortal,
) -> BoxFuture<'a, EngineResult<()>> {
    Box::pin(async move {
        match &event.payload {
            EventPayload::Data(data @ (TsData::Bar(_) | TsData::Tick(_))) => {
                account.match_data(data)
            }
            _ => Err(EngineError::WrongEventPayload("撮合僅接受 bar 或 tick")),
        }
    })
}

/// 內建淨值重算處理器
///
/// 讀取全部持倉標的在事件可見時間的當前價格（無持倉時為空映射），
/// 請帳戶以該時點重算淨值。
fn calc_net_value_handler<'a>(
    event: &'a Event,
    account: &'a mut dyn Account,
    data_portal: &'a DataPortal,
) -> BoxFuture<'a, EngineResult<()>> {
    Box::pin(async move {
        let codes = account.position_codes();
        let prices = if codes.is_empty() {
            HashMap::new()
        } else {
            data_portal
                .current_price(&codes, event.visible_time)?
                .into_iter()
                .map(|(code, price)| (code, price.price))
                .collect()
        };
        account.calc_net_value(&prices, event.visible_time)
    })
}
