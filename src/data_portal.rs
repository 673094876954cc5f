//! Current-price state and price-waiting
//!
//! The portal keeps one best-known price per instrument, replaced wholesale
//! on each update. Ingestion is deliberately dual-path: a backtest portal
//! registers its own internal data definition (highest data priority) so it
//! observes the same synthetic stream the match engine sees and stays on
//! simulated time; a live portal subscribes straight to the feed and runs on
//! wall-clock arrivals. Do not unify the two paths; they have different
//! time authorities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{error, warn};

use crate::domain_types::{Price, TsData};
use crate::error::{EngineError, EngineResult};
use crate::event::definition::{BarEventConfig, EventDataKind, EventDefinition};
use crate::event::types::{Event, EventPayload};
use crate::time_series::{HistoryDataQueryCommand, HistoryRow, TimeSeriesRepo, TsDataListener};

/// 模擬價格表：精確時間點 → 各標的價格，僅供完全腳本化的測試
pub type MockedPrices = HashMap<DateTime<Utc>, HashMap<String, Price>>;

/// 運行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalMode {
    Backtest,
    Live,
}

/// 數據門戶
pub struct DataPortal {
    mode: PortalMode,
    price_feed: String,
    ts_repo: Arc<dyn TimeSeriesRepo>,
    prices: DashMap<String, Price>,
    mocked_prices: MockedPrices,
    retry_limit: u32,
    retry_interval: StdDuration,
}

impl DataPortal {
    /// 建立回測模式門戶
    ///
    /// 不訂閱即時數據源，改在引擎上註冊內部數據定義（數據事件中
    /// 最高分發優先級，順位 -100），從引擎分發的合成流更新價格。
    pub fn backtest(
        price_feed: impl Into<String>,
        engine: &mut crate::engine::Engine,
    ) -> EngineResult<Self> {
        let price_feed = price_feed.into();
        let definition = EventDefinition::data(
            price_feed.clone(),
            EventDataKind::Bar,
            Some(BarEventConfig::market_open_only()),
            -100,
        );
        engine.register_event(
            definition,
            Box::new(|event, _account, portal| Box::pin(async move { portal.record_event(event) })),
        )?;

        Ok(Self {
            mode: PortalMode::Backtest,
            price_feed,
            ts_repo: engine.ts_repo(),
            prices: DashMap::new(),
            mocked_prices: MockedPrices::new(),
            // 回測中價格與重放時鐘一致，等待沒有意義
            retry_limit: 1,
            retry_interval: StdDuration::from_secs(0),
        })
    }

    /// 建立實盤模式門戶並訂閱即時數據源
    pub fn live(
        price_feed: impl Into<String>,
        ts_repo: Arc<dyn TimeSeriesRepo>,
        subscribe_codes: &[String],
        mocked_prices: Option<MockedPrices>,
        retry_limit: u32,
        retry_interval: StdDuration,
    ) -> EngineResult<Arc<Self>> {
        if subscribe_codes.is_empty() {
            return Err(EngineError::MissingLiveInput("subscribe_codes"));
        }
        let price_feed = price_feed.into();
        let ts = ts_repo
            .find_one(&price_feed)
            .ok_or_else(|| EngineError::UnknownTimeSeries(price_feed.clone()))?;

        let portal = Arc::new(Self {
            mode: PortalMode::Live,
            price_feed,
            ts_repo,
            prices: DashMap::new(),
            mocked_prices: mocked_prices.unwrap_or_default(),
            retry_limit,
            retry_interval,
        });
        ts.subscribe(portal.clone(), subscribe_codes)?;
        Ok(portal)
    }

    pub fn mode(&self) -> PortalMode {
        self.mode
    }

    /// 當前價格來源的數據源名稱
    pub fn price_feed(&self) -> &str {
        &self.price_feed
    }

    /// 查詢各標的的當前價格
    ///
    /// 設有模擬價格表時依精確時間點查表（時間點缺失即失敗，此路徑
    /// 僅供腳本化測試）；否則回傳目前已知的最佳價格，未知的標的
    /// 直接省略，絕不編造。
    pub fn current_price(
        &self,
        codes: &[String],
        at_time: DateTime<Utc>,
    ) -> EngineResult<HashMap<String, Price>> {
        if !self.mocked_prices.is_empty() {
            let table = self
                .mocked_prices
                .get(&at_time)
                .ok_or(EngineError::MockedPriceMissing(at_time))?;
            return Ok(codes
                .iter()
                .filter_map(|code| table.get(code).map(|p| (code.clone(), p.clone())))
                .collect());
        }

        Ok(codes
            .iter()
            .filter_map(|code| self.prices.get(code).map(|p| (code.clone(), p.clone())))
            .collect())
    }

    /// 等待每個標的都有觀測時間不早於 `visible_time` 的價格
    ///
    /// 實盤的價格到達是異步的，開盤鐘之類的呼叫方不能拿舊價格行動。
    /// 重試耗盡不是錯誤：回傳 None 並留給呼叫方處理。
    pub async fn wait_for_price_after(
        &self,
        codes: &[String],
        visible_time: DateTime<Utc>,
    ) -> Option<HashMap<String, f64>> {
        let mut count = 0;
        while count < self.retry_limit {
            match self.current_price(codes, visible_time) {
                Ok(current) => {
                    if current.len() == codes.len()
                        && codes
                            .iter()
                            .all(|code| current[code].time >= visible_time)
                    {
                        return Some(
                            codes
                                .iter()
                                .map(|code| (code.clone(), current[code].price))
                                .collect(),
                        );
                    }
                }
                Err(e) => error!("查詢當前價格失敗: {}", e),
            }

            warn!("沒有取得最新的價格數據，將會重試: {}", count);
            count += 1;
            if count < self.retry_limit {
                tokio::time::sleep(self.retry_interval).await;
            }
        }
        None
    }

    /// 歷史數據查詢直通
    pub async fn history_data(
        &self,
        feed_name: &str,
        command: &HistoryDataQueryCommand,
    ) -> EngineResult<Vec<HistoryRow>> {
        let ts = self
            .ts_repo
            .find_one(feed_name)
            .ok_or_else(|| EngineError::UnknownTimeSeries(feed_name.to_string()))?;
        Ok(ts.history_data(command).await?)
    }

    /// 由引擎分發的內部事件更新價格（回測路徑）
    ///
    /// bar 以收盤價、tick 以成交價記錄，觀測時間取事件可見時間。
    pub(crate) fn record_event(&self, event: &Event) -> EngineResult<()> {
        match &event.payload {
            EventPayload::Data(TsData::Bar(bar)) => {
                self.prices.insert(
                    bar.code.clone(),
                    Price {
                        code: bar.code.clone(),
                        price: bar.close,
                        time: event.visible_time,
                    },
                );
                Ok(())
            }
            EventPayload::Data(TsData::Tick(tick)) => {
                self.prices.insert(
                    tick.code.clone(),
                    Price {
                        code: tick.code.clone(),
                        price: tick.price,
                        time: event.visible_time,
                    },
                );
                Ok(())
            }
            _ => Err(EngineError::WrongEventPayload(
                "價格更新僅接受 bar 或 tick",
            )),
        }
    }

    /// 由數據源推送更新價格（實盤路徑）
    fn record_data(&self, data: &TsData) -> EngineResult<()> {
        match data {
            TsData::Bar(bar) => {
                self.prices.insert(
                    bar.code.clone(),
                    Price {
                        code: bar.code.clone(),
                        price: bar.close,
                        time: bar.visible_time,
                    },
                );
                Ok(())
            }
            TsData::Tick(tick) => {
                self.prices.insert(
                    tick.code.clone(),
                    Price {
                        code: tick.code.clone(),
                        price: tick.price,
                        time: tick.visible_time,
                    },
                );
                Ok(())
            }
            TsData::Other { .. } => Err(EngineError::WrongEventPayload(
                "價格更新僅接受 bar 或 tick",
            )),
        }
    }
}

impl TsDataListener for DataPortal {
    fn on_data(&self, data: TsData) {
        if let Err(e) = self.record_data(&data) {
            error!("即時價格更新失敗: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::Tick;
    use crate::time_series::MapTimeSeriesRepo;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn portal_with(prices: Vec<Price>, mocked: MockedPrices) -> DataPortal {
        let portal = DataPortal {
            mode: PortalMode::Live,
            price_feed: "tick".to_string(),
            ts_repo: Arc::new(MapTimeSeriesRepo::new()),
            prices: DashMap::new(),
            mocked_prices: mocked,
            retry_limit: 1,
            retry_interval: StdDuration::from_secs(0),
        };
        for price in prices {
            portal.prices.insert(price.code.clone(), price);
        }
        portal
    }

    fn price(code: &str, value: f64, minute: u32) -> Price {
        Price {
            code: code.to_string(),
            price: value,
            time: Utc.with_ymd_and_hms(2023, 1, 2, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_current_price_omits_unknown_codes() {
        let portal = portal_with(vec![price("AAPL", 100.0, 31)], MockedPrices::new());
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let result = portal
            .current_price(&["AAPL".to_string(), "MSFT".to_string()], t)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["AAPL"].price, 100.0);
    }

    #[test]
    fn test_mocked_table_requires_exact_instant() {
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let mut mocked = MockedPrices::new();
        mocked.insert(
            t,
            HashMap::from([("AAPL".to_string(), price("AAPL", 101.0, 31))]),
        );
        let portal = portal_with(vec![], mocked);

        assert_eq!(
            portal.current_price(&["AAPL".to_string()], t).unwrap()["AAPL"].price,
            101.0
        );
        let missing = t + chrono::Duration::minutes(1);
        assert_matches!(
            portal.current_price(&["AAPL".to_string()], missing),
            Err(EngineError::MockedPriceMissing(_))
        );
    }

    #[tokio::test]
    async fn test_wait_for_price_after_single_attempt_exhaustion() {
        let portal = portal_with(vec![price("AAPL", 100.0, 30)], MockedPrices::new());
        // 已知價格早於要求時間，retry_limit = 1 時恰好嘗試一次後放棄
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let result = portal
            .wait_for_price_after(&["AAPL".to_string()], t)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_price_after_requires_all_codes_fresh() {
        let portal = portal_with(
            vec![price("AAPL", 100.0, 32), price("MSFT", 50.0, 30)],
            MockedPrices::new(),
        );
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let codes = vec!["AAPL".to_string(), "MSFT".to_string()];
        // MSFT 的觀測時間過舊
        assert!(portal.wait_for_price_after(&codes, t).await.is_none());

        portal.prices.insert("MSFT".to_string(), price("MSFT", 51.0, 31));
        let result = portal.wait_for_price_after(&codes, t).await.unwrap();
        assert_eq!(result["AAPL"], 100.0);
        assert_eq!(result["MSFT"], 51.0);
    }

    #[test]
    fn test_record_data_replaces_wholesale() {
        let portal = portal_with(vec![], MockedPrices::new());
        let t1 = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2023, 1, 2, 9, 32, 0).unwrap();

        portal
            .record_data(&TsData::Tick(Tick {
                feed: "tick".to_string(),
                visible_time: t1,
                code: "AAPL".to_string(),
                price: 100.0,
                size: 1.0,
            }))
            .unwrap();
        portal
            .record_data(&TsData::Tick(Tick {
                feed: "tick".to_string(),
                visible_time: t2,
                code: "AAPL".to_string(),
                price: 101.0,
                size: 1.0,
            }))
            .unwrap();

        let current = portal.current_price(&["AAPL".to_string()], t2).unwrap();
        assert_eq!(current["AAPL"].price, 101.0);
        assert_eq!(current["AAPL"].time, t2);
    }

    #[test]
    fn test_record_data_rejects_other_payload() {
        let portal = portal_with(vec![], MockedPrices::new());
        let t = Utc.with_ymd_and_hms(2023, 1, 2, 9, 31, 0).unwrap();
        let other = TsData::Other {
            feed: "misc".to_string(),
            visible_time: t,
            code: "AAPL".to_string(),
            fields: serde_json::json!({}),
        };
        assert_matches!(
            portal.record_data(&other),
            Err(EngineError::WrongEventPayload(_))
        );
    }
}
