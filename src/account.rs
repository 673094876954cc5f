//! Account seam
//!
//! Order matching and position bookkeeping live outside this core; the
//! engine only needs to hand market data to the account's matching
//! operation and to trigger net-value recalculation. `BacktestAccount`
//! implements just enough state for those two built-in handlers.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain_types::TsData;
use crate::error::EngineResult;

/// 帳戶介面（委託撮合的回調目標）
///
/// 儲存庫的保存操作以共享引用跨任務傳遞帳戶，因此要求 `Sync`。
pub trait Account: Send + Sync {
    /// 帳戶名稱
    fn name(&self) -> &str;

    /// 將一筆 bar/tick 數據交給撮合邏輯
    fn match_data(&mut self, data: &TsData) -> EngineResult<()>;

    /// 以指定時點的價格映射重算淨值
    fn calc_net_value(
        &mut self,
        prices: &HashMap<String, f64>,
        as_of: DateTime<Utc>,
    ) -> EngineResult<()>;

    /// 目前持倉的標的代碼
    fn position_codes(&self) -> Vec<String>;

    /// 向下轉型入口，供嵌入方在取回 trait 物件後還原具體帳戶
    fn as_any(&self) -> &dyn Any;
}

/// 帳戶儲存庫
#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// 指定名稱的帳戶是否已存在
    async fn exists(&self, name: &str) -> anyhow::Result<bool>;

    /// 保存帳戶，供回測結束後分析使用
    async fn save(&self, account: &dyn Account) -> anyhow::Result<()>;
}

/// 回測帳戶
///
/// 僅記錄撮合喂入的最新標記價與淨值序列；完整的委託生命週期由外部
/// 協作者負責。
#[derive(Debug)]
pub struct BacktestAccount {
    name: String,
    cash: f64,
    positions: HashMap<String, f64>,
    last_marks: HashMap<String, f64>,
    net_values: Vec<(DateTime<Utc>, f64)>,
}

impl BacktestAccount {
    pub fn new(name: impl Into<String>, initial_cash: f64) -> Self {
        Self {
            name: name.into(),
            cash: initial_cash,
            positions: HashMap::new(),
            last_marks: HashMap::new(),
            net_values: Vec::new(),
        }
    }

    /// 直接設定持倉數量，供策略與測試使用
    pub fn set_position(&mut self, code: impl Into<String>, quantity: f64) {
        let code = code.into();
        if quantity == 0.0 {
            self.positions.remove(&code);
        } else {
            self.positions.insert(code, quantity);
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// 淨值序列（重算時間, 淨值）
    pub fn net_values(&self) -> &[(DateTime<Utc>, f64)] {
        &self.net_values
    }

    /// 撮合層看過的最新標記價
    pub fn last_mark(&self, code: &str) -> Option<f64> {
        self.last_marks.get(code).copied()
    }
}

impl Account for BacktestAccount {
    fn name(&self) -> &str {
        &self.name
    }

    fn match_data(&mut self, data: &TsData) -> EngineResult<()> {
        match data {
            TsData::Bar(bar) => {
                self.last_marks.insert(bar.code.clone(), bar.close);
            }
            TsData::Tick(tick) => {
                self.last_marks.insert(tick.code.clone(), tick.price);
            }
            TsData::Other { .. } => {
                return Err(crate::error::EngineError::WrongEventPayload(
                    "match 僅接受 bar 或 tick",
                ))
            }
        }
        Ok(())
    }

    fn calc_net_value(
        &mut self,
        prices: &HashMap<String, f64>,
        as_of: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut value = self.cash;
        for (code, quantity) in &self.positions {
            // 價格映射缺碼時退回撮合層的最新標記價
            let mark = prices
                .get(code)
                .copied()
                .or_else(|| self.last_marks.get(code).copied())
                .unwrap_or(0.0);
            value += quantity * mark;
        }
        self.net_values.push((as_of, value));
        Ok(())
    }

    fn position_codes(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 記憶體帳戶儲存庫，供測試與單機運行
#[derive(Default)]
pub struct MemoryAccountRepo {
    saved: Mutex<Vec<String>>,
}

impl MemoryAccountRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的帳戶名稱
    pub async fn saved_names(&self) -> Vec<String> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl AccountRepo for MemoryAccountRepo {
    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.saved.lock().await.iter().any(|n| n == name))
    }

    async fn save(&self, account: &dyn Account) -> anyhow::Result<()> {
        self.saved.lock().await.push(account.name().to_string());
        Ok(())
    }
}
