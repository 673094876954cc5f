// 引擎錯誤類型定義
//
// 事件排程與分發核心的統一錯誤類型。致命錯誤（重複註冊、錯誤配置）
// 與可恢復錯誤（行情查詢失敗）都彙整於此，由呼叫端決定是否中止。

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::definition::DefinitionId;

/// 引擎錯誤類型
#[derive(Debug, Error)]
pub enum EngineError {
    /// 事件定義重複註冊
    #[error("事件定義重複註冊: {0}")]
    DuplicateDefinition(DefinitionId),

    /// 分發時找不到對應的事件定義
    #[error("事件定義未註冊: {0}")]
    UnregisteredDefinition(DefinitionId),

    /// Bar 事件配置衝突
    #[error("錯誤的 bar 事件配置: market_open_as_tick 與 bar_open_as_tick 互斥")]
    ConflictingBarConfig,

    /// 事件定義缺少必要欄位（時間觸發缺 time_rule、數據觸發缺 feed 等）
    #[error("事件定義不完整: {0}")]
    IncompleteDefinition(&'static str),

    /// 處理器收到非預期的事件負載
    #[error("錯誤的事件資料型別: {0}")]
    WrongEventPayload(&'static str),

    /// 回測帳戶名稱已存在
    #[error("帳戶名稱重複: {0}")]
    DuplicateAccountName(String),

    /// 實盤模擬模式缺少必要參數
    #[error("缺少實盤參數: {0}")]
    MissingLiveInput(&'static str),

    /// 回測展開不允許時間規則帶秒級偏移
    #[error("回測過程中的時間事件不允許秒級偏移")]
    SecondOffsetInBacktest,

    /// 依名稱找不到時間序列
    #[error("找不到時間序列: {0}")]
    UnknownTimeSeries(String),

    /// 歷史資料列的欄位形狀與事件定義不符
    #[error("錯誤的時間序列資料形狀: 預期 {expected}, 實際 {actual}")]
    WrongRowShape {
        expected: &'static str,
        actual: &'static str,
    },

    /// 交易日曆無法提供下一個開/收盤時間
    #[error("交易日曆錯誤: {0}")]
    Calendar(String),

    /// 模擬價格表缺少指定時間點
    #[error("模擬價格表缺少時間點: {0}")]
    MockedPriceMissing(DateTime<Utc>),

    /// 帳戶操作失敗
    #[error("帳戶錯誤: {0}")]
    Account(String),

    /// 外部協作者（時間序列、帳戶儲存庫）回傳的錯誤
    #[error("外部服務錯誤: {0}")]
    External(#[from] anyhow::Error),
}

/// 引擎結果類型別名
pub type EngineResult<T> = Result<T, EngineError>;
