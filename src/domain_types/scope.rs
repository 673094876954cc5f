use std::sync::Arc;

use crate::calendar::TradingCalendar;

/// 策略運行範圍：標的代碼集合與交易日曆
///
/// 每次策略運行建立一次，之後只讀。
#[derive(Clone)]
pub struct Scope {
    pub codes: Vec<String>,
    pub calendar: Arc<dyn TradingCalendar>,
}

impl Scope {
    pub fn new(codes: Vec<String>, calendar: Arc<dyn TradingCalendar>) -> Self {
        Self { codes, calendar }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("codes", &self.codes).finish()
    }
}
