/// 配置管理模組
///
/// 本模組負責加載和驗證引擎配置。
/// 支持從開發和生產兩種環境中加載不同的配置，配置一律以依賴注入
/// 方式傳入引擎，不提供全局單例。
// 宣告子模組
pub mod loader;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigExt, ConfigLoader, Environment};
pub use types::{ApplicationConfig, EngineConfig, LogConfig};
pub use validation::{validate_config, ValidationError, ValidationUtils, Validator};
