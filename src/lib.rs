// 模組定義
pub mod account;
pub mod calendar;
pub mod config;
pub mod data_portal;
pub mod domain_types;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod time_series;
