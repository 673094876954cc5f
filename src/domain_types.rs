pub mod data_point;
pub mod scope;

pub use data_point::{Bar, Price, Tick, TsData};
pub use scope::Scope;
