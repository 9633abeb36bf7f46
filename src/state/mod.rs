//! 运行时状态模块
//!
//! 应用状态与运行时查询缓存

pub mod app_state;
pub mod cache;

pub use app_state::AppState;
pub use cache::{CachedGateway, Clock, ManualClock, Probe, SystemClock, TtlCache};
