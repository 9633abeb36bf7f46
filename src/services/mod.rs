//! 服务层模块
//!
//! 状态聚合、生命周期控制、就绪等待与资源采样

pub mod aggregator;
pub mod lifecycle;
pub mod readiness;
pub mod stats;

pub use aggregator::EntityAggregator;
pub use lifecycle::{ControlError, LifecycleController};
