//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod container;
pub mod entity;
pub mod response;

// Re-exports for convenience
pub use container::{
    CommandOutcome, ContainerAction, ContainerName, ContainerStats, ContainerSummary, DiskUsage,
    Identifier, InvalidIdentifier, NetworkInfo, PortBinding, PortMap, RuntimeState,
};
pub use entity::{
    sort_ranked, ConfigurationOverrides, DegradedProject, Family, LanguageKind, LogLocation,
    LogSet, NamedEntity, ProjectEntry, ProjectPath, ProjectUrls, ProjectView, Ranked,
    RuntimeLanguage,
};
pub use response::{ActionReport, Envelope, Meta, SystemReport};
