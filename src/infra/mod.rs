//! 基础设施模块
//!
//! 封装外部依赖（命令执行、容器运行时、域名解析）

pub mod command;
pub mod dns;
pub mod docker;

pub use command::CommandRunner;
pub use dns::{DomainResolver, SystemResolver};
pub use docker::{DockerCli, GatewayError, RuntimeGateway};
