//! 统一响应信封
//!
//! 成功：`{success: true, data: {...}, meta: {count}}`；
//! 失败由 `ApiError` 生成 `{success: false, message}`

use serde::Serialize;

/// 列表元信息
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Meta {
    pub count: usize,
}

/// 成功响应
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta = Some(Meta { count });
        self
    }
}

/// 生命周期操作的结果
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub message: String,
    pub target: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

/// 系统级批量操作的结果
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub message: String,
    pub action: String,
    pub affected_containers: usize,
    pub containers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
