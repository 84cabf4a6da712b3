//! 存储错误类型

use rule_engine::RuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("快照解码失败: {0}")]
    Snapshot(#[from] prost::DecodeError),

    #[error("无效的文件路径: {0}")]
    InvalidPath(String),

    #[error("无效的数据: {0}")]
    InvalidData(String),

    #[error("不支持的存储格式: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// 获取错误码，规则错误沿用其自身的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::Snapshot(_) => "SNAPSHOT_DECODE_ERROR",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Rule(e) => e.code(),
        }
    }
}
