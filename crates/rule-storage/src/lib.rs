//! 规则持久化
//!
//! 提供 JSON、YAML 与二进制快照三种格式的规则存储，读写都经过规则引擎的序列化与解析。

pub mod error;
pub mod json;
pub mod snapshot;
pub mod storage;
pub mod yaml;

pub use error::{Result, StorageError};
pub use json::{JsonMultiRuleStorage, JsonRuleStorage};
pub use snapshot::SnapshotRuleStorage;
pub use storage::{MultiRuleStorage, RuleStorage, StorageFormat, open};
pub use yaml::YamlRuleStorage;
