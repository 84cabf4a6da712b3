//! 规则系统端到端测试
//!
//! 测试覆盖完整的使用流程，包括：
//! - 从配置文件构建引擎与存储
//! - 决策树的构建、持久化与重新加载
//! - 加载后的规则在各分支上的评估结果

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
