//! 测试套件模块
//!
//! 按使用场景组织的测试用例集合。

pub mod decision_flow;
pub mod persistence;
