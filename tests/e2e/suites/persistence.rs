//! 持久化测试套件
//!
//! 验证规则经配置选定的存储格式写入、重新加载后行为不变。

use super::decision_flow::shipping_rule;
use crate::setup::TestEnvironment;
use rule_engine::EvaluationContext;
use serde_json::json;

#[test]
fn test_store_reload_and_evaluate() {
    for format in ["json", "yaml", "snapshot"] {
        let env = TestEnvironment::new(format).unwrap();
        let rule = shipping_rule();

        let storage = env.storage("shipping").unwrap();
        storage.store(&rule).unwrap();
        assert!(storage.path().starts_with(env.rules_dir()));

        let loaded = storage.load().unwrap();
        assert!(loaded.content_eq(&rule).unwrap(), "{} 格式往返失败", format);

        let ctx = EvaluationContext::from_value(json!({
            "amount": 50, "country": "DE", "tier": "platinum"
        }))
        .unwrap();
        let outcome = env.engine().evaluate(&loaded, &ctx).unwrap();
        assert_eq!(outcome.to_json(), json!({"fee": 0.0, "tier": "platinum"}));
    }
}

#[test]
fn test_reloaded_rule_keeps_identity() {
    let env = TestEnvironment::new("json").unwrap();
    let rule = shipping_rule();
    let storage = env.storage("identity").unwrap();

    storage.store(&rule).unwrap();
    let loaded = storage.load().unwrap();

    assert_eq!(loaded.id(), rule.id());
    assert_eq!(loaded.name(), "shipping");
    assert_eq!(loaded.required_params(), rule.required_params());
    assert_eq!(loaded.metadata().created, rule.metadata().created);
}
