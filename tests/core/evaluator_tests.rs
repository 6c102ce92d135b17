use std::time::Duration;

use aiflow::dsl::{ComparisonOperator as Op, Condition, ConditionNodeData, NodeResult, NodeStatus};
use aiflow::evaluator::{compare, evaluate_condition, evaluate_conditions};
use aiflow::ExecutionContext;
use aiflow_sandbox_js::ExpressionEvaluator;
use serde_json::{json, Value};

fn check(op: Op, actual: Value, expected: Value) -> bool {
    compare(&op, Some(&actual), &expected).unwrap()
}

fn evaluator() -> ExpressionEvaluator {
    ExpressionEvaluator::new(Duration::from_secs(5))
}

fn context() -> ExecutionContext {
    let mut ctx = ExecutionContext::new(json!({"score": 10, "name": "Ada Lovelace", "tags": ["vip", "beta"]}));
    ctx.insert(NodeResult {
        node_id: "fetch".into(),
        node_type: "http_request".into(),
        label: "fetch".into(),
        status: NodeStatus::Completed,
        output: json!({"status": 200, "body": {"count": 3}}),
        error: None,
        start_time: 0,
        duration: Some(1),
        tolerated: false,
    });
    ctx
}

fn clause(variable: &str, operator: Op, value: Value) -> Condition {
    Condition {
        variable: variable.to_string(),
        operator,
        value,
    }
}

#[test]
fn test_is_empty_truth_table() {
    for empty in [json!(""), json!([]), json!({}), Value::Null] {
        assert!(check(Op::IsEmpty, empty.clone(), Value::Null), "{} should be empty", empty);
        assert!(!check(Op::NotEmpty, empty, Value::Null));
    }
    for full in [json!("x"), json!([1]), json!({"a": 1}), json!(0), json!(false)] {
        assert!(!check(Op::IsEmpty, full.clone(), Value::Null), "{} should not be empty", full);
        assert!(check(Op::NotEmpty, full, Value::Null));
    }
    assert!(compare(&Op::IsEmpty, None, &Value::Null).unwrap());
}

#[test]
fn test_null_operators() {
    assert!(check(Op::IsNull, Value::Null, Value::Null));
    assert!(compare(&Op::IsNull, None, &Value::Null).unwrap());
    assert!(!check(Op::IsNull, json!(""), Value::Null));
    assert!(check(Op::NotNull, json!(0), Value::Null));
    assert!(!compare(&Op::NotNull, None, &Value::Null).unwrap());
}

#[test]
fn test_contains_family() {
    assert!(check(Op::Contains, json!("hello world"), json!("world")));
    assert!(!check(Op::Contains, json!("hello"), json!("world")));
    assert!(check(Op::Contains, json!(["a", "b"]), json!("b")));
    assert!(check(Op::Contains, json!({"key": 1}), json!("key")));
    assert!(check(Op::NotContains, json!("hello"), json!("world")));
    assert!(!check(Op::NotContains, json!([1, 2]), json!(2)));
    assert!(!compare(&Op::Contains, None, &json!("x")).unwrap());
}

#[test]
fn test_equality_is_loose_across_number_forms() {
    assert!(check(Op::Equals, json!("abc"), json!("abc")));
    assert!(check(Op::Equals, json!(5), json!(5.0)));
    assert!(check(Op::Equals, json!("5"), json!(5)));
    assert!(check(Op::Equals, json!(true), json!("true")));
    assert!(!check(Op::Equals, json!("abc"), json!("abd")));
    assert!(check(Op::NotEquals, json!(1), json!(2)));
    assert!(!check(Op::NotEquals, json!("x"), json!("x")));
}

#[test]
fn test_prefix_suffix_and_regex() {
    assert!(check(Op::StartWith, json!("workflow"), json!("work")));
    assert!(!check(Op::StartWith, json!("workflow"), json!("flow")));
    assert!(check(Op::EndWith, json!("workflow"), json!("flow")));
    assert!(!check(Op::EndWith, json!("workflow"), json!("work")));
    assert!(check(Op::Regex, json!("order-1234"), json!(r"^order-\d+$")));
    assert!(!check(Op::Regex, json!("order-x"), json!(r"^order-\d+$")));
    assert!(compare(&Op::Regex, Some(&json!("a")), &json!("(")).is_err());
}

#[test]
fn test_numeric_comparisons() {
    assert!(check(Op::Gt, json!(10), json!(5)));
    assert!(!check(Op::Gt, json!(5), json!(5)));
    assert!(check(Op::Gte, json!(5), json!(5)));
    assert!(check(Op::Lt, json!("3"), json!(4)));
    assert!(check(Op::Lte, json!(4), json!("4")));
    assert!(!check(Op::Gt, json!("abc"), json!(1)));
}

#[tokio::test]
async fn test_js_expression_against_target() {
    let ev = evaluator();
    let hit = ExecutionContext::new(json!({"value": 10}));
    let miss = ExecutionContext::new(json!({"value": 3}));
    let cond = clause("input.value", Op::JsExpression, json!("input > 5"));
    assert!(evaluate_condition(&cond, &hit, &ev).await.unwrap());
    assert!(!evaluate_condition(&cond, &miss, &ev).await.unwrap());
}

#[tokio::test]
async fn test_clauses_resolve_node_outputs() {
    let ctx = context();
    let ev = evaluator();
    let cond = clause("fetch.body.count", Op::Gte, json!(3));
    assert!(evaluate_condition(&cond, &ctx, &ev).await.unwrap());
    // `body` is not a wrapper key, so there is no dive.
    let cond = clause("fetch.count", Op::Equals, json!(3));
    assert!(!evaluate_condition(&cond, &ctx, &ev).await.unwrap());
    let cond = clause("ghost.field", Op::IsNull, Value::Null);
    assert!(evaluate_condition(&cond, &ctx, &ev).await.unwrap());
}

#[tokio::test]
async fn test_and_or_combination() {
    let ctx = context();
    let ev = evaluator();
    let data: ConditionNodeData = serde_json::from_value(json!({
        "conditions": [
            {"variable": "input.score", "operator": "gt", "value": 5},
            {"variable": "input.tags", "operator": "contains", "value": "admin"}
        ],
        "logicalOperator": "and"
    }))
    .unwrap();
    assert!(!evaluate_conditions(&data, &ctx, &ev).await.unwrap());

    let data: ConditionNodeData = serde_json::from_value(json!({
        "conditions": [
            {"variable": "input.score", "operator": "gt", "value": 50},
            {"variable": "input.tags", "operator": "contains", "value": "vip"}
        ],
        "logicalOperator": "or"
    }))
    .unwrap();
    assert!(evaluate_conditions(&data, &ctx, &ev).await.unwrap());
}

#[tokio::test]
async fn test_legacy_single_clause_shape() {
    let ctx = context();
    let data: ConditionNodeData =
        serde_json::from_value(json!({"variable": "input.name", "operator": "start_with", "value": "Ada"})).unwrap();
    assert!(evaluate_conditions(&data, &ctx, &evaluator()).await.unwrap());

    let empty: ConditionNodeData = serde_json::from_value(json!({})).unwrap();
    assert!(!evaluate_conditions(&empty, &ctx, &evaluator()).await.unwrap());
}
