use serde_json::Value;
use tracing::debug;

use aiflow_sandbox_js::ExpressionEvaluator;

use super::operators::compare;
use crate::core::execution_context::ExecutionContext;
use crate::dsl::{ComparisonOperator, Condition, ConditionNodeData, LogicalOperator};
use crate::error::NodeError;
use crate::template::{resolve_reference, resolve_value_spec};

/// Evaluate every clause of a condition node, combined with AND/OR.
///
/// Short-circuits like the operators it models. A node with no clauses is
/// `false`.
pub async fn evaluate_conditions(
    data: &ConditionNodeData,
    ctx: &ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> Result<bool, NodeError> {
    let clauses = data.clauses();
    if clauses.is_empty() {
        return Ok(false);
    }
    for clause in &clauses {
        let hit = evaluate_condition(clause, ctx, evaluator).await?;
        match data.logical_operator {
            LogicalOperator::And if !hit => return Ok(false),
            LogicalOperator::Or if hit => return Ok(true),
            _ => {}
        }
    }
    Ok(data.logical_operator == LogicalOperator::And)
}

/// Evaluate one `{variable, operator, value}` clause.
pub async fn evaluate_condition(
    cond: &Condition,
    ctx: &ExecutionContext,
    evaluator: &ExpressionEvaluator,
) -> Result<bool, NodeError> {
    let actual = if cond.variable.trim().is_empty() {
        None
    } else {
        resolve_reference(&cond.variable, ctx)
    };

    if cond.operator == ComparisonOperator::JsExpression {
        let expr = match &cond.value {
            Value::String(s) if !s.trim().is_empty() => s.clone(),
            _ => cond.variable.clone(),
        };
        let mut bindings = ctx.bindings();
        if let Some(target) = &actual {
            if cond.value.is_string() {
                bindings.insert("input".to_string(), target.clone());
            }
        }
        let hit = evaluator.evaluate_bool(&expr, &bindings).await?;
        debug!(expression = %expr, result = hit, "js_expression evaluated");
        return Ok(hit);
    }

    let expected = resolve_value_spec(&cond.value, ctx);
    compare(&cond.operator, actual.as_ref(), &expected)
}
