use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{ClassifierCategory, NodeRunResult, QuestionClassifierNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::{parse_config, render_or_input};
use crate::template::render_template;

use super::types::GenerateRequest;
use super::truncate;

#[derive(Debug, PartialEq)]
enum ClassifierDecision {
    Exact(usize),
    Fuzzy(usize),
    NoMatch,
}

/// Executor for `question_classifier` nodes. Selects the outgoing branch whose
/// handle equals the chosen category key.
///
/// A reply that is not a declared key is first matched case-insensitively;
/// failing that the call is repeated with an emphasized instruction, and once
/// retries run out the first category wins.
pub struct QuestionClassifierExecutor;

#[async_trait]
impl NodeExecutor for QuestionClassifierExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: QuestionClassifierNodeData = parse_config("question_classifier", config)?;
        validate_categories(&data.categories)?;
        let model = runtime.model()?;

        let query = render_or_input(data.prompt.as_deref(), input, ctx);
        let instruction = data.instruction.as_deref().map(|i| render_template(i, ctx));
        let system_prompt = build_system_prompt(&data.categories, instruction.as_deref());
        let max_retries = data.max_retries.unwrap_or(runtime.config.classifier_max_retries);

        let mut chosen = None;
        let mut last_reply = String::new();
        for attempt in 0..=max_retries {
            let system = if attempt == 0 {
                system_prompt.clone()
            } else {
                format!(
                    "{}\n\n{}",
                    system_prompt,
                    build_correction(&data.categories, &last_reply)
                )
            };
            let request = GenerateRequest::new(query.clone())
                .with_system(Some(system))
                .with_model(data.model.clone());
            let response = model.generate(request).await?;
            last_reply = response.text;

            match match_category(&last_reply, &data.categories) {
                ClassifierDecision::Exact(i) => {
                    chosen = Some(i);
                    break;
                }
                ClassifierDecision::Fuzzy(i) => {
                    debug!(node_id, reply = %truncate(&last_reply, 80), category = %data.categories[i].key, "fuzzy category match");
                    chosen = Some(i);
                    break;
                }
                ClassifierDecision::NoMatch => {
                    warn!(node_id, attempt, reply = %truncate(&last_reply, 80), "classifier reply matched no category");
                }
            }
        }

        let category = &data.categories[chosen.unwrap_or_else(|| {
            warn!(node_id, fallback = %data.categories[0].key, "falling back to first category");
            0
        })];
        let name = category.name.clone().unwrap_or_else(|| category.key.clone());
        Ok(NodeRunResult::branch(
            json!({ "category": category.key, "categoryName": name }),
            category.key.clone(),
        ))
    }
}

fn validate_categories(categories: &[ClassifierCategory]) -> Result<(), NodeError> {
    if categories.is_empty() {
        return Err(NodeError::ConfigError(
            "question_classifier categories must not be empty".to_string(),
        ));
    }

    let mut keys = HashSet::new();
    for category in categories {
        if category.key.trim().is_empty() {
            return Err(NodeError::ConfigError(
                "question_classifier category key must not be empty".to_string(),
            ));
        }
        if !keys.insert(category.key.as_str()) {
            return Err(NodeError::ConfigError(format!(
                "duplicate question_classifier category key: {}",
                category.key
            )));
        }
    }

    Ok(())
}

fn build_system_prompt(categories: &[ClassifierCategory], instruction: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a text classification engine. Classify the user's text into exactly one category.\n\n",
    );
    prompt.push_str("### Categories\n");
    for category in categories {
        prompt.push_str(&format!("- key: \"{}\"", category.key));
        if let Some(name) = &category.name {
            prompt.push_str(&format!(", name: \"{}\"", name));
        }
        if let Some(description) = category.description.as_deref().filter(|d| !d.trim().is_empty()) {
            prompt.push_str(&format!(", description: {}", description.trim()));
        }
        prompt.push('\n');
    }

    if let Some(instruction) = instruction.filter(|i| !i.trim().is_empty()) {
        prompt.push_str("\n### Instructions\n");
        prompt.push_str(instruction.trim());
        prompt.push('\n');
    }

    prompt.push_str("\n### Output format\nRespond ONLY with the key of the chosen category. No other text.");
    prompt
}

fn build_correction(categories: &[ClassifierCategory], reply: &str) -> String {
    let keys: Vec<&str> = categories.iter().map(|c| c.key.as_str()).collect();
    format!(
        "IMPORTANT: your previous answer \"{}\" is not a valid key. Answer with exactly one of: {}",
        truncate(reply.trim(), 80),
        keys.join(", ")
    )
}

/// Candidate key from a reply: a JSON `category`/`key`/`category_id` field,
/// else the bare text without quotes, code fences or trailing punctuation.
fn extract_candidate(reply: &str) -> String {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .map(|rest| rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest))
        .map(|body| body.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(unfenced) {
        for field in ["category", "key", "category_id", "categoryId"] {
            if let Some(Value::String(s)) = map.get(field) {
                return s.trim().to_string();
            }
        }
    }
    unfenced
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_string()
}

fn match_category(reply: &str, categories: &[ClassifierCategory]) -> ClassifierDecision {
    let candidate = extract_candidate(reply);
    if let Some(i) = categories.iter().position(|c| c.key == candidate) {
        return ClassifierDecision::Exact(i);
    }

    let lowered = candidate.to_lowercase();
    if let Some(i) = categories.iter().position(|c| {
        c.key.to_lowercase() == lowered || c.name.as_deref().map(str::to_lowercase).as_deref() == Some(lowered.as_str())
    }) {
        return ClassifierDecision::Fuzzy(i);
    }

    // A single key mentioned as a whole word somewhere in the reply.
    let words: HashSet<String> = reply
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mentioned: Vec<usize> = categories
        .iter()
        .enumerate()
        .filter(|(_, c)| words.contains(&c.key.to_lowercase()))
        .map(|(i, _)| i)
        .collect();
    match mentioned.as_slice() {
        [only] => ClassifierDecision::Fuzzy(*only),
        _ => ClassifierDecision::NoMatch,
    }
}
