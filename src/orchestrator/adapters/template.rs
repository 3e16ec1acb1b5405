//! `minijinja` response formatting.

use crate::{
    orchestrator::{domain::OrchestratorConfig, ports::ResponseFormatter},
    protocol::domain::{AgentFault, ResultStatus, WorkerResult},
};
use minijinja::Environment;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const ANSWER_TEMPLATE: &str = "{{ message }}";
const NEEDS_INFO_TEMPLATE: &str = "I need a bit more information: \
    {% for field in required %}{{ field.description }}{% if not loop.last %}, {% endif %}{% endfor %}.";

/// Renders worker results through per-intent templates.
///
/// Templates see `intent`, `status`, `data`, `required` and `message`, a
/// plain-text summary of `data`. Intents without a template render
/// `message`, or a request for the missing fields when the worker needs
/// more information.
///
/// # Examples
///
/// ```
/// use concierge::orchestrator::{adapters::TemplateFormatter, ports::ResponseFormatter};
/// use concierge::protocol::domain::WorkerResult;
/// use serde_json::json;
///
/// let formatter = TemplateFormatter::new()
///     .with_template("billing.balance", "Your balance is {{ data.balance }} {{ data.currency }}.");
/// let text = formatter
///     .format("billing.balance", &WorkerResult::success(json!({"balance": 42, "currency": "EUR"})))
///     .expect("renders");
/// assert_eq!(text, "Your balance is 42 EUR.");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateFormatter {
    templates: BTreeMap<String, String>,
}

impl TemplateFormatter {
    /// Creates a formatter with only the built-in templates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a formatter using the configured per-intent templates.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            templates: config.templates.clone(),
        }
    }

    /// Adds or replaces the template for `intent`.
    #[must_use]
    pub fn with_template(mut self, intent: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(intent.into(), source.into());
        self
    }

    fn template_for(&self, intent: &str, status: ResultStatus) -> &str {
        self.templates.get(intent).map_or_else(
            || match status {
                ResultStatus::NeedsInfo => NEEDS_INFO_TEMPLATE,
                _ => ANSWER_TEMPLATE,
            },
            String::as_str,
        )
    }
}

impl ResponseFormatter for TemplateFormatter {
    fn format(&self, intent: &str, result: &WorkerResult) -> Result<String, AgentFault> {
        if result.is_error() {
            return Err(result
                .clone()
                .into_fault()
                .unwrap_or_else(|| AgentFault::internal("worker reported an error")));
        }
        let template = self.template_for(intent, result.status);
        let context = build_template_context(intent, result)?;
        Environment::new()
            .render_str(template, context)
            .map(|text| text.trim().to_owned())
            .map_err(|error| {
                AgentFault::internal(format!("template for intent '{intent}' failed: {error}"))
            })
    }
}

fn build_template_context(
    intent: &str,
    result: &WorkerResult,
) -> Result<Map<String, Value>, AgentFault> {
    let encode = |value: Result<Value, serde_json::Error>| {
        value.map_err(|error| AgentFault::internal(format!("result not encodable: {error}")))
    };
    let mut context = Map::new();
    context.insert("intent".to_owned(), Value::String(intent.to_owned()));
    context.insert("status".to_owned(), encode(serde_json::to_value(result.status))?);
    context.insert(
        "data".to_owned(),
        result.data.clone().unwrap_or(Value::Null),
    );
    context.insert(
        "required".to_owned(),
        encode(serde_json::to_value(&result.required))?,
    );
    context.insert(
        "message".to_owned(),
        Value::String(summarize(result.data.as_ref())),
    );
    Ok(context)
}

/// Plain-text summary of result data: a string as is, an object's
/// `message` field, otherwise compact JSON.
fn summarize(data: Option<&Value>) -> String {
    match data {
        None | Some(Value::Null) => "Done.".to_owned(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(fields)) => fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| Value::Object(fields.clone()).to_string(), str::to_owned),
        Some(other) => other.to_string(),
    }
}
