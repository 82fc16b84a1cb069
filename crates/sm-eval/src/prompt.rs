//! Correction prompt construction
//!
//! The initial prompt is rendered once per instance from a minijinja
//! template; feedback from failed attempts is appended to it and never
//! removed, so every generator call sees the full attempt history.

use crate::error::EvalResult;
use minijinja::{context, Environment};
use sm_core::Instance;

/// Built-in correction prompt
pub const DEFAULT_TEMPLATE: &str = "Think step by step about how to correct the SQL query.

Only output the corrected SQL query. Do not include any explanations, reasoning, or extra text.

Database: {{ database }}

Query: {{ query }}

Erroneous PSQL Query:
{{ error_sql }}
";

/// Renders the initial prompt for an instance
///
/// Template variables: `database`, `query`, `error_sql` (the instance's
/// `error_sql` entries joined by newlines) and `instance_id`.
pub struct PromptBuilder {
    env: Environment<'static>,
    source: String,
}

impl PromptBuilder {
    /// Builder using [`DEFAULT_TEMPLATE`]
    pub fn new() -> Self {
        Self::build(DEFAULT_TEMPLATE.to_string())
    }

    /// Builder using a custom template, checked for syntax errors up front
    pub fn with_template(source: impl Into<String>) -> EvalResult<Self> {
        let source = source.into();
        Environment::new().template_from_str(&source)?;
        Ok(Self::build(source))
    }

    fn build(source: String) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        Self { env, source }
    }

    /// Render the initial prompt context for `instance`
    pub fn initial(&self, instance: &Instance) -> EvalResult<PromptContext> {
        let text = self.env.render_str(
            &self.source,
            context! {
                instance_id => instance.instance_id.get(),
                database => &instance.selected_database,
                query => &instance.query,
                error_sql => instance.error_sql.join("\n"),
            },
        )?;
        Ok(PromptContext::new(text))
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prompt text plus accumulated feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    initial: String,
    feedback: Vec<String>,
}

impl PromptContext {
    /// Context with no feedback yet
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            initial: initial.into(),
            feedback: Vec::new(),
        }
    }

    /// Append what the attempt at `step` observed
    pub fn push_feedback(&mut self, step: usize, observed: &str) {
        self.feedback.push(format!(
            "\nResults from previous correction attempt at step {step}:\n{observed}"
        ));
    }

    /// Number of feedback blocks appended so far
    pub fn feedback_count(&self) -> usize {
        self.feedback.len()
    }

    /// Full prompt text sent to the generator
    pub fn render(&self) -> String {
        let mut text = self.initial.clone();
        for block in &self.feedback {
            text.push_str(block);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;

    fn instance() -> Instance {
        let mut instance = Instance::new(3u64);
        instance.selected_database = "shop".to_string();
        instance.query = "Total revenue per customer".to_string();
        instance.error_sql = vec![
            "SELEC id FROM orders".to_string(),
            "syntax error at or near \"SELEC\"".to_string(),
        ];
        instance
    }

    #[test]
    fn test_default_prompt() {
        let prompt = PromptBuilder::new().initial(&instance()).unwrap().render();
        assert!(prompt.starts_with("Think step by step about how to correct the SQL query.\n\n"));
        assert!(prompt.contains("\n\nDatabase: shop\n\nQuery: Total revenue per customer\n\n"));
        assert!(prompt.ends_with(
            "Erroneous PSQL Query:\nSELEC id FROM orders\nsyntax error at or near \"SELEC\"\n"
        ));
    }

    #[test]
    fn test_feedback_accumulates() {
        let mut ctx = PromptBuilder::new().initial(&instance()).unwrap();
        let base = ctx.render();
        ctx.push_feedback(0, "(1,)");
        ctx.push_feedback(1, "LINE 1: SELEC");

        assert_eq!(ctx.feedback_count(), 2);
        assert_eq!(
            ctx.render(),
            format!(
                "{base}\nResults from previous correction attempt at step 0:\n(1,)\
                 \nResults from previous correction attempt at step 1:\nLINE 1: SELEC"
            )
        );
    }

    #[test]
    fn test_custom_template() {
        let builder = PromptBuilder::with_template("Fix #{{ instance_id }} on {{ database }}").unwrap();
        assert_eq!(builder.initial(&instance()).unwrap().render(), "Fix #3 on shop");
    }

    #[test]
    fn test_invalid_template() {
        let err = PromptBuilder::with_template("{% if %}").err().unwrap();
        assert!(matches!(err, EvalError::Prompt(_)));
    }
}
