//! Template engine for report rendering
//!
//! Uses Tera templates (Jinja2-like). Money arrives in the context as decimal
//! strings and is formatted by the `currency` filter.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tera::{Context, Tera, Value};

use super::types::InvestigationSummary;
use crate::error::EngineResult;

const EXECUTIVE_SUMMARY: &str = "executive_summary.md";

/// Default executive summary template
const EXECUTIVE_SUMMARY_TEMPLATE: &str = include_str!("templates/executive_summary.md");

/// Template engine for rendering reports
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Create a new template engine with the built-in templates
    pub fn new() -> EngineResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(EXECUTIVE_SUMMARY, EXECUTIVE_SUMMARY_TEMPLATE)?;
        Self::register_filters(&mut tera);
        Ok(Self { tera })
    }

    /// Load templates from a directory; built-ins fill any gaps
    pub fn with_directory(template_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let glob_pattern = format!("{}/**/*", template_dir.as_ref().display());
        let mut tera = Tera::new(&glob_pattern)?;

        if !tera.get_template_names().any(|n| n == EXECUTIVE_SUMMARY) {
            tera.add_raw_template(EXECUTIVE_SUMMARY, EXECUTIVE_SUMMARY_TEMPLATE)?;
        }

        Self::register_filters(&mut tera);
        Ok(Self { tera })
    }

    fn register_filters(tera: &mut Tera) {
        tera.register_filter("currency", |value: &Value, _: &HashMap<String, Value>| {
            let amount = match value {
                Value::String(s) => Decimal::from_str(s).ok(),
                Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
                _ => None,
            };
            Ok(match amount {
                Some(amount) => Value::String(format_currency(amount)),
                None => value.clone(),
            })
        });
    }

    pub fn add_template(&mut self, name: &str, content: &str) -> EngineResult<()> {
        self.tera.add_raw_template(name, content)?;
        Ok(())
    }

    /// Render the executive summary as Markdown
    pub fn render_executive_summary(&self, summary: &InvestigationSummary) -> EngineResult<String> {
        self.render(EXECUTIVE_SUMMARY, summary)
    }

    /// Render a summary using a specific template
    pub fn render(&self, template_name: &str, summary: &InvestigationSummary) -> EngineResult<String> {
        let context = self.build_context(summary)?;
        Ok(self.tera.render(template_name, &context)?)
    }

    fn build_context(&self, summary: &InvestigationSummary) -> EngineResult<Context> {
        let mut context = Context::new();
        context.insert("summary", &serde_json::to_value(summary)?);
        context.insert("case", &summary.investigation);
        context.insert("generated_at", &summary.generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
        Ok(context)
    }

    pub fn list_templates(&self) -> Vec<&str> {
        self.tera.get_template_names().collect()
    }
}

/// `$1,234.56`, with a leading minus for negative amounts
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", sign, grouped, cents)
}
