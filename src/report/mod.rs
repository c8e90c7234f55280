//! Report synthesizer
//!
//! Reads the stored artifacts of one investigation, aggregates them into an
//! [`InvestigationSummary`] and renders that through Tera templates.
//!
//! ```text
//!  analyses ─┐
//!  anomalies ├─▶ SummaryBuilder ─▶ InvestigationSummary ─▶ TemplateEngine ─▶ Markdown
//!  damages  ─┘                                        └──▶ serde_json     ─▶ JSON
//! ```
//!
//! Rendered summaries can be stored as [`ForensicReport`] rows. Stored
//! reports are append-only.

pub mod summary;
pub mod template;
pub mod types;

pub use summary::SummaryBuilder;
pub use template::{format_currency, TemplateEngine};
pub use types::*;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Supported output formats for rendered summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(EngineError::validation(format!("Unsupported output format '{}'", other))),
        }
    }
}

/// Render a summary in the requested format
pub fn render_summary(
    engine: &TemplateEngine,
    summary: &InvestigationSummary,
    format: OutputFormat,
) -> EngineResult<String> {
    match format {
        OutputFormat::Markdown => engine.render_executive_summary(summary),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::NewInvestigation;

    fn summary() -> InvestigationSummary {
        let mut new = NewInvestigation::titled("Expense fraud, Q3");
        new.case_number = Some("FA-2024-017".to_string());
        new.allegations = Some("Controller approved personal expenses".to_string());
        InvestigationSummary::builder(new.into_investigation("owner-1").unwrap()).build()
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("pdf".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.extension(), "json");
    }

    #[test]
    fn test_markdown_summary_sections() {
        let engine = TemplateEngine::new().unwrap();
        let text = render_summary(&engine, &summary(), OutputFormat::Markdown).unwrap();
        assert!(text.starts_with("# Executive Summary: Expense fraud, Q3"));
        assert!(text.contains("FA-2024-017"));
        assert!(text.contains("## Allegations"));
        assert!(text.contains("## Key Findings"));
        assert!(text.contains("$0.00"));
        assert!(text.contains("## Recommendations"));
        assert!(text.contains("1. Obtain supporting documentation"));
    }

    #[test]
    fn test_json_summary() {
        let engine = TemplateEngine::new().unwrap();
        let text = render_summary(&engine, &summary(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["investigation"]["case_number"], "FA-2024-017");
        assert_eq!(value["transactions_analyzed"], 0);
    }
}
