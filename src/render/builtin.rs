//! Templates compiled into the binary and upserted at startup.

use crate::error::AppError;
use crate::model::{CssRules, TemplateUpsert};

const BUILTIN: &[(&str, &str, &str, &str)] = &[
    (
        "Classic",
        "0.1",
        include_str!("../../templates/0.1/table.hbs"),
        include_str!("../../templates/0.1/style.json"),
    ),
    (
        "Default Template",
        "0.2",
        include_str!("../../templates/0.2/table.hbs"),
        include_str!("../../templates/0.2/style.json"),
    ),
];

pub fn builtin_templates() -> Result<Vec<TemplateUpsert>, AppError> {
    BUILTIN
        .iter()
        .map(|(name, version, html, css)| {
            let custom_css: CssRules = serde_json::from_str(css)
                .map_err(|e| AppError::Template(format!("built-in template {} css: {}", version, e)))?;
            Ok(TemplateUpsert {
                name: Some((*name).to_string()),
                version: (*version).to_string(),
                html_template: (*html).to_string(),
                custom_css,
                is_public: true,
            })
        })
        .collect()
}
