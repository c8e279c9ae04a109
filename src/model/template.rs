//! Versioned HTML/CSS templates.

use crate::model::draft::CssRules;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,
    pub name: Option<String>,
    pub version: String,
    pub is_public: bool,
    pub is_default: bool,
    /// Handlebars source.
    pub html_template: String,
    pub custom_css: CssRules,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Cache key that changes whenever the template content is rewritten.
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.version, self.updated_at.timestamp_micros())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub version: String,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Template> for TemplateSummary {
    fn from(t: &Template) -> Self {
        TemplateSummary {
            id: t.id,
            name: t.name.clone(),
            version: t.version.clone(),
            is_default: t.is_default,
            updated_at: t.updated_at,
        }
    }
}

/// Insert-or-replace payload keyed by `version`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpsert {
    pub name: Option<String>,
    pub version: String,
    pub html_template: String,
    #[serde(default)]
    pub custom_css: CssRules,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

/// Orders version strings by dot-separated numeric segments ("0.10" > "0.9"); non-numeric segments compare as text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Highest version among `templates`, by [`compare_versions`].
pub fn latest<'a, I>(templates: I) -> Option<&'a Template>
where
    I: IntoIterator<Item = &'a Template>,
{
    templates
        .into_iter()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}
