//! Handlebars-backed renderer with a per-template-version compile cache.

use crate::error::AppError;
use crate::model::{PublishedData, Template};
use crate::render::context::RenderContext;
use crate::render::css::{generate_css, overlay};
use crate::render::currency::format_currency;
use handlebars::{handlebars_helper, Handlebars};
use std::sync::RwLock;

handlebars_helper!(format_currency_helper: |amount: i64, currency: str| format_currency(amount, currency));

/// Output of one render: the stylesheet and the markup, plus the combined embed snippet.
#[derive(Clone, Debug)]
pub struct RenderedTable {
    pub css: String,
    pub html: String,
}

impl RenderedTable {
    /// `<style>` block followed by the markup.
    pub fn to_embed(&self) -> String {
        format!("<style>\n{}</style>\n{}", self.css, self.html)
    }
}

pub struct RenderEngine {
    registry: RwLock<Handlebars<'static>>,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine {
    pub fn new() -> Self {
        let mut hb = Handlebars::new();
        hb.register_helper("formatCurrency", Box::new(format_currency_helper));
        RenderEngine {
            registry: RwLock::new(hb),
        }
    }

    /// Render `data` with `template`. The snapshot's html override, when set, replaces the
    /// template markup; its css override is laid over the template css.
    pub fn render(&self, template: &Template, data: &PublishedData) -> Result<RenderedTable, AppError> {
        let ctx = RenderContext::build(data);
        let html = match data.html_template.as_deref() {
            Some(source) if !source.trim().is_empty() => self.render_source(source, &ctx)?,
            _ => self.render_cached(template, &ctx)?,
        };
        let css = generate_css(&overlay(&template.custom_css, &data.custom_css));
        Ok(RenderedTable { css, html })
    }

    fn render_source(&self, source: &str, ctx: &RenderContext<'_>) -> Result<String, AppError> {
        let hb = self
            .registry
            .read()
            .map_err(|_| AppError::Internal("template registry lock poisoned".into()))?;
        hb.render_template(source, ctx)
            .map_err(|e| AppError::Template(e.to_string()))
    }

    fn render_cached(&self, template: &Template, ctx: &RenderContext<'_>) -> Result<String, AppError> {
        let key = template.cache_key();
        let cached = self
            .registry
            .read()
            .map_err(|_| AppError::Internal("template registry lock poisoned".into()))?
            .has_template(&key);
        if !cached {
            let mut hb = self
                .registry
                .write()
                .map_err(|_| AppError::Internal("template registry lock poisoned".into()))?;
            let prefix = format!("{}@", template.version);
            let stale: Vec<String> = hb
                .get_templates()
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect();
            for name in stale {
                hb.unregister_template(&name);
            }
            hb.register_template_string(&key, &template.html_template)
                .map_err(|e| AppError::Template(format!("template {}: {}", template.version, e)))?;
            tracing::debug!(version = %template.version, "compiled template");
        }
        let hb = self
            .registry
            .read()
            .map_err(|_| AppError::Internal("template registry lock poisoned".into()))?;
        hb.render(&key, ctx)
            .map_err(|e| AppError::Template(format!("template {}: {}", template.version, e)))
    }
}
