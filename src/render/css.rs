//! Serialize selector → properties maps into a stylesheet.

use crate::model::CssRules;
use serde_json::Value;

/// Later maps replace earlier ones per selector.
pub fn overlay(base: &CssRules, over: &CssRules) -> CssRules {
    let mut out = base.clone();
    for (selector, body) in over {
        out.insert(selector.clone(), body.clone());
    }
    out
}

/// Plain selectors first, at-rules (`@media`, `@supports`) after them so they win the cascade
/// regardless of how the map was stored. Entries containing `<` are dropped.
pub fn generate_css(rules: &CssRules) -> String {
    let mut css = String::new();
    let (at_rules, plain): (Vec<_>, Vec<_>) = rules.iter().partition(|(sel, _)| sel.starts_with('@'));
    for (selector, body) in plain.into_iter().chain(at_rules) {
        write_rule(&mut css, selector, body, 0);
    }
    css
}

fn write_rule(css: &mut String, selector: &str, body: &Value, depth: usize) {
    let Some(props) = body.as_object() else {
        tracing::debug!(selector, "skipping css rule whose body is not an object");
        return;
    };
    if selector.contains('<') {
        tracing::warn!(selector, "skipping css selector containing '<'");
        return;
    }
    let indent = "  ".repeat(depth);
    css.push_str(&format!("{}{} {{\n", indent, selector));
    for (property, value) in props {
        match value {
            Value::Object(_) => write_rule(css, property, value, depth + 1),
            _ => {
                if let Some(v) = declaration_value(value) {
                    if property.contains('<') || v.contains('<') {
                        tracing::warn!(selector, property, "skipping css declaration containing '<'");
                        continue;
                    }
                    css.push_str(&format!("{}  {}: {};\n", indent, property, v));
                }
            }
        }
    }
    css.push_str(&format!("{}}}\n", indent));
}

fn declaration_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(v: Value) -> CssRules {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn serializes_flat_rules() {
        let css = generate_css(&rules(json!({
            ".price": {"font-size": "20px", "z-index": 2}
        })));
        assert_eq!(css, ".price {\n  font-size: 20px;\n  z-index: 2;\n}\n");
    }

    #[test]
    fn nests_at_rules_and_emits_them_last() {
        let css = generate_css(&rules(json!({
            "@media (max-width: 768px)": {".product-column": {"flex-basis": "100%"}},
            ".product-column": {"flex": "1 1 300px"}
        })));
        assert_eq!(
            css,
            ".product-column {\n  flex: 1 1 300px;\n}\n@media (max-width: 768px) {\n  .product-column {\n    flex-basis: 100%;\n  }\n}\n"
        );
    }

    #[test]
    fn drops_markup_injection() {
        let css = generate_css(&rules(json!({
            "h3": {"color": "red</style><script>"},
            "</style>": {"color": "blue"}
        })));
        assert_eq!(css, "h3 {\n}\n");
    }

    #[test]
    fn overlay_replaces_whole_selectors() {
        let base = rules(json!({".a": {"color": "red", "margin": "0"}, ".b": {"color": "green"}}));
        let over = rules(json!({".a": {"color": "blue"}}));
        let merged = overlay(&base, &over);
        assert_eq!(merged[".a"], json!({"color": "blue"}));
        assert_eq!(merged[".b"], json!({"color": "green"}));
    }
}
