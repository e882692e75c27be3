use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    /// Tags with no value, in order of first appearance. They stay in the
    /// text verbatim.
    pub missing: Vec<String>,
}

/// Substitutes `{{tag}}` placeholders from `values`.
pub fn render(template: &str, values: &HashMap<&str, String>) -> RenderedPrompt {
    let mut missing: Vec<String> = Vec::new();
    let text = PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let tag = &caps[1];
            match values.get(tag) {
                Some(value) => value.clone(),
                None => {
                    if !missing.iter().any(|m| m == tag) {
                        missing.push(tag.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    RenderedPrompt { text, missing }
}

/// Tags referenced by a template, deduplicated, in order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let tag = &caps[1];
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_tags() {
        let rendered = render(
            "Guide:\n{{guide}}\nTopic: {{ topic }}",
            &values(&[("guide", "be brief"), ("topic", "rust")]),
        );
        assert_eq!(rendered.text, "Guide:\nbe brief\nTopic: rust");
        assert!(rendered.missing.is_empty());
    }

    #[test]
    fn unknown_tags_are_kept_and_reported_once() {
        let rendered = render("{{a}} {{b}} {{a}}", &values(&[("b", "x")]));
        assert_eq!(rendered.text, "{{a}} x {{a}}");
        assert_eq!(rendered.missing, vec!["a".to_string()]);
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let rendered = render("{{guide}}", &values(&[("guide", "{{topic}}"), ("topic", "t")]));
        assert_eq!(rendered.text, "{{topic}}");
    }

    #[test]
    fn lists_placeholders_in_order() {
        assert_eq!(
            placeholders("{{topic}} {{guide}} {{topic}} {single}"),
            vec!["topic".to_string(), "guide".to_string()]
        );
    }
}
