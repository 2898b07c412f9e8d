// src/env/reward.rs
//! Exact-match scoring of the final `<answer>` against the ground truth.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Accepted answers for one sample.
///
/// Deserializes from `{"target": "x"}`, `{"target": ["x", "y"]}`, or a bare
/// string or list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroundTruthRepr")]
pub struct GroundTruth {
    pub target: Vec<String>,
}

impl GroundTruth {
    pub fn new(target: Vec<String>) -> Self {
        Self { target }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroundTruthRepr {
    Wrapped { target: OneOrMany },
    Bare(OneOrMany),
}

impl From<GroundTruthRepr> for GroundTruth {
    fn from(repr: GroundTruthRepr) -> Self {
        let target = match repr {
            GroundTruthRepr::Wrapped { target } => target.into(),
            GroundTruthRepr::Bare(target) => target.into(),
        };
        GroundTruth { target }
    }
}

fn answer_regex() -> &'static Regex {
    static ANSWER_REGEX: OnceLock<Regex> = OnceLock::new();
    ANSWER_REGEX.get_or_init(|| {
        Regex::new(r"(?s)<answer>(.*?)</answer>").expect("answer pattern is valid")
    })
}

fn articles_regex() -> &'static Regex {
    static ARTICLES_REGEX: OnceLock<Regex> = OnceLock::new();
    ARTICLES_REGEX
        .get_or_init(|| Regex::new(r"\b(a|an|the)\b").expect("articles pattern is valid"))
}

/// Content of the last `<answer>...</answer>` pair, trimmed
pub fn extract_answer(text: &str) -> Option<&str> {
    answer_regex()
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Lowercase, drop punctuation and articles, collapse whitespace
pub fn normalize_answer(text: &str) -> String {
    let lower = text.to_lowercase();
    let no_punct: String = lower.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    let no_articles = articles_regex().replace_all(&no_punct, " ");
    no_articles.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `prediction` matches any of `targets` after normalization
pub fn exact_match(prediction: &str, targets: &[String]) -> bool {
    let prediction = normalize_answer(prediction);
    targets
        .iter()
        .any(|target| normalize_answer(target) == prediction)
}

/// 1.0 when the last answer in `text` matches the ground truth, else 0.0
pub fn compute_score(text: &str, ground_truth: &GroundTruth) -> f64 {
    match extract_answer(text) {
        Some(answer) if exact_match(answer, &ground_truth.target) => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ground_truth_shapes() {
        let one: GroundTruth = serde_json::from_value(json!({"target": "Paris"})).unwrap();
        let many: GroundTruth = serde_json::from_value(json!({"target": ["Paris", "paris, france"]})).unwrap();
        let bare: GroundTruth = serde_json::from_value(json!("Paris")).unwrap();
        let list: GroundTruth = serde_json::from_value(json!(["Paris"])).unwrap();
        assert_eq!(one.target, vec!["Paris"]);
        assert_eq!(many.target.len(), 2);
        assert_eq!(bare, one);
        assert_eq!(list, one);
    }

    #[test]
    fn extracts_last_answer() {
        let text = "<answer>first</answer> more <answer>\n second \n</answer>";
        assert_eq!(extract_answer(text), Some("second"));
        assert_eq!(extract_answer("no answer here"), None);
        assert_eq!(extract_answer("<answer>unterminated"), None);
    }

    #[test]
    fn normalizes_like_squad() {
        assert_eq!(normalize_answer("The  Eiffel Tower!"), "eiffel tower");
        assert_eq!(normalize_answer("an apple, a day"), "apple day");
        assert_eq!(normalize_answer("Theatre"), "theatre");
    }

    #[test]
    fn scores_exact_match() {
        let truth = GroundTruth::new(vec!["Paris".to_string(), "City of Light".to_string()]);
        assert_eq!(compute_score("...<answer>paris.</answer>", &truth), 1.0);
        assert_eq!(compute_score("<answer>the city of light</answer>", &truth), 1.0);
        assert_eq!(compute_score("<answer>London</answer>", &truth), 0.0);
        assert_eq!(compute_score("Paris", &truth), 0.0);
    }
}
