// Resolves a free-text query to one labeled interactive element.
use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};
use crate::llm::labels::{Importance, LabeledElement, UNKNOWN};

const PHRASE_IN_CORE: i64 = 80;
const PHRASE_IN_SECONDARY: i64 = 20;
const EXACT_FIELD: i64 = 20;
const TOKEN_HIT: i64 = 4;
const CORE_TOKEN_BONUS: i64 = 16;
const MIN_TOKEN_COVERAGE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMatch {
    pub index: usize,
    pub score: i64,
    pub element: LabeledElement,
}

fn tokens(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in query.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

/// Lowercased fields joined by spaces; normalization placeholders are skipped.
fn searchable(fields: &[&str]) -> String {
    fields
        .iter()
        .filter(|f| !f.is_empty() && **f != UNKNOWN)
        .map(|f| f.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `None` when the element is excluded from matching.
pub fn score_element(query: &str, element: &LabeledElement) -> Option<i64> {
    let phrase = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if phrase.is_empty() {
        return None;
    }
    let query_tokens = tokens(&phrase);

    let text = element.text.to_lowercase();
    let id = element.id.to_lowercase();
    let core = searchable(&[&element.id, &element.text, &element.element_type, &element.role]);
    let actions = element.likely_actions.join(" ");
    let secondary = searchable(&[&element.grid, &element.actionability, &actions]);

    let mut score = 0;
    let in_core = core.contains(&phrase);
    let in_secondary = secondary.contains(&phrase);
    if in_core {
        score += PHRASE_IN_CORE;
    }
    if in_secondary {
        score += PHRASE_IN_SECONDARY;
    }
    if text == phrase {
        score += EXACT_FIELD;
    }
    if id == phrase {
        score += EXACT_FIELD;
    }

    let mut covered = 0usize;
    for token in &query_tokens {
        if core.contains(token.as_str()) {
            score += TOKEN_HIT + CORE_TOKEN_BONUS;
            covered += 1;
        } else if secondary.contains(token.as_str()) {
            score += TOKEN_HIT;
            covered += 1;
        }
    }

    let coverage = if query_tokens.is_empty() {
        0.0
    } else {
        covered as f64 / query_tokens.len() as f64
    };
    if !in_core && !in_secondary && coverage < MIN_TOKEN_COVERAGE {
        return None;
    }

    score += match element.importance {
        Importance::Critical => 2,
        Importance::High => 1,
        Importance::Medium | Importance::Low => 0,
    };
    Some(score)
}

/// Highest score above zero wins; on ties the earlier element is kept.
pub fn find_best_match(query: &str, elements: &[LabeledElement]) -> GridLensResult<ElementMatch> {
    if query.trim().is_empty() {
        return Err(GridLensError::InvalidArgument("query is empty".into()));
    }
    let mut best: Option<(usize, i64)> = None;
    for (index, element) in elements.iter().enumerate() {
        let Some(score) = score_element(query, element) else {
            continue;
        };
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, score)) => {
            tracing::debug!(query, index, score, "element matched");
            Ok(ElementMatch {
                index,
                score,
                element: elements[index].clone(),
            })
        }
        None => Err(GridLensError::NoMatchFound(query.to_string())),
    }
}
