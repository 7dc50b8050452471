//! Extraction of tagged equations from declarative solutions.
//!
//! The generator wraps every step in double brackets and tags it:
//! `[[eq1: cost = 3 * price]] ... [[answer: cost]]`. Extraction turns that
//! into a flat list the solver accepts: `"1 cost = 3 * price, cost = ?"`.

use regex::Regex;
use std::sync::LazyLock;

static FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[.*?\]\]").expect("fragment pattern is valid"));

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s=+\-*/()0-9.\[\]]").expect("character filter pattern is valid")
});

/// Extract the normalized equation set from a prediction.
///
/// Returns the prediction unchanged when it holds no `[[...]]` fragment; the
/// solver then treats the whole text as one expression attempt.
pub fn extract_equations(prediction: &str) -> String {
    let fragments: Vec<String> = FRAGMENT
        .find_iter(prediction)
        .map(|m| clean_fragment(m.as_str()))
        .collect();

    if fragments.is_empty() {
        return prediction.to_string();
    }

    flatten_tagged(&unwrap_fragments(&fragments))
}

/// Remove stray punctuation and markdown noise.
fn clean_fragment(fragment: &str) -> String {
    DISALLOWED.replace_all(fragment, "").into_owned()
}

/// Strip the two bracket characters on each side and join with `", "`.
fn unwrap_fragments(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|f| strip_wrapper(f))
        .collect::<Vec<_>>()
        .join(", ")
}

fn strip_wrapper(fragment: &str) -> &str {
    let chars: Vec<(usize, char)> = fragment.char_indices().collect();
    if chars.len() <= 4 {
        return "";
    }
    let start = chars[2].0;
    let end = chars[chars.len() - 2].0;
    &fragment[start..end]
}

/// Turn `eq`/`answer` tagged tokens into plain equations.
fn flatten_tagged(joined: &str) -> String {
    joined
        .split(',')
        .filter_map(|token| {
            if let Some(pos) = token.find("eq") {
                Some(token[pos + "eq".len()..].to_string())
            } else {
                token
                    .find("answer")
                    .map(|pos| format!("{} = ?", token[pos + "answer".len()..].trim()))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
