//! Prompt assembly from exemplar files and the chat template.

use crate::answer::FrequencyTable;
use crate::models::{ConcordError, PromptConfig, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static EXEMPLAR_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)exemplars\s*=\s*"""(.*?)""""#).expect("exemplar block pattern is valid")
});

/// The body of an `exemplars = """..."""` block, or the whole content.
///
/// Exemplar files may be Python modules holding the prompt in a string.
pub fn extract_exemplar_block(content: &str) -> &str {
    EXEMPLAR_BLOCK
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str())
}

/// Fill `{user_start}`-style placeholders from the template.
///
/// `{{` and `}}` collapse to single braces; unknown placeholders such as
/// `{number}` are left as written.
pub fn render_template(content: &str, template: &PromptConfig, lead: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                if let Some(value) = placeholder(&tail[1..end], template, lead) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

fn placeholder<'a>(name: &str, template: &'a PromptConfig, lead: &'a str) -> Option<&'a str> {
    let value = match name {
        "system_start" => &template.system_start,
        "system_message" => &template.system_message,
        "system_end" => &template.system_end,
        "user_start" => &template.user_start,
        "user_lead_message" => lead,
        "user_end" => &template.user_end,
        "assistant_start" => &template.assistant_start,
        "assistant_end" => &template.assistant_end,
        _ => return None,
    };
    Some(value)
}

/// Read an exemplar file and render it against the template.
pub fn load_exemplars(path: &Path, template: &PromptConfig, lead: &str) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConcordError::io(format!("reading exemplars {}", path.display()), e)
    })?;
    Ok(render_template(
        extract_exemplar_block(&content),
        template,
        lead,
    ))
}

/// `{exemplars}{question}{user_end}\n{assistant_start}`.
pub fn build_prompt(exemplars: &str, question: &str, template: &PromptConfig) -> String {
    format!(
        "{exemplars}{question}{}\n{}",
        template.user_end, template.assistant_start
    )
}

/// Question for the decider: the problem followed by `C: a, b, c`.
pub fn decider_question(question: &str, candidates: &FrequencyTable) -> String {
    let answers: Vec<&str> = candidates.iter().map(|(a, _)| a.as_str()).collect();
    format!("{question}\nC: {}", answers.join(", "))
}
