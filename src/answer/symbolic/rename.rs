//! Renaming of multi-character variable names to single letters.
//!
//! The parser reads adjacent letters as a product, so `price` has to become
//! a single letter before the equations are parsed.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::LazyLock;
use thiserror::Error;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z_]\w*\b").expect("identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenameError {
    #[error("no single-letter name left for '{0}'")]
    Exhausted(String),
}

/// Single letters still free for assignment, `a`-`z` then `A`-`Z`.
///
/// Local to one renaming call.
#[derive(Debug)]
pub struct LetterPool {
    available: VecDeque<char>,
}

impl LetterPool {
    /// Pool of all letters not in `taken`.
    pub fn excluding(taken: &BTreeSet<String>) -> Self {
        let available = ('a'..='z')
            .chain('A'..='Z')
            .filter(|c| !taken.contains(c.to_string().as_str()))
            .collect();
        Self { available }
    }

    pub fn take(&mut self) -> Option<char> {
        self.available.pop_front()
    }
}

/// Long variable name to assigned letter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMapping(BTreeMap<String, char>);

impl VariableMapping {
    pub fn get(&self, long_name: &str) -> Option<char> {
        self.0.get(long_name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, char)> {
        self.0.iter().map(|(name, &letter)| (name.as_str(), letter))
    }
}

/// All word-like identifiers in `text`.
pub fn identifiers(text: &str) -> BTreeSet<String> {
    IDENTIFIER
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Rewrite every identifier longer than one character to an unused letter.
///
/// Substitution is whole-word only.
pub fn simplify_variables(equations: &str) -> Result<(String, VariableMapping), RenameError> {
    let names = identifiers(equations);
    let mut pool = LetterPool::excluding(&names);
    let mut mapping = BTreeMap::new();

    for name in names.iter().filter(|n| n.chars().count() > 1) {
        let letter = pool
            .take()
            .ok_or_else(|| RenameError::Exhausted(name.clone()))?;
        mapping.insert(name.clone(), letter);
    }

    let mut renamed = equations.to_string();
    for (name, letter) in &mapping {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
            .expect("escaped identifier pattern is valid");
        renamed = pattern
            .replace_all(&renamed, letter.to_string().as_str())
            .into_owned();
    }

    Ok((renamed, VariableMapping(mapping)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_long_names_replaced_whole_word() {
        let (renamed, mapping) =
            simplify_variables("apples = 3, pears = apples + 2, x = pears * 2").unwrap();
        assert_eq!(mapping.len(), 2);
        let a = mapping.get("apples").unwrap();
        let p = mapping.get("pears").unwrap();
        assert_eq!(
            renamed,
            format!("{a} = 3, {p} = {a} + 2, x = {p} * 2")
        );
    }

    #[test]
    fn test_assigned_letters_avoid_existing_single_letters() {
        let (_, mapping) = simplify_variables("a + b = total, c = total2").unwrap();
        let used: HashSet<char> = mapping.iter().map(|(_, l)| l).collect();
        assert!(!used.contains(&'a'));
        assert!(!used.contains(&'b'));
        assert!(!used.contains(&'c'));
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn test_mapping_is_injective() {
        let names: Vec<String> = (0..26).map(|i| format!("var{i}")).collect();
        let text = names.join(" + ");
        let (_, mapping) = simplify_variables(&text).unwrap();
        let letters: HashSet<char> = mapping.iter().map(|(_, l)| l).collect();
        assert_eq!(letters.len(), 26);
    }

    #[test]
    fn test_uppercase_used_after_lowercase() {
        let names: Vec<String> = (0..30).map(|i| format!("v{i}")).collect();
        let (_, mapping) = simplify_variables(&names.join(" + ")).unwrap();
        let upper = mapping.iter().filter(|(_, l)| l.is_ascii_uppercase()).count();
        assert_eq!(upper, 4);
    }

    #[test]
    fn test_pool_exhaustion() {
        let names: Vec<String> = (0..53).map(|i| format!("n{i}")).collect();
        let err = simplify_variables(&names.join(" + ")).unwrap_err();
        assert!(matches!(err, RenameError::Exhausted(_)));
    }

    #[test]
    fn test_substring_names_untouched() {
        let (renamed, mapping) = simplify_variables("cost = 2, costs = cost + 1").unwrap();
        let c = mapping.get("cost").unwrap();
        let cs = mapping.get("costs").unwrap();
        assert_ne!(c, cs);
        assert_eq!(renamed, format!("{c} = 2, {cs} = {c} + 1"));
    }

    #[test]
    fn test_no_long_names() {
        let (renamed, mapping) = simplify_variables("x + 2 = 5").unwrap();
        assert!(mapping.is_empty());
        assert_eq!(renamed, "x + 2 = 5");
    }

    #[test]
    fn test_pool_skips_taken_letters() {
        let taken: BTreeSet<String> = ["a", "Z", "word"].iter().map(|s| s.to_string()).collect();
        let mut pool = LetterPool::excluding(&taken);
        assert_eq!(pool.take(), Some('b'));

        let rest: Vec<char> = std::iter::from_fn(|| pool.take()).collect();
        assert_eq!(rest.len(), 49);
        assert_eq!(rest.last(), Some(&'Y'));
    }
}
