//! Name templates for the evaluation directory tree.
//!
//! A template is a string with numbered placeholders, e.g. `ATTR_{0}` or
//! `ATTR_{0}_LVL_{1}_RUN_{2}_EST_{3}.bag`. Matching is against the whole name:
//! every literal segment must line up, and each placeholder captures at least
//! one character. Placeholders capture as little as possible while still
//! letting the remaining literals match, so a token may itself contain the
//! separator characters (`ATTR_1_0` against `ATTR_{0}` yields `1_0`).

use regex::Regex;
use thiserror::Error;

/// Errors building a template. Matching never errors; a mismatch is `None`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unbalanced brace at byte {0} in template '{1}'")]
    UnbalancedBrace(usize, String),

    #[error("placeholder '{{{0}}}' is not a number in template '{1}'")]
    BadPlaceholder(String, String),

    #[error("placeholders in template '{0}' must be numbered 0..n exactly once")]
    NonContiguous(String),

    #[error("invalid template regex: {0}")]
    Regex(String),
}

/// Directory template of the attribute level.
pub const ATTR_DIR: &str = "ATTR_{0}";
/// Directory template of the difficulty level.
pub const LVL_DIR: &str = "LVL_{0}";
/// Directory template of the repetition level.
pub const RUN_DIR: &str = "RUN_{0}";

/// A compiled name template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    regex: Regex,
    /// Placeholder number captured by each regex group, in template order.
    slots: Vec<usize>,
    literals: Vec<String>,
}

impl PathTemplate {
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        let mut literals = Vec::new();
        let mut slots = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::UnbalancedBrace(pos, template.to_string()));
                    }
                    let index: usize = name
                        .trim()
                        .parse()
                        .map_err(|_| TemplateError::BadPlaceholder(name.clone(), template.to_string()))?;
                    literals.push(std::mem::take(&mut literal));
                    slots.push(index);
                }
                '}' => return Err(TemplateError::UnbalancedBrace(pos, template.to_string())),
                c => literal.push(c),
            }
        }
        literals.push(literal);

        let mut seen = slots.clone();
        seen.sort_unstable();
        if seen.iter().enumerate().any(|(i, s)| i != *s) {
            return Err(TemplateError::NonContiguous(template.to_string()));
        }

        let mut pattern = String::from("^");
        for (i, lit) in literals.iter().enumerate() {
            pattern.push_str(&regex::escape(lit));
            if i < slots.len() {
                pattern.push_str("(.+?)");
            }
        }
        pattern.push('$');
        let regex = Regex::new(&pattern).map_err(|e| TemplateError::Regex(e.to_string()))?;

        Ok(Self {
            source: template.to_string(),
            regex,
            slots,
            literals,
        })
    }

    /// Template of a per-run artifact with the given file extension (without dot).
    pub fn artifact(extension: &str) -> Result<Self, TemplateError> {
        Self::new(&format!(
            "ATTR_{{0}}_LVL_{{1}}_RUN_{{2}}_EST_{{3}}.{extension}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of placeholders.
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Match `name` against the template, returning the tokens ordered by placeholder number.
    pub fn parse(&self, name: &str) -> Option<ParameterPath> {
        let caps = self.regex.captures(name)?;
        let mut tokens = vec![String::new(); self.slots.len()];
        for (group, slot) in self.slots.iter().enumerate() {
            tokens[*slot] = caps.get(group + 1)?.as_str().to_string();
        }
        Some(ParameterPath { tokens })
    }

    /// Fill the placeholders with `values` (indexed by placeholder number).
    ///
    /// Returns `None` if the number of values does not match the arity.
    pub fn render(&self, values: &[&str]) -> Option<String> {
        if values.len() != self.slots.len() {
            return None;
        }
        let mut out = String::new();
        for (i, lit) in self.literals.iter().enumerate() {
            out.push_str(lit);
            if let Some(slot) = self.slots.get(i) {
                out.push_str(values[*slot]);
            }
        }
        Some(out)
    }
}

/// Tokens extracted from a name, ordered by placeholder number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPath {
    tokens: Vec<String>,
}

impl ParameterPath {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// Token `index` as an integer; see [`parse_int_token`].
    pub fn int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(parse_int_token)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Parse an integer token, accepting `_` digit separators between digits (`1_000`).
pub fn parse_int_token(token: &str) -> Option<i64> {
    let token = token.trim();
    let digits = token.trim_start_matches(['+', '-']);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned: String = token.chars().filter(|c| *c != '_').collect();
    cleaned.parse().ok()
}
