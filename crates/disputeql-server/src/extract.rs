//! Pull a single dataset expression out of free-form model output

use crate::prompt::DATASET_NAME;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression used when nothing usable was generated
pub const FALLBACK_EXPRESSION: &str = "df_combined.head()";

const QUOTES: [char; 3] = ['\'', '"', '`'];

/// One candidate expression; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryExpression(String);

impl QueryExpression {
    pub fn fallback() -> Self {
        Self(FALLBACK_EXPRESSION.to_string())
    }

    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_EXPRESSION
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drop everything through the first arrow
fn strip_arrow_label(line: &str) -> &str {
    let unicode = line.find('→').map(|i| i + '→'.len_utf8());
    let ascii = line.find("->").map(|i| i + 2);
    let cut = match (unicode, ascii) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    match cut {
        Some(end) => line[end..].trim_start(),
        None => line,
    }
}

/// Drop a `label:` prefix; the colon must end the line or precede whitespace
fn strip_colon_label(line: &str) -> &str {
    for (i, _) in line.match_indices(':') {
        let rest = &line[i + 1..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return rest.trim_start();
        }
    }
    line
}

/// Remove matching quote pairs around the whole line
///
/// A lone quote at one end is left alone, so a trailing string literal such
/// as `!= 'Auto-refund'` survives.
fn strip_enclosing_quotes(mut line: &str) -> &str {
    loop {
        let mut chars = line.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) if first == last && QUOTES.contains(&first) => {
                line = line[first.len_utf8()..line.len() - last.len_utf8()].trim();
            }
            _ => return line,
        }
    }
}

fn is_candidate(line: &str) -> bool {
    line.contains(DATASET_NAME) || line.starts_with("len(") || line.starts_with("pd.")
}

/// Extract the expression from generated text, falling back to a preview
pub fn extract(generated: &str) -> QueryExpression {
    let kept: Vec<&str> = generated
        .lines()
        .map(|line| strip_colon_label(strip_arrow_label(line)).trim())
        .filter(|line| !line.is_empty())
        .filter(|line| is_candidate(line))
        .map(strip_enclosing_quotes)
        .filter(|line| !line.is_empty())
        .collect();

    if kept.is_empty() {
        QueryExpression::fallback()
    } else {
        QueryExpression(kept.join(" "))
    }
}
