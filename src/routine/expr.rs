//! Routine expression parsing.
//!
//! A routine string is parsed once into a [`RoutineExpr`]:
//! - `parallel a b`, `sequence a b`: named sub-routines
//! - `every build test !legacy`: run routines in every sub-project,
//!   excluding projects by name with `!`
//! - `a && b`: sequence shorthand
//! - `a & b`: parallel shorthand
//! - anything else: a literal shell command
//!
//! The shorthand operators are only recognised outside quotes, and `&` that
//! belongs to a redirection (`2>&1`, `&>file`) is not an operator.

/// Parsed form of a routine command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineExpr {
    /// Raw shell command
    Literal(String),
    /// `parallel <names>`
    Parallel(Vec<String>),
    /// `sequence <names>`
    Sequence(Vec<String>),
    /// `every <routines> [!<project>...]`
    Every {
        /// Routine names to run in each project
        include: Vec<String>,
        /// Project names to skip
        exclude: Vec<String>,
    },
    /// `a && b`, parts are routine names or literal commands
    ShorthandAnd(Vec<String>),
    /// `a & b`, parts are routine names or literal commands
    ShorthandAmp(Vec<String>),
}

impl RoutineExpr {
    /// Parse a routine command string.
    pub fn parse(command: &str) -> Self {
        let trimmed = command.trim();

        if let Some(rest) = trimmed.strip_prefix("parallel ") {
            return Self::Parallel(words(rest));
        }
        if let Some(rest) = trimmed.strip_prefix("sequence ") {
            return Self::Sequence(words(rest));
        }
        if let Some(rest) = trimmed.strip_prefix("every ") {
            let (exclude, include): (Vec<String>, Vec<String>) =
                words(rest).into_iter().partition(|w| w.starts_with('!'));
            let exclude = exclude
                .into_iter()
                .map(|w| w.trim_start_matches('!').to_string())
                .filter(|w| !w.is_empty())
                .collect();
            return Self::Every { include, exclude };
        }

        if let Some(parts) = split_operator(trimmed, Operator::And) {
            return Self::ShorthandAnd(parts);
        }
        if let Some(parts) = split_operator(trimmed, Operator::Amp) {
            return Self::ShorthandAmp(parts);
        }

        Self::Literal(trimmed.to_string())
    }
}

fn words(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_string).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Amp,
}

/// Split on `op` outside quotes. Returns `None` when `op` does not occur.
fn split_operator(input: &str, op: Operator) -> Option<Vec<String>> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut found = false;
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                if op == Operator::And {
                    found = true;
                    push_part(&mut parts, &current);
                    current.clear();
                } else {
                    current.push_str("&&");
                }
                i += 1;
            }
            '&' if op == Operator::Amp && !is_redirection(&chars, i) => {
                found = true;
                push_part(&mut parts, &current);
                current.clear();
            }
            _ => current.push(c),
        }
        i += 1;
    }

    if !found {
        return None;
    }

    push_part(&mut parts, &current);
    Some(parts)
}

fn push_part(parts: &mut Vec<String>, part: &str) {
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}

/// `>&`, `<&` and `&>` are redirections, not background operators.
fn is_redirection(chars: &[char], i: usize) -> bool {
    let prev = i.checked_sub(1).and_then(|p| chars.get(p));
    let next = chars.get(i + 1);
    matches!(prev, Some('>' | '<')) || next == Some(&'>')
}
