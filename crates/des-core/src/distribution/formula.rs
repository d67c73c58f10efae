//! Formula-string tokenizer: `NAME(arg, arg, "quoted arg")` → name + args.
//!
//! Grounded on `original_source/python/src/distributions/formula_parser.py`:
//! the function name is everything before the first `(`, arguments are
//! comma-separated but commas inside a quoted argument don't split it.

use crate::errors::CoreError;

pub struct ParsedFormula {
    pub name: String,
    pub args: Vec<String>,
}

pub fn tokenize(formula: &str) -> Result<ParsedFormula, CoreError> {
    let trimmed = formula.trim();
    let open = trimmed.find('(').ok_or_else(|| CoreError::MalformedFormula {
        formula: formula.to_string(),
        reason: "missing '('".to_string(),
    })?;
    if !trimmed.ends_with(')') {
        return Err(CoreError::MalformedFormula {
            formula: formula.to_string(),
            reason: "missing trailing ')'".to_string(),
        });
    }
    let name = trimmed[..open].trim().to_uppercase();
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let args = split_args(inner);
    Ok(ParsedFormula { name, args })
}

/// Splits a comma-separated argument list, treating `'...'`/`"..."` spans as
/// atomic so a quoted value may itself contain commas.
fn split_args(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in inner.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch == ',' => {
                args.push(current.trim().to_string());
                current = String::new();
            }
            None => current.push(ch),
        }
    }
    args.push(current.trim().to_string());
    args
}

/// Strips a single layer of matching quotes from a raw argument token.
pub fn unquote(arg: &str) -> &str {
    let bytes = arg.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return &arg[1..arg.len() - 1];
        }
    }
    arg
}

pub fn parse_f64(arg: &str, formula: &str) -> Result<f64, CoreError> {
    unquote(arg)
        .trim()
        .parse::<f64>()
        .map_err(|_| CoreError::MalformedFormula {
            formula: formula.to_string(),
            reason: format!("argument '{}' is not a number", arg),
        })
}
