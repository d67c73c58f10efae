//! `{placeholder}` template rendering for the `template` generator
//! (`spec.md` §4.5 step 2), grounded on `original_source`'s
//! `data_generation.py` which fills a Python `str.format(**context)` call
//! from `{'id': row_index + 1, **row}`.
//!
//! `{{`/`}}` are literal braces, as in Python's format mini-language.
//! `{id}` resolves to `row_index + 1` (the Python reference's 1-based row
//! number, not the 0-based count `row_index` carries internally — see
//! `entity.rs`'s call site, which passes the count of existing rows).
//! Any other `{name}` looks up `name` in the row-so-far attribute map.

use des_core::value::AttributeMap;

pub fn render(template: &str, row_index: u64, row: &AttributeMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    key.push(next);
                }
                if !closed {
                    log::warn!("unterminated template placeholder '{{{key}' in '{template}'");
                    out.push('{');
                    out.push_str(&key);
                    continue;
                }
                if key == "id" {
                    out.push_str(&(row_index + 1).to_string());
                } else if let Some(value) = row.get(&key) {
                    out.push_str(&value.to_string());
                } else {
                    log::warn!("template '{template}' references unknown field '{key}'; leaving blank");
                }
            }
            other => out.push(other),
        }
    }
    out
}
