//! C11 Termination Evaluator: parses and evaluates the termination formula
//! grammar from `spec.md` §4.11 / §6.
//!
//! ```text
//! expression := term ('OR' term)*
//! term       := factor ('AND' factor)*
//! factor     := condition | '(' expression ')'
//! condition  := 'TIME' '(' number ')'
//!             | 'ENTITIES' '(' (ident | '*') ',' number ')'
//!             | 'EVENTS' '(' [ident ','] number ')'
//! ```
//!
//! Keywords are matched case-insensitively on whole words; identifiers keep
//! whatever case the user wrote. `EVENTS(table, n)` parses the table
//! argument but — per SPEC_FULL.md §12's note on the source's behavior —
//! ignores it, comparing `n` against the total event count across every
//! table. This is carried over verbatim as an existing quirk, not corrected.

use crate::errors::CoreError;
use crate::time::BaseTimeUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Time(f64),
    Entities { table: Option<String>, count: u64 },
    Events { table: Option<String>, count: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Condition(Condition),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// What the evaluator needs from the running simulation to judge whether a
/// [`Condition`] currently holds.
pub struct TerminationContext<'a> {
    /// Current virtual time, in internal minutes.
    pub now: f64,
    /// The config's base time unit: `TIME(n)` is expressed in this unit, not
    /// minutes (`spec.md` §4.11, `original_source/.../termination/formula.py`
    /// `from_minutes(env.now, base_time_unit)`).
    pub base_time_unit: BaseTimeUnit,
    pub entity_counts: &'a dyn Fn(Option<&str>) -> u64,
    pub event_count: &'a dyn Fn(Option<&str>) -> u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Time,
    Entities,
    Events,
    And,
    Or,
    LParen,
    RParen,
    Comma,
    Star,
    Number(&'a str),
    Ident(&'a str),
}

fn tokenize(formula: &str) -> Result<Vec<Tok<'_>>, CoreError> {
    let mut toks = Vec::new();
    let bytes = formula.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                toks.push(Tok::Number(&formula[start..i]));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < bytes.len() && ((bytes[i] as char).is_alphanumeric() || bytes[i] as char == '_') {
                    i += 1;
                }
                let word = &formula[start..i];
                toks.push(match word.to_ascii_uppercase().as_str() {
                    "TIME" => Tok::Time,
                    "ENTITIES" => Tok::Entities,
                    "EVENTS" => Tok::Events,
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    _ => Tok::Ident(word),
                });
            }
            other => {
                return Err(CoreError::TerminationParseError {
                    position: i,
                    reason: format!("unexpected character '{other}'"),
                })
            }
        }
    }
    Ok(toks)
}

struct Parser<'a> {
    toks: Vec<Tok<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Tok<'a>> {
        self.toks.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Tok<'a>> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Tok<'a>, reason: &str) -> Result<(), CoreError> {
        if self.advance() == Some(want) {
            Ok(())
        } else {
            Err(CoreError::TerminationParseError {
                position: self.pos,
                reason: reason.to_string(),
            })
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.parse_term()?;
        while self.peek() == Some(Tok::Or) {
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.parse_factor()?;
        while self.peek() == Some(Tok::And) {
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, CoreError> {
        match self.peek() {
            Some(Tok::LParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Tok::RParen, "expected ')'")?;
                Ok(inner)
            }
            Some(Tok::Time) => {
                self.advance();
                self.expect(Tok::LParen, "expected '(' after TIME")?;
                let n = self.parse_number()?;
                self.expect(Tok::RParen, "expected ')' after TIME(n")?;
                Ok(Expr::Condition(Condition::Time(n)))
            }
            Some(Tok::Entities) => {
                self.advance();
                self.expect(Tok::LParen, "expected '(' after ENTITIES")?;
                let table = self.parse_table_or_star()?;
                self.expect(Tok::Comma, "expected ',' in ENTITIES(...)")?;
                let n = self.parse_number()?;
                self.expect(Tok::RParen, "expected ')' after ENTITIES(...)")?;
                Ok(Expr::Condition(Condition::Entities {
                    table,
                    count: n as u64,
                }))
            }
            Some(Tok::Events) => {
                self.advance();
                self.expect(Tok::LParen, "expected '(' after EVENTS")?;
                // Optional `ident ,` prefix; EVENTS(n) is also valid.
                let table = match (self.peek(), self.toks.get(self.pos + 1)) {
                    (Some(Tok::Ident(name)), Some(Tok::Comma)) => {
                        self.advance();
                        self.advance();
                        Some(name.to_string())
                    }
                    _ => None,
                };
                let n = self.parse_number()?;
                self.expect(Tok::RParen, "expected ')' after EVENTS(...)")?;
                Ok(Expr::Condition(Condition::Events {
                    table,
                    count: n as u64,
                }))
            }
            _ => Err(CoreError::TerminationParseError {
                position: self.pos,
                reason: "expected TIME/ENTITIES/EVENTS or '('".to_string(),
            }),
        }
    }

    fn parse_table_or_star(&mut self) -> Result<Option<String>, CoreError> {
        match self.advance() {
            Some(Tok::Star) => Ok(None),
            Some(Tok::Ident(name)) => Ok(Some(name.to_string())),
            _ => Err(CoreError::TerminationParseError {
                position: self.pos,
                reason: "expected table name or '*'".to_string(),
            }),
        }
    }

    fn parse_number(&mut self) -> Result<f64, CoreError> {
        match self.advance() {
            Some(Tok::Number(s)) => s.parse::<f64>().map_err(|_| CoreError::TerminationParseError {
                position: self.pos,
                reason: format!("'{s}' is not a number"),
            }),
            _ => Err(CoreError::TerminationParseError {
                position: self.pos,
                reason: "expected a number".to_string(),
            }),
        }
    }
}

/// Default termination when no formula is configured (`spec.md` §4.11):
/// `TIME(999999)`.
pub const DEFAULT_FORMULA: &str = "TIME(999999)";

pub fn parse(formula: &str) -> Result<Expr, CoreError> {
    let toks = tokenize(formula)?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos != parser.toks.len() {
        return Err(CoreError::TerminationParseError {
            position: parser.pos,
            reason: "trailing tokens after a complete expression".to_string(),
        });
    }
    Ok(expr)
}

fn eval_condition(cond: &Condition, ctx: &TerminationContext) -> Option<String> {
    match cond {
        Condition::Time(limit) => {
            let now_in_base_unit = ctx.base_time_unit.from_minutes(ctx.now);
            if now_in_base_unit >= *limit {
                Some(format!("max_time_reached ({} unit)", limit))
            } else {
                None
            }
        }
        Condition::Entities { table, count } => {
            let actual = (ctx.entity_counts)(table.as_deref());
            if actual >= *count {
                let label = table.as_deref().unwrap_or("*");
                Some(format!("max_entities_reached ({count} {label})"))
            } else {
                None
            }
        }
        Condition::Events { count, .. } => {
            // Table argument intentionally ignored; see module docs.
            let actual = (ctx.event_count)(None);
            if actual >= *count {
                Some(format!("max_events_reached ({count} events)"))
            } else {
                None
            }
        }
    }
}

/// Evaluates `expr` against `ctx`, returning the human-readable termination
/// reason for the first satisfied branch under short-circuit OR/AND
/// evaluation, or `None` if the overall expression is still false.
pub fn evaluate(expr: &Expr, ctx: &TerminationContext) -> Option<String> {
    match expr {
        Expr::Condition(cond) => eval_condition(cond, ctx),
        Expr::Or(lhs, rhs) => evaluate(lhs, ctx).or_else(|| evaluate(rhs, ctx)),
        Expr::And(lhs, rhs) => {
            let left = evaluate(lhs, ctx)?;
            let right = evaluate(rhs, ctx)?;
            Some(format!("{left} and {right}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(now: f64, entities: u64, events: u64) -> TerminationContext<'static> {
        ctx_with_unit(now, entities, events, BaseTimeUnit::Minutes)
    }

    fn ctx_with_unit(now: f64, entities: u64, events: u64, base_time_unit: BaseTimeUnit) -> TerminationContext<'static> {
        let entities_fn: &'static dyn Fn(Option<&str>) -> u64 = Box::leak(Box::new(move |_: Option<&str>| entities));
        let events_fn: &'static dyn Fn(Option<&str>) -> u64 = Box::leak(Box::new(move |_: Option<&str>| events));
        TerminationContext {
            now,
            base_time_unit,
            entity_counts: entities_fn,
            event_count: events_fn,
        }
    }

    #[test]
    fn default_formula_parses_and_fires_at_exact_limit() {
        let expr = parse(DEFAULT_FORMULA).unwrap();
        let c = ctx(999999.0, 0, 0);
        assert!(evaluate(&expr, &c).unwrap().contains("max_time_reached"));
    }

    #[test]
    fn and_requires_both_sides() {
        let expr = parse("TIME(10) AND ENTITIES(*, 5)").unwrap();
        assert!(evaluate(&expr, &ctx(10.0, 4, 0)).is_none());
        assert!(evaluate(&expr, &ctx(10.0, 5, 0)).is_some());
    }

    #[test]
    fn or_short_circuits_on_first_true() {
        let expr = parse("TIME(999999) OR ENTITIES(patients, 50)").unwrap();
        assert!(evaluate(&expr, &ctx(0.0, 50, 0)).unwrap().contains("max_entities_reached"));
    }

    #[test]
    fn events_with_table_argument_still_compares_against_total() {
        let expr = parse("EVENTS(sim_event_processing, 3)").unwrap();
        assert!(evaluate(&expr, &ctx(0.0, 0, 3)).unwrap().contains("max_events_reached"));
    }

    #[test]
    fn parentheses_group_correctly() {
        let expr = parse("(TIME(5) OR TIME(10)) AND ENTITIES(*, 1)").unwrap();
        assert!(evaluate(&expr, &ctx(5.0, 1, 0)).is_some());
        assert!(evaluate(&expr, &ctx(5.0, 0, 0)).is_none());
    }

    #[test]
    fn time_condition_compares_in_base_time_unit_not_raw_minutes() {
        let expr = parse("TIME(100)").unwrap();
        // 100 hours = 6000 internal minutes; short of that must not fire.
        assert!(evaluate(&expr, &ctx_with_unit(5999.0, 0, 0, BaseTimeUnit::Hours)).is_none());
        assert!(evaluate(&expr, &ctx_with_unit(6000.0, 0, 0, BaseTimeUnit::Hours))
            .unwrap()
            .contains("max_time_reached"));
    }

    #[test]
    fn malformed_formula_is_a_parse_error() {
        assert!(parse("TIME(").is_err());
        assert!(parse("TIME(5) AND").is_err());
        assert!(parse("BOGUS(1)").is_err());
    }
}
