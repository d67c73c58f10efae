//! Per-formula-name sampling dispatch (`spec.md` §4.1).
//!
//! A closed enum + match dispatch, as `spec.md` §9's design notes call for
//! ("Closed enum + dispatch table. Alias map for case/spelling variants. No
//! process-wide mutable state."). The engine owns its own `StdRng`, seeded
//! once by the orchestrator so a fixed `random_seed` reproduces a run
//! deterministically (testable property 10).

use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution as RandDistribution, Exp, Gamma, LogNormal, Normal, Poisson, Triangular, Weibull};

use crate::constants::INTEGER_COERCION_EPSILON;
use crate::errors::CoreError;
use crate::value::Value;

use super::formula::{parse_f64, tokenize, unquote};

/// Case-insensitive aliases for the twelve canonical formula names, so a
/// config author spelling out `UNIFORM(...)` or `NORMAL(...)` still
/// resolves. The canonical short forms are `spec.md`'s own vocabulary.
fn canonical_name(name: &str) -> &str {
    match name {
        "UNIFORM" => "UNIF",
        "NORMAL" | "GAUSSIAN" => "NORM",
        "EXPONENTIAL" => "EXPO",
        "POISSON" => "POIS",
        "TRIANGULAR" => "TRIA",
        "GAMMA" => "GAMA",
        "ERLANG" => "ERLA",
        "LOGNORMAL" => "LOGN",
        "WEIBULL" => "WEIB",
        "DISCRETE" => "DISC",
        "RANDOM" => "RAND",
        "FIX" | "CONSTANT" => "FIXED",
        other => other,
    }
}

/// Coerces a sampled float to an integer `Value` when it is within
/// `INTEGER_COERCION_EPSILON` of a whole number (`spec.md` §4.1 last
/// paragraph), otherwise keeps it as a real.
fn coerce_numeric(raw: f64) -> Value {
    let rounded = raw.round();
    if (raw - rounded).abs() <= INTEGER_COERCION_EPSILON {
        Value::Integer(rounded as i64)
    } else {
        Value::Real(raw)
    }
}

/// A seeded, shared distribution engine. Cloning an engine clones the RNG
/// stream too (so tests can fork a deterministic sub-stream); production
/// code keeps a single engine behind one owner, matching `spec.md` §5's
/// "Entity attribute map... writes are serialised" style of single-owner
/// mutation for shared simulation state.
pub struct DistributionEngine {
    rng: rand::rngs::StdRng,
}

impl DistributionEngine {
    pub fn new_seeded(seed: u64) -> Self {
        DistributionEngine {
            rng: rand::rngs::StdRng::seed_from_u64(seed),
        }
    }

    /// When no `random_seed` is configured, seed from OS entropy once at
    /// orchestrator start-up; the run is then internally deterministic but
    /// not reproducible across runs (`spec.md` §1 Non-goals).
    pub fn new_entropy() -> Self {
        DistributionEngine {
            rng: rand::rngs::StdRng::from_entropy(),
        }
    }

    pub fn sample_one(&mut self, formula: &str) -> Result<Value, CoreError> {
        sample_one(formula, &mut self.rng)
    }

    pub fn sample_many(&mut self, formula: &str, size: usize) -> Result<Vec<Value>, CoreError> {
        sample_many(formula, size, &mut self.rng)
    }

    pub fn rng_mut(&mut self) -> &mut rand::rngs::StdRng {
        &mut self.rng
    }
}

pub fn sample_one(formula: &str, rng: &mut impl Rng) -> Result<Value, CoreError> {
    let parsed = tokenize(formula)?;
    let name = canonical_name(&parsed.name).to_string();
    dispatch(&name, &parsed.args, formula, rng)
}

pub fn sample_many(formula: &str, size: usize, rng: &mut impl Rng) -> Result<Vec<Value>, CoreError> {
    let parsed = tokenize(formula)?;
    let name = canonical_name(&parsed.name).to_string();
    (0..size)
        .map(|_| dispatch(&name, &parsed.args, formula, rng))
        .collect()
}

fn arity_error(name: &str, expected: &str, actual: usize) -> CoreError {
    CoreError::ArityMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual,
    }
}

fn dispatch(name: &str, args: &[String], formula: &str, rng: &mut impl Rng) -> Result<Value, CoreError> {
    match name {
        "UNIF" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let min_raw = unquote(&args[0]);
            let max_raw = unquote(&args[1]);
            let both_integral = !min_raw.contains('.') && !max_raw.contains('.');
            let min = parse_f64(&args[0], formula)?;
            let max = parse_f64(&args[1], formula)?;
            if both_integral {
                let lo = min.round() as i64;
                let hi = max.round() as i64;
                Ok(Value::Integer(rng.gen_range(lo..=hi)))
            } else {
                // rand's RangeInclusive<f64> sampling already guarantees the
                // upper bound is reachable (nudged by one ULP internally).
                Ok(Value::Real(rng.gen_range(min..=max)))
            }
        }
        "NORM" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let mu = parse_f64(&args[0], formula)?;
            let sigma = parse_f64(&args[1], formula)?;
            let dist = Normal::new(mu, sigma).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "EXPO" => {
            if args.len() != 1 {
                return Err(arity_error(name, "1", args.len()));
            }
            let mean = parse_f64(&args[0], formula)?;
            let dist = Exp::new(1.0 / mean).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "POIS" => {
            if args.len() != 1 {
                return Err(arity_error(name, "1", args.len()));
            }
            let lambda = parse_f64(&args[0], formula)?;
            let dist = Poisson::new(lambda).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Integer(dist.sample(rng).round() as i64))
        }
        "TRIA" => {
            if args.len() != 3 {
                return Err(arity_error(name, "3", args.len()));
            }
            let min = parse_f64(&args[0], formula)?;
            let mode = parse_f64(&args[1], formula)?;
            let max = parse_f64(&args[2], formula)?;
            let dist = Triangular::new(min, max, mode).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "BETA" => match args.len() {
            2 => {
                let a = parse_f64(&args[0], formula)?;
                let b = parse_f64(&args[1], formula)?;
                let dist = Beta::new(a, b).map_err(|e| CoreError::MalformedFormula {
                    formula: formula.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Value::Real(dist.sample(rng)))
            }
            5 => {
                // (min, mode, max, shape1, shape2); mode is parsed but
                // unused downstream, matching `spec.md` §4.1 and
                // `original_source/distributions/formula_parser.py`'s
                // five-param scaled form.
                let min = parse_f64(&args[0], formula)?;
                let _mode = parse_f64(&args[1], formula)?;
                let max = parse_f64(&args[2], formula)?;
                let a = parse_f64(&args[3], formula)?;
                let b = parse_f64(&args[4], formula)?;
                let dist = Beta::new(a, b).map_err(|e| CoreError::MalformedFormula {
                    formula: formula.to_string(),
                    reason: e.to_string(),
                })?;
                let unit = dist.sample(rng);
                Ok(Value::Real(min + unit * (max - min)))
            }
            other => Err(arity_error(name, "2 or 5", other)),
        },
        "GAMA" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let alpha = parse_f64(&args[0], formula)?;
            let beta = parse_f64(&args[1], formula)?;
            let dist = Gamma::new(alpha, beta).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "ERLA" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let mean = parse_f64(&args[0], formula)?;
            let k = parse_f64(&args[1], formula)?.round();
            if k < 1.0 {
                return Err(CoreError::MalformedFormula {
                    formula: formula.to_string(),
                    reason: "ERLA shape k must be a positive integer".to_string(),
                });
            }
            let dist = Gamma::new(k, mean / k).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "LOGN" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let mu = parse_f64(&args[0], formula)?;
            let sigma = parse_f64(&args[1], formula)?;
            let dist = LogNormal::new(mu, sigma).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "WEIB" => {
            if args.len() != 2 {
                return Err(arity_error(name, "2", args.len()));
            }
            let shape = parse_f64(&args[0], formula)?;
            let scale = parse_f64(&args[1], formula)?;
            let dist = Weibull::new(scale, shape).map_err(|e| CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Value::Real(dist.sample(rng)))
        }
        "DISC" => sample_disc(args, formula, rng),
        "RAND" => {
            if !args.is_empty() {
                return Err(arity_error(name, "0", args.len()));
            }
            Ok(Value::Real(rng.gen_range(0.0..1.0)))
        }
        "FIXED" => {
            if args.len() != 1 {
                return Err(arity_error(name, "1", args.len()));
            }
            Ok(literal_value(&args[0]))
        }
        other => Err(CoreError::UnknownDistribution(other.to_string())),
    }
}

/// Parses a raw arg token as a number if possible, else a text literal.
fn literal_value(arg: &str) -> Value {
    let unquoted = unquote(arg);
    if let Ok(i) = unquoted.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = unquoted.parse::<f64>() {
        coerce_numeric(f)
    } else {
        Value::Text(unquoted.to_string())
    }
}

/// `DISC(p1,v1,p2,v2,...)` with arg-order tolerance (`spec.md` §4.1): tries
/// both `(prob,value)` and `(value,prob)` orderings and picks whichever
/// ordering has all-numeric probability slots summing closest to 1.0. Ties
/// prefer the canonical `(prob,value)` ordering.
fn sample_disc(args: &[String], formula: &str, rng: &mut impl Rng) -> Result<Value, CoreError> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CoreError::MalformedFormula {
            formula: formula.to_string(),
            reason: "DISC requires an even number of (probability, value) arguments".to_string(),
        });
    }
    let pairs = args.len() / 2;

    // Ordering A: args[2i] = probability, args[2i+1] = value (canonical).
    let prob_first: Option<Vec<f64>> = (0..pairs)
        .map(|i| unquote(&args[2 * i]).trim().parse::<f64>().ok())
        .collect();
    // Ordering B: args[2i] = value, args[2i+1] = probability.
    let value_first: Option<Vec<f64>> = (0..pairs)
        .map(|i| unquote(&args[2 * i + 1]).trim().parse::<f64>().ok())
        .collect();

    let score = |probs: &Option<Vec<f64>>| -> Option<f64> {
        probs.as_ref().map(|p| (p.iter().sum::<f64>() - 1.0).abs())
    };
    let score_a = score(&prob_first);
    let score_b = score(&value_first);

    let use_prob_first = match (score_a, score_b) {
        (Some(a), Some(b)) => a <= b, // tie prefers canonical ordering A
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => {
            return Err(CoreError::MalformedFormula {
                formula: formula.to_string(),
                reason: "DISC could not find a numeric probability slot in either argument ordering".to_string(),
            })
        }
    };

    let (probs, values): (Vec<f64>, Vec<Value>) = if use_prob_first {
        let probs = prob_first.unwrap();
        let values = (0..pairs).map(|i| literal_value(&args[2 * i + 1])).collect();
        (probs, values)
    } else {
        let probs = value_first.unwrap();
        let values = (0..pairs).map(|i| literal_value(&args[2 * i])).collect();
        (probs, values)
    };

    let total: f64 = probs.iter().sum();
    if total <= 0.0 {
        return Err(CoreError::MalformedFormula {
            formula: formula.to_string(),
            reason: "DISC probabilities must sum to a positive value".to_string(),
        });
    }
    let draw = rng.gen_range(0.0..1.0) * total;
    let mut cumulative = 0.0;
    for (p, v) in probs.iter().zip(values.iter()) {
        cumulative += p;
        if draw <= cumulative {
            return Ok(v.clone());
        }
    }
    Ok(values.last().cloned().unwrap())
}
