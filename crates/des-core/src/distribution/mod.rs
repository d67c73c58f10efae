//! C1 Distribution Engine: sample from a named formula.
//!
//! `spec.md` §4.1 defines twelve formula names dispatched from a single
//! `sample(spec, size?)` entry point. The formula grammar lives in
//! `formula`; dispatch per name lives in `dispatch`.

pub mod dispatch;
pub mod formula;

pub use dispatch::{sample_many, sample_one, DistributionEngine};
