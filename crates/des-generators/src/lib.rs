//! des-generators: C5 Entity Manager's `faker`/`template` value-generation
//! dispatch, implementing `des_core::store::ValueGenerator`.
//!
//! The teacher's `chem-providers` crate is an empty stub with no faker
//! precedent, so `fake` is adopted here per SPEC_FULL.md §10 — the closest
//! real ecosystem crate to `original_source`'s `faker_utils.py`, which this
//! module's dispatch table and fallback behavior are grounded on.

mod faker_dispatch;
mod template;

use rand::rngs::StdRng;
use rand::SeedableRng;

use des_core::errors::CoreError;
use des_core::store::ValueGenerator;
use des_core::value::{AttributeMap, Value};

/// Owns the RNG stream backing every `faker()` call. Seeded independently
/// from the Distribution Engine's stream; determinism only requires that
/// the same `random_seed` reproduce the same run, not that the two engines
/// share one stream.
pub struct FakerGenerator {
    rng: StdRng,
}

impl FakerGenerator {
    pub fn new_seeded(seed: u64) -> Self {
        FakerGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn new_entropy() -> Self {
        FakerGenerator {
            rng: StdRng::from_entropy(),
        }
    }
}

impl ValueGenerator for FakerGenerator {
    fn faker(&mut self, method: &str) -> Result<Value, CoreError> {
        Ok(faker_dispatch::generate(&mut self.rng, method))
    }

    fn template(&self, template: &str, row_index: u64, row: &AttributeMap) -> Result<Value, CoreError> {
        Ok(Value::Text(template::render(template, row_index, row)))
    }
}
