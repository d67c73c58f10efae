//! One-time `.env` loading, kept at the crate boundary closest to where a
//! connection gets opened (mirrors the teacher's `chem-persistence::config`
//! lazy-`dotenv()` pattern, generalized from a `DATABASE_URL` convention to
//! this crate's actual input: a `db_path` resolved from the loaded
//! `DatabaseConfig`, not an environment variable).

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

/// Forces the one-time `.env` load. Harmless to call more than once or when
/// no `.env` file is present.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
