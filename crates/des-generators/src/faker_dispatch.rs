//! Faker method dispatch (C5 Entity Manager's `faker` generator).
//!
//! `original_source/utils/faker_utils.py`'s `generate_fake_data(method)`
//! dispatches dynamically via `getattr(faker, method)`, with one hand-rolled
//! `project_name` method and a logged-and-defaulted fallback for anything
//! Faker doesn't recognize. Rust's `fake` crate has no such reflection, so
//! this is a finite match over the method names `original_source`'s configs
//! actually use, grounded on the same faker provider categories (name,
//! internet, company, address, lorem, phone_number, boolean, chrono).

use chrono::NaiveDate;
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::boolean::en::Boolean;
use fake::faker::chrono::en::{Date, DateTime};
use fake::faker::company::en::{Buzzword, CatchPhrase, CompanyName, Profession};
use fake::faker::internet::en::{FreeEmail, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::{CellNumber, PhoneNumber};
use fake::Fake;
use rand::rngs::StdRng;
use rand::Rng;

use des_core::value::Value;

fn project_name(rng: &mut StdRng) -> String {
    let company: String = CompanyName().fake_with_rng(rng);
    let buzzword: String = Buzzword().fake_with_rng(rng);
    format!("{company} {buzzword} Project")
}

/// Samples a value for `method`, normalized case-insensitively. Unknown
/// method names fall back to a `Default_<method>` placeholder and log a
/// warning, mirroring the Python reference's `hasattr` miss path.
pub fn generate(rng: &mut StdRng, method: &str) -> Value {
    let normalized = method.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "name" | "full_name" => Value::Text(Name().fake_with_rng(rng)),
        "first_name" => Value::Text(FirstName().fake_with_rng(rng)),
        "last_name" => Value::Text(LastName().fake_with_rng(rng)),
        "email" | "free_email" => Value::Text(FreeEmail().fake_with_rng(rng)),
        "safe_email" => Value::Text(SafeEmail().fake_with_rng(rng)),
        "user_name" | "username" => Value::Text(Username().fake_with_rng(rng)),
        "company" | "company_name" => Value::Text(CompanyName().fake_with_rng(rng)),
        "bs" | "catch_phrase" => Value::Text(CatchPhrase().fake_with_rng(rng)),
        "job" | "profession" => Value::Text(Profession().fake_with_rng(rng)),
        "word" => Value::Text(Word().fake_with_rng(rng)),
        "words" => {
            let words: Vec<String> = Words(3..6).fake_with_rng(rng);
            Value::Text(words.join(" "))
        }
        "sentence" | "text" => Value::Text(Sentence(6..12).fake_with_rng(rng)),
        "paragraph" => Value::Text(Paragraph(2..5).fake_with_rng(rng)),
        "city" => Value::Text(CityName().fake_with_rng(rng)),
        "street_name" => Value::Text(StreetName().fake_with_rng(rng)),
        "street_address" | "address" => {
            let number: String = BuildingNumber().fake_with_rng(rng);
            let street: String = StreetName().fake_with_rng(rng);
            Value::Text(format!("{number} {street}"))
        }
        "state" => Value::Text(StateName().fake_with_rng(rng)),
        "zipcode" | "postcode" | "zip_code" => Value::Text(ZipCode().fake_with_rng(rng)),
        "country" => Value::Text(CountryName().fake_with_rng(rng)),
        "phone_number" | "phone" => Value::Text(PhoneNumber().fake_with_rng(rng)),
        "cell_number" => Value::Text(CellNumber().fake_with_rng(rng)),
        "boolean" | "pybool" => Value::Boolean(Boolean(50).fake_with_rng(rng)),
        "uuid4" | "uuid" => Value::Text(uuid::Uuid::from_bytes(rng.gen()).to_string()),
        "random_int" => Value::Integer(rng.gen_range(0..1000)),
        "date" => {
            let date: NaiveDate = Date().fake_with_rng(rng);
            Value::Text(date.format("%Y-%m-%d").to_string())
        }
        "date_time" | "datetime" | "iso8601" => {
            let dt: chrono::DateTime<chrono::Utc> = DateTime().fake_with_rng(rng);
            Value::Text(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        }
        "project_name" => Value::Text(project_name(rng)),
        _ => {
            log::warn!("unsupported faker method '{method}', substituting a default value");
            Value::Text(format!("Default_{method}"))
        }
    }
}
