//! Field-extraction rules shared by the per-source normalizers.
//!
//! Each source maps its raw payload into a [`Record`](crate::models::Record)
//! inside its own module; the pieces here are the source-independent parts:
//! ordered fallback lookups, numeric coercion, and inverted-index abstracts.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Reads one candidate location of a field from a typed payload.
pub type Accessor<T> = fn(&T) -> Option<&str>;

/// Evaluate accessors in order and return the first non-blank value.
pub fn first_present<'a, T>(value: &'a T, accessors: &[Accessor<T>]) -> Option<&'a str> {
    accessors
        .iter()
        .filter_map(|accessor| accessor(value))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Field deserializer that maps a value of the wrong JSON type to `None`.
///
/// Use as `#[serde(default, deserialize_with = "lenient")]` on `Option<T>`
/// fields so one mistyped field leaves the rest of the payload intact.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// List element that decodes to `None` when it has the wrong shape
#[derive(Debug, Default)]
pub struct Lenient<T>(pub Option<T>);

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient(deserializer).map(Lenient)
    }
}

/// Coerce a JSON number or numeric string into a count.
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rebuild abstract text from an inverted word index.
///
/// Every `(position, word)` pair is sorted by position and the words are
/// joined with single spaces. Returns `None` when the value is not an object
/// of word to integer-position arrays, or when it holds no positions at all.
pub fn reconstruct_abstract(index: Option<&Value>) -> Option<String> {
    let index = index?.as_object()?;

    let mut pairs: Vec<(u64, &str)> = Vec::new();
    for (word, positions) in index {
        for position in positions.as_array()? {
            pairs.push((position.as_u64()?, word.as_str()));
        }
    }

    if pairs.is_empty() {
        return None;
    }

    pairs.sort_unstable();
    Some(
        pairs
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}
