//! Shared serde helper functions used across multiple modules.

use serde::{Deserialize, Deserializer};

/// Deserialize a statement list that may be absent, `null`, a single string,
/// or a sequence of strings.
///
/// Dataset producers are inconsistent about `preprocess_sql` and friends;
/// all four shapes normalize to a (possibly empty) `Vec<String>`.
pub fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}
