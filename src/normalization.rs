use serde::{Deserialize, Deserializer};

/// Normalizes free text by stripping surrounding whitespace and composing
/// it into Unicode Normalization Form C.
///
/// ```
/// use coop_training::normalization::normalize_text;
/// assert_eq!(normalize_text(" Pen\u{303}a "), "Peña");
/// ```
pub fn normalize_text(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfc().collect()
}

/// Normalizes optional text, treating blank input as absent.
pub fn normalize_optional(text: Option<impl AsRef<str>>) -> Option<String> {
    text.map(normalize_text).filter(|s| !s.is_empty())
}

/// Normalizes an email address. Addresses compare case-insensitively.
pub fn normalize_email(email: impl AsRef<str>) -> String {
    normalize_text(email).to_lowercase()
}

/// Deserializes a `String` after running it through `normalize_text`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_text(s))
}

/// Deserializes an optional `String` after running it through `normalize_optional`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(normalize_optional(o))
}
