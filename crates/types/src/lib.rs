//! Validated value types shared across the diagnostic report engine.
//!
//! These newtypes guarantee their invariants at construction time so the rest
//! of the codebase never has to re-validate. Externally supplied identifiers
//! (template codes from admin input, free text from entry forms) must pass
//! through the constructors here before they reach the engine.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded the maximum allowed length
    #[error("Text exceeds maximum length of {0} characters")]
    TooLong(usize),
    /// The input contained characters outside the allowed set
    #[error("Invalid template code: {0}")]
    InvalidTemplateCode(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one
/// non-whitespace character. The input is automatically trimmed of leading
/// and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the
    /// trimmed result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A template code in canonical form.
///
/// Canonical form:
/// - Length: 1 to 64 characters
/// - Characters: `A-Z`, `0-9` and `_` only
/// - Example: `CBC_DEFAULT`
///
/// Codes are required to be canonical when supplied externally (admin
/// template builders, seed data). Lowercase input is rejected rather than
/// folded, so the stored value is always exactly what the caller validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateCode(String);

impl TemplateCode {
    /// Maximum accepted code length.
    pub const MAX_LEN: usize = 64;

    /// Parses and validates an externally supplied template code.
    ///
    /// # Errors
    ///
    /// Returns a `TextError` if the input is empty, longer than
    /// [`MAX_LEN`](Self::MAX_LEN), or contains characters outside
    /// `A-Z0-9_`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let value = input.as_ref().trim();
        if value.is_empty() {
            return Err(TextError::Empty);
        }
        if value.len() > Self::MAX_LEN {
            return Err(TextError::TooLong(Self::MAX_LEN));
        }
        let ok = value
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'_'));
        if !ok {
            return Err(TextError::InvalidTemplateCode(format!(
                "'{value}' contains invalid characters (only A-Z, 0-9, '_' allowed)"
            )));
        }
        Ok(Self(value.to_owned()))
    }

    /// Returns the canonical code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TemplateCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for TemplateCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TemplateCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TemplateCode::parse(&s).map_err(serde::de::Error::custom)
    }
}
