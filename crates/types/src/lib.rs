/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// Used at the engine's seams for values that must never be blank: the
/// bearer token handed to the backend client and the clinic display name.
/// Input is trimmed of surrounding whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed before validation. Returns
    /// `Err(TextError::Empty)` when nothing remains after trimming.
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

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
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

impl TryFrom<String> for NonEmptyText {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(value: NonEmptyText) -> Self {
        value.0
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

/// A patient's fluid-overload percentage.
///
/// The clinical metric that drives emergency classification. Values are
/// open-ended upwards (readings above 100 occur), but anything that is
/// not a finite positive number collapses to `0.0`: an unavailable or
/// nonsensical reading classifies as Normal rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct FluidOverload(f64);

impl FluidOverload {
    /// The "metric unavailable" reading.
    pub const ZERO: FluidOverload = FluidOverload(0.0);

    /// Creates a reading from a raw value, collapsing negative, NaN and
    /// infinite input to `0.0`.
    pub fn new(raw: f64) -> Self {
        if raw.is_finite() && raw > 0.0 {
            Self(raw)
        } else {
            Self(0.0)
        }
    }

    /// Returns the percentage as a plain `f64`.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for FluidOverload {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<f64> for FluidOverload {
    fn from(raw: f64) -> Self {
        Self::new(raw)
    }
}

impl From<FluidOverload> for f64 {
    fn from(value: FluidOverload) -> Self {
        value.0
    }
}

impl std::fmt::Display for FluidOverload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}
