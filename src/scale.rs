//! Estimation decks.

use std::fmt;
use std::str::FromStr;

use frames::Estimate;
use serde::Serialize;

use crate::config::ConfigError;

/// Deck presets offered when a board is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckKind {
    Serial,
    Even,
    Odd,
    Fibonacci,
}

impl DeckKind {
    /// Map the board service's numeric `estimation_type`.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Serial),
            2 => Some(Self::Even),
            3 => Some(Self::Odd),
            4 => Some(Self::Fibonacci),
            _ => None,
        }
    }

    #[must_use]
    pub fn values(self) -> &'static [Estimate] {
        match self {
            Self::Serial => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            Self::Even => &[0, 2, 4, 6, 8, 10, 12, 14, 16, 18],
            Self::Odd => &[0, 1, 3, 5, 7, 9, 11, 13, 15, 17],
            Self::Fibonacci => &[0, 1, 2, 3, 5, 8, 13, 21, 34, 55],
        }
    }
}

impl FromStr for DeckKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "serial" | "1" => Ok(Self::Serial),
            "even" | "2" => Ok(Self::Even),
            "odd" | "3" => Ok(Self::Odd),
            "fibonacci" | "4" => Ok(Self::Fibonacci),
            other => Err(ConfigError::InvalidDeck(other.to_owned())),
        }
    }
}

/// Ordered, immutable set of values a participant may vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EstimationScale {
    values: Vec<Estimate>,
}

impl EstimationScale {
    #[must_use]
    pub fn from_deck(kind: DeckKind) -> Self {
        Self { values: kind.values().to_vec() }
    }

    /// Build a scale from an explicit list. Order is kept; repeats are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyScale`] when no values are given.
    pub fn custom(values: impl IntoIterator<Item = Estimate>) -> Result<Self, ConfigError> {
        let mut deduped: Vec<Estimate> = Vec::new();
        for value in values {
            if !deduped.contains(&value) {
                deduped.push(value);
            }
        }
        if deduped.is_empty() {
            return Err(ConfigError::EmptyScale);
        }
        Ok(Self { values: deduped })
    }

    #[must_use]
    pub fn contains(&self, value: Estimate) -> bool {
        self.values.contains(&value)
    }

    #[must_use]
    pub fn values(&self) -> &[Estimate] {
        &self.values
    }
}

impl fmt::Display for EstimationScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}
