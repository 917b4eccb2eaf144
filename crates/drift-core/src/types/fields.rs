//! Typed accessors for per-trade context values.
//!
//! Context values live in three namespaces: standard columns recorded by the
//! backtest engine, user-defined custom columns, and values derived from the
//! trade itself. A `ContextField` names one value in one namespace and
//! resolves it against a matched pair.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::trade::MatchedPair;
use crate::Error;

/// Columns recorded by the backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardField {
    OpeningVix,
    Gap,
    Movement,
}

/// Values computed from the trade itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedField {
    /// Hour of the opening time (0-23).
    HourOfDay,
    /// Monday = 0 through Sunday = 6.
    DayOfWeek,
    /// Live contract count.
    Contracts,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContextField {
    Standard(StandardField),
    Custom(String),
    Derived(DerivedField),
}

impl ContextField {
    /// VIX, gap and movement.
    pub fn standard_fields() -> Vec<ContextField> {
        vec![
            ContextField::Standard(StandardField::OpeningVix),
            ContextField::Standard(StandardField::Gap),
            ContextField::Standard(StandardField::Movement),
        ]
    }

    pub fn resolve(&self, pair: &MatchedPair) -> Option<f64> {
        let value = match self {
            ContextField::Standard(StandardField::OpeningVix) => pair.opening_vix,
            ContextField::Standard(StandardField::Gap) => pair.gap,
            ContextField::Standard(StandardField::Movement) => pair.movement,
            ContextField::Custom(name) => pair.custom_fields.get(name).copied(),
            ContextField::Derived(DerivedField::HourOfDay) => {
                Some(pair.time_opened.hour() as f64)
            }
            ContextField::Derived(DerivedField::DayOfWeek) => {
                Some(pair.date.weekday().num_days_from_monday() as f64)
            }
            ContextField::Derived(DerivedField::Contracts) => Some(pair.actual_contracts as f64),
        };
        value.filter(|v| v.is_finite())
    }

    /// Label used in insight descriptions.
    pub fn label(&self) -> String {
        match self {
            ContextField::Standard(StandardField::OpeningVix) => "VIX".to_string(),
            ContextField::Standard(StandardField::Gap) => "gap".to_string(),
            ContextField::Standard(StandardField::Movement) => "movement".to_string(),
            ContextField::Custom(name) => name.clone(),
            ContextField::Derived(DerivedField::HourOfDay) => "hour of day".to_string(),
            ContextField::Derived(DerivedField::DayOfWeek) => "day of week".to_string(),
            ContextField::Derived(DerivedField::Contracts) => "contracts".to_string(),
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextField::Standard(StandardField::OpeningVix) => write!(f, "vix"),
            ContextField::Standard(StandardField::Gap) => write!(f, "gap"),
            ContextField::Standard(StandardField::Movement) => write!(f, "movement"),
            ContextField::Custom(name) => write!(f, "custom:{}", name),
            ContextField::Derived(DerivedField::HourOfDay) => write!(f, "derived:hour"),
            ContextField::Derived(DerivedField::DayOfWeek) => write!(f, "derived:weekday"),
            ContextField::Derived(DerivedField::Contracts) => write!(f, "derived:contracts"),
        }
    }
}

impl FromStr for ContextField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("custom:") {
            if name.is_empty() {
                return Err(Error::InvalidField(s.to_string()));
            }
            return Ok(ContextField::Custom(name.to_string()));
        }

        match s.to_ascii_lowercase().as_str() {
            "vix" | "openingvix" | "opening_vix" => {
                Ok(ContextField::Standard(StandardField::OpeningVix))
            }
            "gap" => Ok(ContextField::Standard(StandardField::Gap)),
            "movement" => Ok(ContextField::Standard(StandardField::Movement)),
            "derived:hour" => Ok(ContextField::Derived(DerivedField::HourOfDay)),
            "derived:weekday" => Ok(ContextField::Derived(DerivedField::DayOfWeek)),
            "derived:contracts" => Ok(ContextField::Derived(DerivedField::Contracts)),
            _ => Err(Error::InvalidField(s.to_string())),
        }
    }
}

impl TryFrom<String> for ContextField {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContextField> for String {
    fn from(field: ContextField) -> Self {
        field.to_string()
    }
}
