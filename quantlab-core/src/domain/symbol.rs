//! Canonical instrument identifiers.
//!
//! The internal form is the suffixed code used by the data layer
//! (`000001.SZ`). Parsing also accepts the prefixed form used by several
//! external feeds (`sz000001`); the two representations round-trip
//! losslessly for any valid symbol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("unrecognized symbol format: '{0}'")]
    Format(String),

    #[error("unknown exchange '{exchange}' in '{input}'")]
    Exchange { input: String, exchange: String },
}

/// Exchange an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange {
    /// Shanghai Stock Exchange.
    Sse,
    /// Shenzhen Stock Exchange.
    Szse,
    /// Beijing Stock Exchange.
    Bse,
}

impl Exchange {
    /// Canonical suffix: `600519.SH`, `000001.SZ`, `830799.BJ`.
    pub fn suffix(self) -> &'static str {
        match self {
            Exchange::Sse => "SH",
            Exchange::Szse => "SZ",
            Exchange::Bse => "BJ",
        }
    }

    /// Prefixed external form: `sh600519`, `sz000001`, `bj830799`.
    pub fn prefix(self) -> &'static str {
        match self {
            Exchange::Sse => "sh",
            Exchange::Szse => "sz",
            Exchange::Bse => "bj",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "SH" => Some(Exchange::Sse),
            "SZ" => Some(Exchange::Szse),
            "BJ" => Some(Exchange::Bse),
            _ => None,
        }
    }
}

/// A tradable instrument, canonicalized to one internal code format.
///
/// Ordering and hashing follow the canonical string form, so `Symbol` can
/// key the deterministic `BTreeMap`s used in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    code: String,
    exchange: Exchange,
}

impl Symbol {
    /// Parse either the suffixed (`000001.SZ`) or prefixed (`sz000001`) form.
    pub fn parse(input: &str) -> Result<Self, SymbolError> {
        let trimmed = input.trim();

        if let Some((code, exch)) = trimmed.split_once('.') {
            let exchange = Exchange::from_code(exch).ok_or_else(|| SymbolError::Exchange {
                input: input.to_string(),
                exchange: exch.to_string(),
            })?;
            return Self::from_parts(code, exchange, input);
        }

        if trimmed.len() == 8 {
            let (prefix, code) = trimmed.split_at(2);
            if let Some(exchange) = Exchange::from_code(prefix) {
                return Self::from_parts(code, exchange, input);
            }
        }

        Err(SymbolError::Format(input.to_string()))
    }

    fn from_parts(code: &str, exchange: Exchange, input: &str) -> Result<Self, SymbolError> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SymbolError::Format(input.to_string()));
        }
        Ok(Self {
            code: code.to_string(),
            exchange,
        })
    }

    /// Six-digit numeric code without the exchange tag.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// The prefixed external representation (`sz000001`).
    pub fn to_prefixed(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.code)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.exchange.suffix())
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
