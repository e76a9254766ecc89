//! Domain primitives: identifiers, Exchange, SecurityType, TransactionType.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new_v4() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a portfolio (owned by the excluded portfolio CRUD layer).
    PortfolioId
);
uuid_id!(
    /// Identifier of a tradable security.
    SecurityId
);
uuid_id!(
    /// Identifier of a persisted investment transaction.
    TransactionId
);
uuid_id!(HoldingId);

/// Exchange code, normalized to upper case (e.g. "MOEX", "SPB", "CRYPTO").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Exchange(String);

impl Exchange {
    pub const MOEX: &'static str = "MOEX";
    pub const SPB: &'static str = "SPB";
    pub const CRYPTO: &'static str = "CRYPTO";

    pub fn new(code: impl AsRef<str>) -> Self {
        Exchange(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn moex() -> Self {
        Exchange::new(Self::MOEX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Exchange {
    fn from(value: String) -> Self {
        Exchange::new(value)
    }
}

impl From<Exchange> for String {
    fn from(value: Exchange) -> Self {
        value.0
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of instrument; drives the allocation-by-type breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Stock,
    Bond,
    Etf,
    #[serde(alias = "mutual_fund")]
    Fund,
    Crypto,
    Currency,
    Derivative,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityType::Stock => "stock",
            SecurityType::Bond => "bond",
            SecurityType::Etf => "etf",
            SecurityType::Fund => "fund",
            SecurityType::Crypto => "crypto",
            SecurityType::Currency => "currency",
            SecurityType::Derivative => "derivative",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(SecurityType::Stock),
            "bond" => Ok(SecurityType::Bond),
            "etf" => Ok(SecurityType::Etf),
            "fund" | "mutual_fund" => Ok(SecurityType::Fund),
            "crypto" => Ok(SecurityType::Crypto),
            "currency" => Ok(SecurityType::Currency),
            "derivative" => Ok(SecurityType::Derivative),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Kind of investment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    Coupon,
    /// `quantity` carries the split ratio (2 for a 2:1 split).
    Split,
    TransferIn,
    TransferOut,
    Fee,
    Tax,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
            TransactionType::Dividend => "dividend",
            TransactionType::Coupon => "coupon",
            TransactionType::Split => "split",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Fee => "fee",
            TransactionType::Tax => "tax",
        }
    }

    /// Income rows (dividend/coupon) are recorded for reporting only.
    pub fn is_income(&self) -> bool {
        matches!(self, TransactionType::Dividend | TransactionType::Coupon)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            "dividend" => Ok(TransactionType::Dividend),
            "coupon" => Ok(TransactionType::Coupon),
            "split" => Ok(TransactionType::Split),
            "transfer_in" => Ok(TransactionType::TransferIn),
            "transfer_out" => Ok(TransactionType::TransferOut),
            "fee" => Ok(TransactionType::Fee),
            "tax" => Ok(TransactionType::Tax),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum value that no longer maps to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
