//! Domain type identifiers
//!
//! A domain type classifies message semantics. Values 1-127 are reserved for
//! standard domains; 128-255 are available for custom domains. Values outside
//! 1-255 cannot be carried by the wire format and are rejected on construction.

use crate::common::errors::{ValidationError, ValidationResult};
use std::fmt;

/// Validated domain type (1..=255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct DomainType(u8);

impl DomainType {
    pub const LOGIN: DomainType = DomainType(1);
    pub const SOURCE: DomainType = DomainType(4);
    pub const DICTIONARY: DomainType = DomainType(5);
    pub const MARKET_PRICE: DomainType = DomainType(6);
    pub const MARKET_BY_ORDER: DomainType = DomainType(7);
    pub const MARKET_BY_PRICE: DomainType = DomainType(8);
    pub const MARKET_MAKER: DomainType = DomainType(9);
    pub const SYMBOL_LIST: DomainType = DomainType(10);
    pub const SERVICE_PROVIDER_STATUS: DomainType = DomainType(11);
    pub const HISTORY: DomainType = DomainType(12);
    pub const HEADLINE: DomainType = DomainType(13);
    pub const STORY: DomainType = DomainType(14);
    pub const TRANSACTION: DomainType = DomainType(17);
    pub const YIELD_CURVE: DomainType = DomainType(22);
    pub const CONTRIBUTION: DomainType = DomainType(27);
    pub const SYSTEM: DomainType = DomainType(127);

    /// Alias used by the directory domain
    pub const DIRECTORY: DomainType = Self::SOURCE;

    /// First value available for custom domains
    pub const CUSTOM_START: u8 = 128;

    /// Validate a raw domain type value
    pub fn new(value: u16) -> ValidationResult<Self> {
        if value == 0 || value > u8::MAX as u16 {
            return Err(ValidationError::DomainTypeOutOfRange { value });
        }
        Ok(Self(value as u8))
    }

    /// Domain type from a decoded wire byte
    pub fn from_wire(value: u8) -> ValidationResult<Self> {
        Self::new(value as u16)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Login, directory and dictionary streams form the control plane
    pub fn is_admin(self) -> bool {
        matches!(self, Self::LOGIN | Self::SOURCE | Self::DICTIONARY)
    }

    pub fn is_custom(self) -> bool {
        self.0 >= Self::CUSTOM_START
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "Login",
            4 => "Directory",
            5 => "Dictionary",
            6 => "MarketPrice",
            7 => "MarketByOrder",
            8 => "MarketByPrice",
            9 => "MarketMaker",
            10 => "SymbolList",
            11 => "ServiceProviderStatus",
            12 => "History",
            13 => "Headline",
            14 => "Story",
            17 => "Transaction",
            22 => "YieldCurve",
            27 => "Contribution",
            127 => "System",
            v if v >= Self::CUSTOM_START => "Custom",
            _ => "Reserved",
        }
    }
}

impl Default for DomainType {
    fn default() -> Self {
        Self::MARKET_PRICE
    }
}

impl TryFrom<u16> for DomainType {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainType> for u16 {
    fn from(domain: DomainType) -> Self {
        domain.0 as u16
    }
}

impl From<DomainType> for u8 {
    fn from(domain: DomainType) -> Self {
        domain.0
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_outside_wire_range() {
        assert!(matches!(
            DomainType::new(256),
            Err(ValidationError::DomainTypeOutOfRange { value: 256 })
        ));
        assert!(DomainType::new(0).is_err());
        assert_eq!(DomainType::new(255).unwrap().value(), 255);
    }

    #[test]
    fn classifies_admin_and_custom_domains() {
        assert!(DomainType::LOGIN.is_admin());
        assert!(DomainType::DIRECTORY.is_admin());
        assert!(!DomainType::MARKET_PRICE.is_admin());
        assert!(DomainType::new(200).unwrap().is_custom());
        assert_eq!(DomainType::MARKET_BY_ORDER.to_string(), "MarketByOrder(7)");
    }
}
