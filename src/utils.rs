//! # Utility Functions
//!
//! Common helpers for address validation, amount units, hashing and network names.

use crate::error::{SwapError, SwapResult};
use bitcoin::{Address, Network};
use std::str::FromStr;

/// Address validation utilities
pub mod address {
    use super::*;
    use bitcoin::{AddressType, PubkeyHash};

    /// Validate and parse a Bitcoin address for the given network
    pub fn validate_and_parse(address_str: &str, network: Network) -> SwapResult<Address> {
        let address = Address::from_str(address_str)
            .map_err(|e| SwapError::address(address_str, e.to_string()))?;

        // Ensure the address is for the correct network
        let validated_address = address
            .require_network(network)
            .map_err(|e| SwapError::address(address_str, e.to_string()))?;

        Ok(validated_address)
    }

    /// Parse a pay-to-pubkey-hash address, the only shape a party identity may take
    pub fn parse_p2pkh(address_str: &str, network: Network) -> SwapResult<Address> {
        let address = validate_and_parse(address_str, network)?;
        if address.address_type() != Some(AddressType::P2pkh) {
            return Err(SwapError::address(address_str, "expected a P2PKH address"));
        }
        Ok(address)
    }

    /// Parse a pay-to-script-hash address, the shape of every HTLC address
    pub fn parse_p2sh(address_str: &str, network: Network) -> SwapResult<Address> {
        let address = validate_and_parse(address_str, network)?;
        if address.address_type() != Some(AddressType::P2sh) {
            return Err(SwapError::address(address_str, "expected a P2SH (HTLC) address"));
        }
        Ok(address)
    }

    /// Extract the 20-byte public key hash of a P2PKH address
    pub fn pubkey_hash(address_str: &str, network: Network) -> SwapResult<PubkeyHash> {
        parse_p2pkh(address_str, network)?
            .pubkey_hash()
            .ok_or_else(|| SwapError::address(address_str, "address carries no public key hash"))
    }
}

/// Amount unit utilities
pub mod amount {
    use super::*;

    /// Satoshis per BTC
    pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

    /// Satoshis per mBTC
    pub const SATOSHIS_PER_MBTC: u64 = 100_000;

    /// Amount units accepted at the API boundary
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Unit {
        Btc,
        MilliBtc,
        Satoshi,
    }

    impl Unit {
        /// Satoshis in one unit
        pub fn satoshis(&self) -> u64 {
            match self {
                Unit::Btc => SATOSHIS_PER_BTC,
                Unit::MilliBtc => SATOSHIS_PER_MBTC,
                Unit::Satoshi => 1,
            }
        }
    }

    impl FromStr for Unit {
        type Err = SwapError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "btc" => Ok(Unit::Btc),
                "mbtc" => Ok(Unit::MilliBtc),
                "satoshi" | "sat" | "sats" => Ok(Unit::Satoshi),
                _ => Err(SwapError::Unit { unit: s.to_string() }),
            }
        }
    }

    /// Convert an amount expressed in `unit` to satoshis
    pub fn to_satoshi(value: f64, unit: Unit) -> SwapResult<u64> {
        if !value.is_finite() || value < 0.0 {
            return Err(SwapError::transaction(format!("invalid amount {}", value)));
        }
        Ok((value * unit.satoshis() as f64).round() as u64)
    }

    /// Convert satoshis to an amount expressed in `unit`
    pub fn from_satoshi(sats: u64, unit: Unit) -> f64 {
        sats as f64 / unit.satoshis() as f64
    }

    /// Format amount with both sats and BTC
    pub fn format_dual(sats: u64) -> String {
        format!("{} sats ({:.8} BTC)", sats, from_satoshi(sats, Unit::Btc))
    }
}

/// Cryptographic utilities
pub mod crypto {
    use bitcoin::hashes::{sha256d, Hash};
    use sha2::{Digest, Sha256};

    /// Single sha256 digest
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    /// Double sha256 digest, what OP_HASH256 computes
    pub fn hash256(data: &[u8]) -> [u8; 32] {
        sha256d::Hash::hash(data).to_byte_array()
    }

    /// Secret hash handed to the HTLC builder for a given secret
    pub fn secret_hash(secret: &[u8]) -> [u8; 32] {
        sha256(secret)
    }

    /// Generate a fresh random 32-byte secret
    pub fn random_secret() -> [u8; 32] {
        rand::random()
    }
}

/// Network naming used by the transaction-raw envelope
pub mod network {
    use super::*;

    /// Envelope name of a network
    pub fn name(network: Network) -> &'static str {
        match network {
            Network::Bitcoin => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
            _ => "unknown",
        }
    }

    /// Parse an envelope network name
    pub fn parse(name: &str) -> Option<Network> {
        match name {
            "mainnet" => Some(Network::Bitcoin),
            "testnet" => Some(Network::Testnet),
            "signet" => Some(Network::Signet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }
}
