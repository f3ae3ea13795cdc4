//! # Transaction-Raw Envelope
//!
//! The portable record handed to a signer: base64 of a JSON object
//!
//! ```text
//! {
//!   "type": "bitcoin_<normal|fund|claim|refund>_<unsigned|signed>",
//!   "network": "mainnet" | "testnet" | "signet" | "regtest",
//!   "fee": <satoshis>,
//!   "raw": "<hex transaction>",
//!   "outputs": [{ "value": .., "tx_output_n": .., "script": "<hex>" }],
//!   "extra": { .. }
//! }
//! ```
//!
//! `outputs` describes the spent output of every input, in input order, so a
//! signer never needs to query the chain. A single object is accepted in
//! place of a one-element list.

use crate::config::envelope as envelope_config;
use crate::error::{SwapError, SwapResult};
use crate::solver::Solver;
use crate::transaction::{
    ClaimTransaction, FundTransaction, NormalTransaction, PreviousOutput, RefundTransaction,
    SpendableTransaction, TxKind, TxState,
};
use crate::utils;
use base64::{engine::general_purpose::STANDARD, Engine};
use bitcoin::{consensus, Network, Transaction, Txid};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Envelope `type` tag: kind and signing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RawType {
    pub kind: TxKind,
    pub state: TxState,
}

impl fmt::Display for RawType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", envelope_config::CHAIN, self.kind, self.state)
    }
}

impl FromStr for RawType {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SwapError::envelope(format!("unknown transaction raw type {}", s));

        let rest = s
            .strip_prefix(envelope_config::CHAIN)
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(unknown)?;
        let (kind, state) = rest.split_once('_').ok_or_else(unknown)?;

        Ok(Self {
            kind: kind.parse().map_err(|_| unknown())?,
            state: state.parse().map_err(|_| unknown())?,
        })
    }
}

impl TryFrom<String> for RawType {
    type Error = SwapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RawType> for String {
    fn from(raw_type: RawType) -> Self {
        raw_type.to_string()
    }
}

/// Decoded transaction-raw envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRaw {
    #[serde(rename = "type")]
    pub raw_type: RawType,
    pub network: String,
    /// Fee in satoshis
    pub fee: u64,
    /// Hex-encoded transaction
    pub raw: String,
    #[serde(deserialize_with = "one_or_many")]
    pub outputs: Vec<PreviousOutput>,
    /// Display-only data, never used for signing
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PreviousOutput),
    Many(Vec<PreviousOutput>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PreviousOutput>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(output) => vec![output],
        OneOrMany::Many(outputs) => outputs,
    })
}

impl TransactionRaw {
    /// Encode as base64 JSON
    pub fn encode(&self) -> SwapResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode base64 JSON
    pub fn decode(transaction_raw: &str) -> SwapResult<Self> {
        let json = STANDARD
            .decode(transaction_raw.trim())
            .map_err(|e| SwapError::envelope(format!("not base64: {}", e)))?;
        let envelope: Self = serde_json::from_slice(&json)
            .map_err(|e| SwapError::envelope(e.to_string()))?;
        envelope.network()?;
        Ok(envelope)
    }

    pub fn network(&self) -> SwapResult<Network> {
        utils::network::parse(&self.network)
            .ok_or_else(|| SwapError::envelope(format!("unknown network {}", self.network)))
    }

    /// Consensus-decode the embedded transaction
    pub fn transaction(&self) -> SwapResult<Transaction> {
        let bytes = hex::decode(&self.raw)
            .map_err(|e| SwapError::envelope(format!("raw is not hex: {}", e)))?;
        consensus::deserialize(&bytes)
            .map_err(|e| SwapError::envelope(format!("raw is not a transaction: {}", e)))
    }
}

/// Rebuild the transaction an envelope describes and sign it
///
/// Dispatches on the envelope kind; the solver must match it.
pub fn sign_from_envelope(envelope: TransactionRaw, solver: &Solver) -> SwapResult<TransactionRaw> {
    match envelope.raw_type.kind {
        TxKind::Normal => sign_as::<NormalTransaction>(envelope, solver),
        TxKind::Fund => sign_as::<FundTransaction>(envelope, solver),
        TxKind::Claim => sign_as::<ClaimTransaction>(envelope, solver),
        TxKind::Refund => sign_as::<RefundTransaction>(envelope, solver),
    }
}

fn sign_as<T: SpendableTransaction>(envelope: TransactionRaw, solver: &Solver) -> SwapResult<TransactionRaw> {
    Ok(T::from_envelope(envelope)?.sign(solver)?.envelope())
}

/// Sign an encoded envelope, returning the encoded signed envelope
pub fn sign_transaction_raw(transaction_raw: &str, solver: &Solver) -> SwapResult<String> {
    sign_from_envelope(TransactionRaw::decode(transaction_raw)?, solver)?.encode()
}

/// An envelope with its transaction decoded, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRaw {
    pub envelope: TransactionRaw,
    pub transaction: Transaction,
    pub txid: Txid,
}

pub fn decode_transaction_raw(transaction_raw: &str) -> SwapResult<DecodedRaw> {
    let envelope = TransactionRaw::decode(transaction_raw)?;
    let transaction = envelope.transaction()?;
    Ok(DecodedRaw {
        txid: transaction.compute_txid(),
        envelope,
        transaction,
    })
}
