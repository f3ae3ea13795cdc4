//! # Error Types for the Swap Engine
//!
//! Every failure here concerns money movement, so all of them are returned to
//! the immediate caller. Nothing is retried or recovered silently.

use thiserror::Error;

/// Main error type for all swap operations
#[derive(Debug, Error)]
pub enum SwapError {
    /// Address cannot be decoded for the target network or has the wrong shape
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Secret hash is not exactly 32 bytes of hex
    #[error("Invalid secret hash: {message}")]
    InvalidSecretHash { message: String },

    /// Secret preimage does not open the contract hashlock
    #[error("Secret does not match the contract hashlock")]
    InvalidSecret,

    /// Malformed script bytecode or opcode text
    #[error("Script parse error: {message}")]
    ScriptParse { message: String },

    /// Solver bytecode is not a usable HTLC for this spend
    #[error("Invalid HTLC bytecode: {message}")]
    InvalidBytecode { message: String },

    /// Insufficient funds to cover amount plus fee
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    Balance { required: u64, available: u64 },

    /// Wrong solver variant for the transaction kind, or wrong kind of envelope
    #[error("Type mismatch: expected {expected}, found {found}")]
    SolverTypeMismatch { expected: String, found: String },

    /// Malformed or unrecognized transaction-raw envelope
    #[error("Invalid transaction raw: {message}")]
    InvalidEnvelope { message: String },

    /// Referenced funding transaction has no script-hash output
    #[error("No contract UTXO found in transaction {txid}")]
    NoContractUtxo { txid: String },

    /// Unrecognized amount unit
    #[error("Invalid unit {unit}, choose only BTC, mBTC or Satoshi")]
    Unit { unit: String },

    /// Chain collaborator failure, detail opaque to this engine
    #[error("RPC request failed: {message}")]
    Rpc { message: String },

    /// Transaction life cycle violations
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Hex decoding errors
    #[error("Hex decoding error: {source}")]
    Hex {
        #[from]
        source: hex::FromHexError,
    },

    /// Consensus decoding of a raw transaction failed
    #[error("Transaction decoding error: {source}")]
    Encode {
        #[from]
        source: bitcoin::consensus::encode::Error,
    },
}

/// Result type alias for swap operations
pub type SwapResult<T> = Result<T, SwapError>;

impl SwapError {
    /// Create an invalid address error
    pub fn address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a script parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ScriptParse {
            message: message.into(),
        }
    }

    /// Create an invalid bytecode error
    pub fn bytecode(message: impl Into<String>) -> Self {
        Self::InvalidBytecode {
            message: message.into(),
        }
    }

    /// Create an invalid envelope error
    pub fn envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            message: message.into(),
        }
    }

    /// Create a transaction life cycle error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a collaborator error
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Check if this error comes from the chain collaborator (the caller owns retry policy)
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::Rpc { .. })
    }

    /// Check if this error means the caller lacks funds rather than passed bad input
    pub fn is_balance_error(&self) -> bool {
        matches!(self, SwapError::Balance { .. })
    }
}

impl From<bitcoincore_rpc::Error> for SwapError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        SwapError::rpc(err.to_string())
    }
}
