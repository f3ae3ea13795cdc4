//! # Bitcoin Swap: HTLC Atomic Swap Engine
//!
//! Core library for cross-chain atomic swaps on Bitcoin using P2SH hash time
//! lock contracts. Builds the contract script, selects and spends UTXOs for
//! normal, fund, claim and refund transactions, and moves unsigned
//! transactions to an offline signer through a portable transaction-raw
//! envelope.

pub mod config;
pub mod error;
pub mod htlc;
pub mod script;
pub mod services;
pub mod signature;
pub mod solver;
pub mod transaction;
pub mod utils;
pub mod utxo;

// Re-export commonly used types
pub use error::{SwapError, SwapResult};
pub use htlc::{build_htlc, Htlc};
pub use services::{submit_transaction_raw, BitcoinRpcProvider, ChainProvider, InMemoryProvider};
pub use signature::{decode_transaction_raw, sign_from_envelope, sign_transaction_raw, TransactionRaw};
pub use solver::{ClaimSolver, FundSolver, KeySource, NormalSolver, RefundSolver, Solver, WithdrawSolver};
pub use transaction::{
    BuildConfig, ClaimTransaction, FundTransaction, NormalTransaction, RefundTransaction, SendAmount,
    SpendableTransaction, TxKind, TxState, WithdrawTransaction,
};
pub use utxo::{FeeModel, Utxo};
