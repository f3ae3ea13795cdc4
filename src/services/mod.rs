//! # Services Module
//!
//! Chain collaborators for the swap engine.
//!
//! ## Components
//!
//! - **Provider**: the `ChainProvider` interface the host application supplies
//! - **RPC Client**: Bitcoin Core RPC implementation
//! - **Memory**: fixture-backed implementation for offline tools and tests

pub mod memory;
pub mod provider;
pub mod rpc_client;

pub use memory::InMemoryProvider;
pub use provider::{ChainProvider, OutputDetail, TransactionDetail};
pub use rpc_client::BitcoinRpcProvider;

use crate::error::{SwapError, SwapResult};
use crate::signature::TransactionRaw;
use crate::transaction::TxState;
use bitcoin::Txid;

/// Broadcast a signed transaction-raw envelope
pub fn submit_transaction_raw<P: ChainProvider + ?Sized>(provider: &P, transaction_raw: &str) -> SwapResult<Txid> {
    let envelope = TransactionRaw::decode(transaction_raw)?;
    if envelope.raw_type.state != TxState::Signed {
        return Err(SwapError::envelope(format!(
            "cannot submit {} transaction raw, sign it first",
            envelope.raw_type
        )));
    }

    let network = envelope.network()?;
    log::info!("Submitting {} transaction", envelope.raw_type);
    provider.submit_raw(&envelope.raw, network)
}
