use crate::error::SwapResult;
use crate::utxo::Utxo;
use bitcoin::{Address, Network, ScriptBuf, Transaction, Txid};

/// An output of a transaction looked up on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDetail {
    /// Output index
    pub n: u32,
    /// Value in satoshis
    pub value: u64,
    pub script_pubkey: ScriptBuf,
}

impl OutputDetail {
    /// Whether the output is locked to a script hash (an HTLC candidate)
    pub fn is_script_hash(&self) -> bool {
        self.script_pubkey.is_p2sh()
    }
}

/// A transaction looked up on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetail {
    pub txid: Txid,
    pub outputs: Vec<OutputDetail>,
}

impl TransactionDetail {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            txid: tx.compute_txid(),
            outputs: tx
                .output
                .iter()
                .enumerate()
                .map(|(n, output)| OutputDetail {
                    n: n as u32,
                    value: output.value.to_sat(),
                    script_pubkey: output.script_pubkey.clone(),
                })
                .collect(),
        }
    }

    /// First output locked to a script hash
    pub fn contract_output(&self) -> Option<&OutputDetail> {
        self.outputs.iter().find(|output| output.is_script_hash())
    }
}

/// Chain queries and broadcast, supplied by the host application
///
/// Calls are blocking. Implementations may retry or time out internally; the
/// engine surfaces their failures unchanged as [`crate::SwapError::Rpc`].
pub trait ChainProvider {
    /// Confirmed balance of an address, in satoshis
    fn get_balance(&self, address: &Address, network: Network) -> SwapResult<u64>;

    /// Unspent outputs of an address, at most `limit` of them
    fn get_utxos(&self, address: &Address, network: Network, limit: usize) -> SwapResult<Vec<Utxo>>;

    /// Look up a transaction by id
    fn get_transaction(&self, txid: &Txid, network: Network) -> SwapResult<TransactionDetail>;

    /// Broadcast a hex-encoded transaction, returning its id
    fn submit_raw(&self, raw_hex: &str, network: Network) -> SwapResult<Txid>;
}
