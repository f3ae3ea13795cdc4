use crate::error::{SwapError, SwapResult};
use crate::services::provider::{ChainProvider, TransactionDetail};
use crate::utils;
use crate::utxo::Utxo;
use bitcoin::{consensus, Address, Network, Transaction, Txid};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Chain collaborator backed by in-memory fixtures
///
/// Useful for offline tooling and tests. Submitted transactions are decoded,
/// recorded, and made available to `get_transaction`.
#[derive(Debug)]
pub struct InMemoryProvider {
    network: Network,
    utxos: RefCell<HashMap<String, Vec<Utxo>>>,
    transactions: RefCell<HashMap<Txid, TransactionDetail>>,
    submitted: RefCell<Vec<Transaction>>,
    offline: Cell<bool>,
}

impl InMemoryProvider {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            utxos: RefCell::new(HashMap::new()),
            transactions: RefCell::new(HashMap::new()),
            submitted: RefCell::new(Vec::new()),
            offline: Cell::new(false),
        }
    }

    /// Register an unspent output for an address
    pub fn add_utxo(&self, address: &Address, utxo: Utxo) {
        self.utxos
            .borrow_mut()
            .entry(address.to_string())
            .or_default()
            .push(utxo);
    }

    /// Register a transaction for lookup
    pub fn add_transaction(&self, tx: &Transaction) -> Txid {
        let detail = TransactionDetail::from_transaction(tx);
        let txid = detail.txid;
        self.transactions.borrow_mut().insert(txid, detail);
        txid
    }

    /// Make every call fail, as an unreachable node would
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Transactions accepted by `submit_raw`, in order
    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.borrow().clone()
    }

    fn check(&self, network: Network) -> SwapResult<()> {
        if self.offline.get() {
            return Err(SwapError::rpc("connection refused"));
        }
        if network != self.network {
            return Err(SwapError::rpc(format!(
                "provider serves {}, requested {}",
                utils::network::name(self.network),
                utils::network::name(network)
            )));
        }
        Ok(())
    }
}

impl ChainProvider for InMemoryProvider {
    fn get_balance(&self, address: &Address, network: Network) -> SwapResult<u64> {
        self.check(network)?;
        Ok(self
            .utxos
            .borrow()
            .get(&address.to_string())
            .map(|utxos| utxos.iter().map(|utxo| utxo.value).sum())
            .unwrap_or(0))
    }

    fn get_utxos(&self, address: &Address, network: Network, limit: usize) -> SwapResult<Vec<Utxo>> {
        self.check(network)?;
        Ok(self
            .utxos
            .borrow()
            .get(&address.to_string())
            .map(|utxos| utxos.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn get_transaction(&self, txid: &Txid, network: Network) -> SwapResult<TransactionDetail> {
        self.check(network)?;
        self.transactions
            .borrow()
            .get(txid)
            .cloned()
            .ok_or_else(|| SwapError::rpc(format!("transaction {} not found", txid)))
    }

    fn submit_raw(&self, raw_hex: &str, network: Network) -> SwapResult<Txid> {
        self.check(network)?;
        let bytes = hex::decode(raw_hex)?;
        let tx: Transaction = consensus::deserialize(&bytes)?;
        let txid = self.add_transaction(&tx);
        self.submitted.borrow_mut().push(tx);
        Ok(txid)
    }
}
