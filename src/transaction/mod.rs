//! # Transaction Builders
//!
//! One builder per transaction kind, all sharing the same life cycle:
//!
//! ```text
//! build_transaction(..) -> Unsigned --sign(solver)--> Signed
//!          |                    |                       |
//!          +---- transaction_raw() at either state -----+
//! ```
//!
//! Shared bookkeeping (kind tag, state, fee, spent output metadata) lives in
//! [`TxCore`]; the per-kind types only differ in how they select inputs.
//! Signing consumes the unsigned value and returns a signed one, so there is
//! no way back to the unsigned state.

pub mod claim;
pub mod fund;
pub mod normal;
pub mod refund;

#[cfg(test)]
mod tests;

pub use claim::{ClaimTransaction, WithdrawTransaction};
pub use fund::FundTransaction;
pub use normal::NormalTransaction;
pub use refund::RefundTransaction;

use crate::config::network as network_config;
use crate::error::{SwapError, SwapResult};
use crate::services::ChainProvider;
use crate::signature::{RawType, TransactionRaw};
use crate::solver::Solver;
use crate::utils;
use crate::utxo::{select_utxos, sweep_utxos, FeeModel, Utxo};
use bitcoin::{
    absolute::LockTime,
    consensus::encode::serialize_hex,
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Transaction kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Normal,
    Fund,
    Claim,
    Refund,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxKind::Normal => "normal",
            TxKind::Fund => "fund",
            TxKind::Claim => "claim",
            TxKind::Refund => "refund",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TxKind {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(TxKind::Normal),
            "fund" => Ok(TxKind::Fund),
            "claim" => Ok(TxKind::Claim),
            "refund" => Ok(TxKind::Refund),
            _ => Err(SwapError::envelope(format!("unknown transaction kind {}", s))),
        }
    }
}

/// Signing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Unsigned,
    Signed,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Unsigned => write!(f, "unsigned"),
            TxState::Signed => write!(f, "signed"),
        }
    }
}

impl FromStr for TxState {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsigned" => Ok(TxState::Unsigned),
            "signed" => Ok(TxState::Signed),
            _ => Err(SwapError::envelope(format!("unknown transaction state {}", s))),
        }
    }
}

/// Amount to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAmount {
    /// Exact value in satoshis; the fee is paid on top
    Exact(u64),
    /// Everything available; the fee is taken out of it
    Max,
}

/// Spent output metadata carried in the envelope so signing needs no chain query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousOutput {
    /// Value in satoshis
    pub value: u64,
    /// Output index in the funding transaction
    pub tx_output_n: u32,
    /// Locking script, hex
    pub script: String,
}

impl PreviousOutput {
    pub fn from_utxo(utxo: &Utxo) -> Self {
        Self {
            value: utxo.value,
            tx_output_n: utxo.vout,
            script: hex::encode(utxo.script_pubkey.as_bytes()),
        }
    }

    pub fn script_pubkey(&self) -> SwapResult<ScriptBuf> {
        Ok(ScriptBuf::from_bytes(hex::decode(&self.script)?))
    }
}

/// Parameters shared by every builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    pub network: Network,
    pub fee_model: FeeModel,
    /// Maximum number of unspent outputs requested from the collaborator
    pub utxo_limit: usize,
}

impl BuildConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            fee_model: FeeModel::default(),
            utxo_limit: network_config::DEFAULT_UTXO_LIMIT,
        }
    }

    pub fn with_fee_model(mut self, fee_model: FeeModel) -> Self {
        self.fee_model = fee_model;
        self
    }

    pub fn with_utxo_limit(mut self, utxo_limit: usize) -> Self {
        self.utxo_limit = utxo_limit;
        self
    }
}

/// State shared by every transaction kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCore {
    kind: TxKind,
    state: TxState,
    network: Network,
    fee: u64,
    transaction: Transaction,
    previous_outputs: Vec<PreviousOutput>,
    extra: BTreeMap<String, String>,
}

impl TxCore {
    /// Assemble an unsigned transaction spending `inputs` into `outputs`
    fn unsigned(
        kind: TxKind,
        network: Network,
        fee: u64,
        inputs: Vec<(OutPoint, PreviousOutput)>,
        outputs: Vec<TxOut>,
        extra: BTreeMap<String, String>,
    ) -> Self {
        let (outpoints, previous_outputs): (Vec<_>, Vec<_>) = inputs.into_iter().unzip();
        let transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: outpoints
                .into_iter()
                .map(|previous_output| TxIn {
                    previous_output,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs,
        };

        log::info!(
            "Built {} transaction: {} inputs, {} outputs, fee {}",
            kind,
            transaction.input.len(),
            transaction.output.len(),
            utils::amount::format_dual(fee)
        );
        Self {
            kind,
            state: TxState::Unsigned,
            network,
            fee,
            transaction,
            previous_outputs,
            extra,
        }
    }

    /// Rebuild from an envelope, without any chain query
    pub fn from_envelope(envelope: TransactionRaw) -> SwapResult<Self> {
        let transaction = envelope.transaction()?;
        let network = envelope.network()?;
        if envelope.outputs.len() != transaction.input.len() {
            return Err(SwapError::envelope(format!(
                "{} spent outputs described for {} inputs",
                envelope.outputs.len(),
                transaction.input.len()
            )));
        }

        Ok(Self {
            kind: envelope.raw_type.kind,
            state: envelope.raw_type.state,
            network,
            fee: envelope.fee,
            transaction,
            previous_outputs: envelope.outputs,
            extra: envelope.extra,
        })
    }

    /// Portable envelope for the current state
    pub fn envelope(&self) -> TransactionRaw {
        TransactionRaw {
            raw_type: RawType {
                kind: self.kind,
                state: self.state,
            },
            network: utils::network::name(self.network).to_string(),
            fee: self.fee,
            raw: serialize_hex(&self.transaction),
            outputs: self.previous_outputs.clone(),
            extra: self.extra.clone(),
        }
    }

    /// Sign every input with `solver`
    ///
    /// Only the embedded spent output metadata feeds the sighash, so a core
    /// rebuilt from its envelope signs to the same bytes.
    pub fn sign(mut self, solver: &Solver) -> SwapResult<Self> {
        if self.state == TxState::Signed {
            return Err(SwapError::transaction(format!(
                "{} transaction is already signed",
                self.kind
            )));
        }
        solver.expect_kind(self.kind)?;

        let spent_scripts = self
            .previous_outputs
            .iter()
            .map(PreviousOutput::script_pubkey)
            .collect::<SwapResult<Vec<_>>>()?;
        for script_pubkey in &spent_scripts {
            solver.check_spendable(script_pubkey)?;
        }

        if let Some(sequence) = solver.sequence() {
            for input in &mut self.transaction.input {
                input.sequence = sequence;
            }
        }

        let script_sigs = {
            let cache = SighashCache::new(&self.transaction);
            spent_scripts
                .iter()
                .enumerate()
                .map(|(index, script_pubkey)| {
                    let sighash = cache
                        .legacy_signature_hash(
                            index,
                            &solver.script_code(script_pubkey),
                            EcdsaSighashType::All.to_u32(),
                        )
                        .map_err(|e| SwapError::transaction(e.to_string()))?;
                    solver.unlocking_script(sighash)
                })
                .collect::<SwapResult<Vec<_>>>()?
        };
        for (input, script_sig) in self.transaction.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        self.state = TxState::Signed;
        log::info!(
            "Signed {} transaction {}",
            self.kind,
            self.transaction.compute_txid()
        );
        Ok(self)
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn previous_outputs(&self) -> &[PreviousOutput] {
        &self.previous_outputs
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }
}

/// Life cycle shared by every transaction kind
pub trait SpendableTransaction: Sized {
    /// Kind tag this type builds
    const KIND: TxKind;

    fn core(&self) -> &TxCore;

    fn into_core(self) -> TxCore;

    /// Wrap a core already known to be of kind [`Self::KIND`]
    fn from_core(core: TxCore) -> Self;

    /// Sign with a solver of the matching kind
    fn sign(self, solver: &Solver) -> SwapResult<Self> {
        Ok(Self::from_core(self.into_core().sign(solver)?))
    }

    fn envelope(&self) -> TransactionRaw {
        self.core().envelope()
    }

    /// Encoded transaction-raw envelope, valid at either state
    fn transaction_raw(&self) -> SwapResult<String> {
        self.envelope().encode()
    }

    /// Resume from a decoded envelope of this kind
    fn from_envelope(envelope: TransactionRaw) -> SwapResult<Self> {
        if envelope.raw_type.kind != Self::KIND {
            return Err(SwapError::SolverTypeMismatch {
                expected: format!("{} transaction raw", Self::KIND),
                found: format!("{} transaction raw", envelope.raw_type.kind),
            });
        }
        Ok(Self::from_core(TxCore::from_envelope(envelope)?))
    }

    fn from_transaction_raw(transaction_raw: &str) -> SwapResult<Self> {
        Self::from_envelope(TransactionRaw::decode(transaction_raw)?)
    }

    fn fee(&self) -> u64 {
        self.core().fee()
    }

    fn state(&self) -> TxState {
        self.core().state()
    }

    fn transaction(&self) -> &Transaction {
        self.core().transaction()
    }
}

/// Reject amounts no output can carry
fn check_amount(value: u64) -> SwapResult<()> {
    if value == 0 {
        return Err(SwapError::transaction("amount must be greater than zero"));
    }
    if value > Amount::MAX_MONEY.to_sat() {
        return Err(SwapError::transaction(format!(
            "amount {} exceeds the money supply",
            value
        )));
    }
    Ok(())
}

/// Spend P2PKH outputs of `sender` to `payouts`, returning change to `sender`
///
/// Shared by normal and fund transactions.
fn build_from_wallet<P: ChainProvider + ?Sized>(
    provider: &P,
    config: &BuildConfig,
    kind: TxKind,
    sender: &Address,
    payouts: &[(ScriptBuf, SendAmount)],
    extra: BTreeMap<String, String>,
) -> SwapResult<TxCore> {
    if payouts.is_empty() {
        return Err(SwapError::transaction("at least one recipient is required"));
    }
    let max_count = payouts
        .iter()
        .filter(|(_, amount)| *amount == SendAmount::Max)
        .count();
    if max_count > 0 && payouts.len() > 1 {
        return Err(SwapError::transaction(
            "max amount can only be sent to a single recipient",
        ));
    }
    for (_, amount) in payouts {
        if let SendAmount::Exact(value) = amount {
            check_amount(*value)?;
        }
    }

    let utxos = provider.get_utxos(sender, config.network, config.utxo_limit)?;
    let (selection, outputs) = match payouts {
        [(script_pubkey, SendAmount::Max)] => {
            let balance = provider.get_balance(sender, config.network)?;
            let selection = sweep_utxos(&utxos, balance, 1, &config.fee_model)?;
            let output = TxOut {
                value: Amount::from_sat(selection.total - selection.fee),
                script_pubkey: script_pubkey.clone(),
            };
            (selection, vec![output])
        }
        _ => {
            let target = payouts
                .iter()
                .try_fold(0u64, |sum, (_, amount)| match amount {
                    SendAmount::Exact(value) => sum.checked_add(*value),
                    SendAmount::Max => Some(sum),
                })
                .filter(|target| *target <= Amount::MAX_MONEY.to_sat())
                .ok_or_else(|| SwapError::transaction("total amount exceeds the money supply"))?;
            let selection = select_utxos(&utxos, target, payouts.len() + 1, &config.fee_model)?;

            let mut outputs: Vec<TxOut> = payouts
                .iter()
                .map(|(script_pubkey, amount)| TxOut {
                    value: Amount::from_sat(match amount {
                        SendAmount::Exact(value) => *value,
                        SendAmount::Max => 0,
                    }),
                    script_pubkey: script_pubkey.clone(),
                })
                .collect();
            let change = selection.change(target);
            if change > 0 {
                outputs.push(TxOut {
                    value: Amount::from_sat(change),
                    script_pubkey: sender.script_pubkey(),
                });
            }
            (selection, outputs)
        }
    };

    let inputs = selection
        .utxos
        .iter()
        .map(|utxo| (utxo.outpoint(), PreviousOutput::from_utxo(utxo)))
        .collect();
    Ok(TxCore::unsigned(
        kind,
        config.network,
        selection.fee,
        inputs,
        outputs,
        extra,
    ))
}

/// Spend the contract output of a funding transaction to `address`
///
/// Shared by claim and refund transactions, which differ only in the script
/// branch their solver satisfies. An exact amount leaves the remainder locked
/// back under the contract script.
fn build_from_contract<P: ChainProvider + ?Sized>(
    provider: &P,
    config: &BuildConfig,
    kind: TxKind,
    funding_txid: &str,
    address: &str,
    amount: SendAmount,
) -> SwapResult<TxCore> {
    let txid = bitcoin::Txid::from_str(funding_txid.trim()).map_err(|e| {
        SwapError::transaction(format!("invalid funding transaction id {}: {}", funding_txid, e))
    })?;
    let destination = utils::address::validate_and_parse(address, config.network)?;

    let detail = provider.get_transaction(&txid, config.network)?;
    let contract = detail
        .contract_output()
        .ok_or_else(|| SwapError::NoContractUtxo {
            txid: txid.to_string(),
        })?;
    log::debug!(
        "Found contract output {}:{} worth {}",
        txid,
        contract.n,
        contract.value
    );

    let single_fee = config.fee_model.fee(1, 1);
    let (fee, outputs) = match amount {
        SendAmount::Max => {
            if contract.value <= single_fee {
                return Err(SwapError::Balance {
                    required: single_fee.saturating_add(1),
                    available: contract.value,
                });
            }
            let payout = TxOut {
                value: Amount::from_sat(contract.value - single_fee),
                script_pubkey: destination.script_pubkey(),
            };
            (single_fee, vec![payout])
        }
        SendAmount::Exact(value) => {
            check_amount(value)?;
            let required = value.saturating_add(single_fee);
            if required > contract.value {
                return Err(SwapError::Balance {
                    required,
                    available: contract.value,
                });
            }
            let payout = TxOut {
                value: Amount::from_sat(value),
                script_pubkey: destination.script_pubkey(),
            };
            let change_fee = config.fee_model.fee(1, 2);
            let leftover = contract.value - value;
            if leftover > change_fee {
                let change = TxOut {
                    value: Amount::from_sat(leftover - change_fee),
                    script_pubkey: contract.script_pubkey.clone(),
                };
                (change_fee, vec![payout, change])
            } else {
                // leftover too small to pay for a change output goes to the fee
                (leftover, vec![payout])
            }
        }
    };

    let mut extra = BTreeMap::new();
    if let Ok(htlc_address) = Address::from_script(&contract.script_pubkey, config.network) {
        extra.insert("htlc_address".to_string(), htlc_address.to_string());
    }
    extra.insert("address".to_string(), destination.to_string());

    let previous_output = PreviousOutput {
        value: contract.value,
        tx_output_n: contract.n,
        script: hex::encode(contract.script_pubkey.as_bytes()),
    };
    Ok(TxCore::unsigned(
        kind,
        config.network,
        fee,
        vec![(OutPoint::new(txid, contract.n), previous_output)],
        outputs,
        extra,
    ))
}
