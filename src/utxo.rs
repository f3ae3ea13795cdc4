//! # UTXO Selection and Fee Calculation
//!
//! Greedy, order-preserving selection: candidates are consumed in the order the
//! chain collaborator returned them, and the fee is recomputed after every
//! addition because it grows with the input count.

use crate::config::fee;
use crate::error::{SwapError, SwapResult};
use bitcoin::{OutPoint, ScriptBuf, Txid};

/// An unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    /// Spending condition the value is locked under
    pub script_pubkey: ScriptBuf,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// Linear fee policy over input and output counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeModel {
    /// Cost of a one-input, one-output transaction
    pub base_input_cost: u64,
    /// Cost of every input beyond the first
    pub marginal_input_cost: u64,
    /// Cost of every output beyond the first
    pub marginal_output_cost: u64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            base_input_cost: fee::BASE_INPUT_COST,
            marginal_input_cost: fee::MARGINAL_INPUT_COST,
            marginal_output_cost: fee::MARGINAL_OUTPUT_COST,
        }
    }
}

impl FeeModel {
    /// Estimated fee for a transaction shape. Counts below one are treated as one.
    pub fn fee(&self, inputs: usize, outputs: usize) -> u64 {
        let extra_inputs = (inputs.saturating_sub(1) as u64).saturating_mul(self.marginal_input_cost);
        let extra_outputs = (outputs.saturating_sub(1) as u64).saturating_mul(self.marginal_output_cost);
        self.base_input_cost
            .saturating_add(extra_inputs)
            .saturating_add(extra_outputs)
    }
}

/// Outcome of a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selected outputs, in candidate order
    pub utxos: Vec<Utxo>,
    /// Sum of the selected values
    pub total: u64,
    /// Fee for the selected input count
    pub fee: u64,
}

impl Selection {
    /// Value left over after paying `target` and the fee
    pub fn change(&self, target: u64) -> u64 {
        self.total.saturating_sub(target.saturating_add(self.fee))
    }
}

/// Select candidates until they cover `target` plus the fee for `outputs` outputs
pub fn select_utxos(
    candidates: &[Utxo],
    target: u64,
    outputs: usize,
    fee_model: &FeeModel,
) -> SwapResult<Selection> {
    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in candidates {
        total = total.saturating_add(utxo.value);
        selected.push(utxo.clone());

        let fee = fee_model.fee(selected.len(), outputs);
        let required = target.checked_add(fee).ok_or(SwapError::Balance {
            required: u64::MAX,
            available: total,
        })?;
        if total >= required {
            log::debug!(
                "Selected {} of {} utxos: total {} covers target {} plus fee {}",
                selected.len(),
                candidates.len(),
                total,
                target,
                fee
            );
            return Ok(Selection {
                utxos: selected,
                total,
                fee,
            });
        }
    }

    Err(SwapError::Balance {
        required: target.saturating_add(fee_model.fee(candidates.len(), outputs)),
        available: total,
    })
}

/// Select candidates covering the whole `balance`, then take the fee out of it
///
/// The swept amount is `selection.total - selection.fee`.
pub fn sweep_utxos(
    candidates: &[Utxo],
    balance: u64,
    outputs: usize,
    fee_model: &FeeModel,
) -> SwapResult<Selection> {
    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in candidates {
        if total >= balance && !selected.is_empty() {
            break;
        }
        total = total.saturating_add(utxo.value);
        selected.push(utxo.clone());
    }

    let fee = fee_model.fee(selected.len(), outputs);
    if total < balance || total <= fee {
        return Err(SwapError::Balance {
            required: balance.max(fee.saturating_add(1)),
            available: total,
        });
    }

    log::debug!("Sweeping {} utxos: total {} minus fee {}", selected.len(), total, fee);
    Ok(Selection {
        utxos: selected,
        total,
        fee,
    })
}
