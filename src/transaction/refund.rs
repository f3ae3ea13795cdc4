use super::{build_from_contract, BuildConfig, SendAmount, SpendableTransaction, TxCore, TxKind};
use crate::error::SwapResult;
use crate::services::ChainProvider;

/// Returns an expired HTLC to its sender through the timelock branch
///
/// The input sequence is taken from the solver at signing time, so the
/// unsigned envelope carries the default sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundTransaction {
    core: TxCore,
}

impl RefundTransaction {
    /// Pay the contract output of `transaction_id` back to the sender `address`
    pub fn build_transaction<P: ChainProvider + ?Sized>(
        provider: &P,
        config: &BuildConfig,
        transaction_id: &str,
        address: &str,
        amount: SendAmount,
    ) -> SwapResult<Self> {
        let core = build_from_contract(
            provider,
            config,
            TxKind::Refund,
            transaction_id,
            address,
            amount,
        )?;
        Ok(Self { core })
    }
}

impl SpendableTransaction for RefundTransaction {
    const KIND: TxKind = TxKind::Refund;

    fn core(&self) -> &TxCore {
        &self.core
    }

    fn into_core(self) -> TxCore {
        self.core
    }

    fn from_core(core: TxCore) -> Self {
        Self { core }
    }
}
