use super::{build_from_contract, BuildConfig, SendAmount, SpendableTransaction, TxCore, TxKind};
use crate::error::SwapResult;
use crate::services::ChainProvider;

/// Spends a funded HTLC through its hashlock branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTransaction {
    core: TxCore,
}

/// The counterparty's side of a swap builds the same claim
pub type WithdrawTransaction = ClaimTransaction;

impl ClaimTransaction {
    /// Pay the contract output of `transaction_id` to the recipient `address`
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
            TxKind::Claim,
            transaction_id,
            address,
            amount,
        )?;
        Ok(Self { core })
    }
}

impl SpendableTransaction for ClaimTransaction {
    const KIND: TxKind = TxKind::Claim;

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
