use super::{build_from_wallet, BuildConfig, SendAmount, SpendableTransaction, TxCore, TxKind};
use crate::error::SwapResult;
use crate::services::ChainProvider;
use crate::utils::address;
use std::collections::BTreeMap;

/// Locks value from a P2PKH sender into an HTLC address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundTransaction {
    core: TxCore,
}

impl FundTransaction {
    /// Fund `htlc_address` from `sender`, with change back to the sender
    pub fn build_transaction<P: ChainProvider + ?Sized>(
        provider: &P,
        config: &BuildConfig,
        sender: &str,
        htlc_address: &str,
        amount: SendAmount,
    ) -> SwapResult<Self> {
        let sender_address = address::parse_p2pkh(sender, config.network)?;
        let contract_address = address::parse_p2sh(htlc_address, config.network)?;

        let mut extra = BTreeMap::new();
        extra.insert("address".to_string(), sender_address.to_string());
        extra.insert("htlc_address".to_string(), contract_address.to_string());

        let core = build_from_wallet(
            provider,
            config,
            TxKind::Fund,
            &sender_address,
            &[(contract_address.script_pubkey(), amount)],
            extra,
        )?;
        Ok(Self { core })
    }
}

impl SpendableTransaction for FundTransaction {
    const KIND: TxKind = TxKind::Fund;

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
