use super::{build_from_wallet, BuildConfig, SendAmount, SpendableTransaction, TxCore, TxKind};
use crate::error::SwapResult;
use crate::services::ChainProvider;
use crate::utils::address;
use std::collections::BTreeMap;

/// Plain transfer from a P2PKH address to one or more recipients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalTransaction {
    core: TxCore,
}

impl NormalTransaction {
    /// Select the sender's outputs to pay every recipient, with change back to the sender
    ///
    /// [`SendAmount::Max`] sweeps the sender and requires a single recipient.
    pub fn build_transaction<P: ChainProvider + ?Sized>(
        provider: &P,
        config: &BuildConfig,
        sender: &str,
        recipients: &[(&str, SendAmount)],
    ) -> SwapResult<Self> {
        let sender_address = address::parse_p2pkh(sender, config.network)?;
        let payouts = recipients
            .iter()
            .map(|(recipient, amount)| {
                let recipient = address::validate_and_parse(recipient, config.network)?;
                Ok((recipient.script_pubkey(), *amount))
            })
            .collect::<SwapResult<Vec<_>>>()?;

        let mut extra = BTreeMap::new();
        extra.insert("address".to_string(), sender_address.to_string());

        let core = build_from_wallet(
            provider,
            config,
            TxKind::Normal,
            &sender_address,
            &payouts,
            extra,
        )?;
        Ok(Self { core })
    }
}

impl SpendableTransaction for NormalTransaction {
    const KIND: TxKind = TxKind::Normal;

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
