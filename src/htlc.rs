//! # Hash Time Lock Contract
//!
//! Builds the P2SH redeem script that pays the recipient once they reveal the
//! secret, or refunds the sender after a relative timeout:
//!
//! ```text
//! IfElse(
//!     Hashlock(sha256(secret_hash), pay-to(recipient)),
//!     RelativeTimelock(sequence, pay-to(sender)),
//! )
//! ```
//!
//! The hashlock stores `sha256(secret_hash)` because the script checks it with
//! `OP_HASH256`, the double sha256 of the revealed secret.

use crate::config::{htlc as htlc_config, network as network_config};
use crate::error::{SwapError, SwapResult};
use crate::script::ScriptNode;
use crate::services::ChainProvider;
use crate::utils::{address, crypto};
use crate::utxo::Utxo;
use bitcoin::{hashes::Hash, Address, Network, PubkeyHash, ScriptBuf};

/// Parameters recovered from an HTLC script tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtlcTerms {
    /// Digest checked by `OP_HASH256`
    pub hashlock: [u8; 32],
    /// Public key hash paid by the hashlock branch
    pub recipient: PubkeyHash,
    /// Relative timeout of the refund branch
    pub sequence: u32,
    /// Public key hash paid by the timelock branch
    pub sender: PubkeyHash,
}

impl HtlcTerms {
    /// Match a script tree against the `IfElse(Hashlock, RelativeTimelock)` shape
    pub fn from_script(script: &ScriptNode) -> Option<Self> {
        let ScriptNode::IfElse {
            if_branch,
            else_branch,
        } = script
        else {
            return None;
        };
        let ScriptNode::Hashlock { hash, inner } = if_branch.as_ref() else {
            return None;
        };
        let ScriptNode::PayToPubkeyHash(recipient) = inner.as_ref() else {
            return None;
        };
        let ScriptNode::RelativeTimelock { sequence, inner } = else_branch.as_ref() else {
            return None;
        };
        let ScriptNode::PayToPubkeyHash(sender) = inner.as_ref() else {
            return None;
        };

        Some(Self {
            hashlock: *hash,
            recipient: *recipient,
            sequence: *sequence,
            sender: *sender,
        })
    }

    /// Script tree for these terms
    pub fn to_script(&self) -> ScriptNode {
        ScriptNode::if_else(
            ScriptNode::hashlock(self.hashlock, ScriptNode::pay_to(self.recipient)),
            ScriptNode::relative_timelock(self.sequence, ScriptNode::pay_to(self.sender)),
        )
    }

    /// Parse HTLC bytecode, rejecting anything that does not compile back byte for byte
    pub fn from_bytecode(bytecode: &[u8]) -> SwapResult<(Self, ScriptNode)> {
        let script = ScriptNode::from_bytecode(bytecode)?;
        if script.compile().as_bytes() != bytecode {
            return Err(SwapError::parse("bytecode is not in canonical form"));
        }
        let terms = Self::from_script(&script)
            .ok_or_else(|| SwapError::parse("script is not an IfElse(Hashlock, RelativeTimelock) HTLC"))?;
        Ok((terms, script))
    }
}

/// An HTLC agreement bound to a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Htlc {
    terms: HtlcTerms,
    script: ScriptNode,
    network: Network,
}

/// Build an HTLC from swap parameters
///
/// `secret_hash` is the sha256 of the secret; `recipient` and `sender` must be
/// P2PKH addresses on `network`.
pub fn build_htlc(
    secret_hash: &[u8],
    recipient: &str,
    sender: &str,
    sequence: u32,
    network: Network,
) -> SwapResult<Htlc> {
    let secret_hash: [u8; htlc_config::SECRET_HASH_LENGTH] =
        secret_hash
            .try_into()
            .map_err(|_| SwapError::InvalidSecretHash {
                message: format!(
                    "expected {} bytes, got {}",
                    htlc_config::SECRET_HASH_LENGTH,
                    secret_hash.len()
                ),
            })?;

    let terms = HtlcTerms {
        hashlock: crypto::sha256(&secret_hash),
        recipient: address::pubkey_hash(recipient, network)?,
        sequence,
        sender: address::pubkey_hash(sender, network)?,
    };
    log::debug!("Built HTLC for recipient {} and sender {} with sequence {}", recipient, sender, sequence);

    Ok(Htlc {
        script: terms.to_script(),
        terms,
        network,
    })
}

impl Htlc {
    /// Recover an HTLC from hex bytecode
    pub fn from_bytecode(bytecode: &str, network: Network) -> SwapResult<Self> {
        let bytes = hex::decode(bytecode.trim())
            .map_err(|e| SwapError::parse(format!("bytecode is not hex: {}", e)))?;
        let (terms, script) = HtlcTerms::from_bytecode(&bytes)?;
        Ok(Self {
            terms,
            script,
            network,
        })
    }

    /// Recover an HTLC from its opcode text
    pub fn from_opcode(opcode: &str, network: Network) -> SwapResult<Self> {
        let script = ScriptNode::from_opcode(opcode)?;
        let terms = HtlcTerms::from_script(&script)
            .ok_or_else(|| SwapError::parse("script is not an IfElse(Hashlock, RelativeTimelock) HTLC"))?;
        Ok(Self {
            terms,
            script,
            network,
        })
    }

    pub fn terms(&self) -> &HtlcTerms {
        &self.terms
    }

    pub fn script(&self) -> &ScriptNode {
        &self.script
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn hashlock(&self) -> [u8; 32] {
        self.terms.hashlock
    }

    pub fn recipient_hash(&self) -> PubkeyHash {
        self.terms.recipient
    }

    pub fn sender_hash(&self) -> PubkeyHash {
        self.terms.sender
    }

    pub fn sequence(&self) -> u32 {
        self.terms.sequence
    }

    /// Redeem script
    pub fn redeem_script(&self) -> ScriptBuf {
        self.script.compile()
    }

    /// Hex bytecode of the redeem script
    pub fn bytecode(&self) -> String {
        hex::encode(self.redeem_script().as_bytes())
    }

    /// Opcode text of the redeem script
    pub fn opcode(&self) -> String {
        self.script.opcode()
    }

    /// P2SH locking script, `OP_HASH160 <hash160(redeem)> OP_EQUAL`
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2sh(&self.redeem_script().script_hash())
    }

    /// Hex of the P2SH locking script
    pub fn hash(&self) -> String {
        hex::encode(self.script_pubkey().as_bytes())
    }

    /// Contract address
    pub fn address(&self) -> Address {
        Address::p2sh_from_hash(self.redeem_script().script_hash(), self.network)
    }

    /// Script hash of the redeem script, as raw bytes
    pub fn script_hash(&self) -> [u8; 20] {
        self.redeem_script().script_hash().to_byte_array()
    }

    /// Balance locked in the contract address
    pub fn balance<P: ChainProvider + ?Sized>(&self, provider: &P) -> SwapResult<u64> {
        provider.get_balance(&self.address(), self.network)
    }

    /// Unspent outputs locked in the contract address
    pub fn utxos<P: ChainProvider + ?Sized>(&self, provider: &P, limit: Option<usize>) -> SwapResult<Vec<Utxo>> {
        provider.get_utxos(
            &self.address(),
            self.network,
            limit.unwrap_or(network_config::DEFAULT_UTXO_LIMIT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryProvider;
    use bitcoin::Txid;
    use std::str::FromStr;

    const RECIPIENT: &str = "mgokpSJoX7npmAK1Zj8ze1926CLxYDt1iF";
    const SENDER: &str = "mkFWGt4hT11XS8dJKzzRFsTrqjjAwZfQAC";
    const BYTECODE: &str = "63aa20821124b554d13f247b1e5d10b84e44fb1296f18f38bbaa1bea34a12c843e01588876a9140e259e08f2ec9fc99a92b6f66fdfcb3c7914fd6888ac6702e803b27576a91433ecab3d67f0e2bde43e52f41ec1ecbdc73f11f888ac68";
    const OPCODE: &str = "OP_IF OP_HASH256 821124b554d13f247b1e5d10b84e44fb1296f18f38bbaa1bea34a12c843e0158 OP_EQUALVERIFY OP_DUP OP_HASH160 0e259e08f2ec9fc99a92b6f66fdfcb3c7914fd68 OP_EQUALVERIFY OP_CHECKSIG OP_ELSE e803 OP_CHECKSEQUENCEVERIFY OP_DROP OP_DUP OP_HASH160 33ecab3d67f0e2bde43e52f41ec1ecbdc73f11f8 OP_EQUALVERIFY OP_CHECKSIG OP_ENDIF";

    fn test_htlc() -> Htlc {
        build_htlc(
            &crypto::secret_hash(b"Hello Meheret!"),
            RECIPIENT,
            SENDER,
            1000,
            Network::Testnet,
        )
        .unwrap()
    }

    #[test]
    fn test_build_htlc_reference_vector() {
        let htlc = test_htlc();

        assert_eq!(htlc.bytecode(), BYTECODE);
        assert_eq!(htlc.opcode(), OPCODE);
        assert_eq!(htlc.hash(), "a9149418feed4647e156d6663db3e0cef7c050d0386787");
        assert_eq!(htlc.address().to_string(), "2N6kHwQy6Ph5EdKNgzGrcW2WhGHKGfmP5ae");
        assert_eq!(htlc.sequence(), 1000);
        assert_eq!(
            hex::encode(htlc.hashlock()),
            "821124b554d13f247b1e5d10b84e44fb1296f18f38bbaa1bea34a12c843e0158"
        );
    }

    #[test]
    fn test_mainnet_address_uses_mainnet_prefix() {
        let htlc = Htlc::from_bytecode(BYTECODE, Network::Bitcoin).unwrap();
        assert_eq!(htlc.address().to_string(), "3FC5sg34nEZtRXk9K9Ejt5XS3w76taLBVs");
    }

    #[test]
    fn test_round_trip_through_bytecode_and_opcode() {
        let htlc = test_htlc();

        let from_bytecode = Htlc::from_bytecode(&htlc.bytecode(), Network::Testnet).unwrap();
        let from_opcode = Htlc::from_opcode(&htlc.opcode(), Network::Testnet).unwrap();

        for recovered in [&from_bytecode, &from_opcode] {
            assert_eq!(recovered.bytecode(), htlc.bytecode());
            assert_eq!(recovered.opcode(), htlc.opcode());
            assert_eq!(recovered.hash(), htlc.hash());
            assert_eq!(recovered.address(), htlc.address());
            assert_eq!(recovered.terms(), htlc.terms());
        }
    }

    #[test]
    fn test_address_is_deterministic() {
        assert_eq!(test_htlc().address(), test_htlc().address());

        let other = build_htlc(
            &crypto::secret_hash(b"Hello Meheret!"),
            RECIPIENT,
            SENDER,
            1001,
            Network::Testnet,
        )
        .unwrap();
        assert_ne!(other.address(), test_htlc().address());
    }

    #[test]
    fn test_invalid_secret_hash() {
        let result = build_htlc(&[0u8; 31], RECIPIENT, SENDER, 1000, Network::Testnet);
        assert!(matches!(result, Err(SwapError::InvalidSecretHash { .. })));
    }

    #[test]
    fn test_invalid_party_addresses() {
        let secret_hash = crypto::secret_hash(b"Hello Meheret!");

        // wrong network
        let result = build_htlc(&secret_hash, RECIPIENT, SENDER, 1000, Network::Bitcoin);
        assert!(matches!(result, Err(SwapError::InvalidAddress { .. })));

        // P2SH is not a party identity
        let result = build_htlc(
            &secret_hash,
            "2N6kHwQy6Ph5EdKNgzGrcW2WhGHKGfmP5ae",
            SENDER,
            1000,
            Network::Testnet,
        );
        assert!(matches!(result, Err(SwapError::InvalidAddress { .. })));

        let result = build_htlc(&secret_hash, RECIPIENT, "garbage", 1000, Network::Testnet);
        assert!(matches!(result, Err(SwapError::InvalidAddress { .. })));
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        // a bare pay-to-pubkey-hash script parses but is not an HTLC
        let p2pkh = "76a9140e259e08f2ec9fc99a92b6f66fdfcb3c7914fd6888ac";
        assert!(matches!(
            Htlc::from_bytecode(p2pkh, Network::Testnet),
            Err(SwapError::ScriptParse { .. })
        ));
        assert!(matches!(
            Htlc::from_bytecode("zz", Network::Testnet),
            Err(SwapError::ScriptParse { .. })
        ));
        assert!(matches!(
            Htlc::from_opcode("OP_IF OP_ELSE OP_ENDIF", Network::Testnet),
            Err(SwapError::ScriptParse { .. })
        ));
        // truncated bytecode
        assert!(Htlc::from_bytecode(&BYTECODE[..BYTECODE.len() - 2], Network::Testnet).is_err());
    }

    #[test]
    fn test_contract_balance_and_utxos() {
        let htlc = test_htlc();
        let provider = InMemoryProvider::new(Network::Testnet);
        let txid = Txid::from_str("5f5ae6f4c7e1e2a0d1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718").unwrap();
        provider.add_utxo(
            &htlc.address(),
            Utxo {
                txid,
                vout: 0,
                value: 10_000,
                script_pubkey: htlc.script_pubkey(),
            },
        );

        assert_eq!(htlc.balance(&provider).unwrap(), 10_000);
        assert_eq!(htlc.utxos(&provider, None).unwrap().len(), 1);
    }
}
