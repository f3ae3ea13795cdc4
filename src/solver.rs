//! # Solvers
//!
//! A solver is the key material needed to satisfy exactly one spending
//! branch. It produces the scriptSig for an input given the legacy sighash;
//! the transaction builder owns everything else.
//!
//! | Solver | Spends | scriptSig |
//! |---|---|---|
//! | `NormalSolver` / `FundSolver` | P2PKH | `<sig> <pubkey>` |
//! | `ClaimSolver` | HTLC hashlock branch | `<sig> <pubkey> <secret> OP_1 <redeem>` |
//! | `RefundSolver` | HTLC timelock branch | `<sig> <pubkey> OP_0 <redeem>` |

use crate::error::{SwapError, SwapResult};
use crate::htlc::HtlcTerms;
use crate::transaction::TxKind;
use crate::utils::crypto;
use bitcoin::{
    ecdsa,
    hashes::Hash,
    opcodes::all::{OP_PUSHBYTES_0, OP_PUSHNUM_1},
    script::{Builder, PushBytesBuf},
    secp256k1::{Message, Secp256k1},
    sighash::{EcdsaSighashType, LegacySighash},
    PrivateKey, PublicKey, Script, ScriptBuf, Sequence,
};

/// Source of private keys, standing in for hierarchical-deterministic derivation
pub trait KeySource {
    /// Private key at a derivation path
    fn private_key(&self, path: &str) -> SwapResult<PrivateKey>;
}

/// Wrap bytes as a script push
fn push_bytes(data: Vec<u8>) -> SwapResult<PushBytesBuf> {
    PushBytesBuf::try_from(data).map_err(|e| SwapError::transaction(format!("push too large: {}", e)))
}

/// Signing key shared by every solver
#[derive(Debug, Clone)]
struct Signer {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl Signer {
    fn new(private_key: PrivateKey) -> Self {
        let secp = Secp256k1::signing_only();
        Self {
            public_key: private_key.public_key(&secp),
            private_key,
        }
    }

    /// Deterministic (RFC6979) SIGHASH_ALL signature with the sighash flag appended
    fn sign(&self, sighash: LegacySighash) -> SwapResult<PushBytesBuf> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(sighash.to_byte_array());
        let signature = ecdsa::Signature {
            signature: secp.sign_ecdsa(&message, &self.private_key.inner),
            sighash_type: EcdsaSighashType::All,
        };
        push_bytes(signature.serialize().to_vec())
    }

    /// `<sig> <pubkey>`
    fn pay_to_pubkey_hash(&self, sighash: LegacySighash) -> SwapResult<Builder> {
        Ok(Builder::new()
            .push_slice(self.sign(sighash)?)
            .push_key(&self.public_key))
    }

    fn check_controls(&self, script_pubkey: &Script) -> SwapResult<()> {
        if script_pubkey != ScriptBuf::new_p2pkh(&self.public_key.pubkey_hash()).as_script() {
            return Err(SwapError::transaction(
                "solver key does not control the spent output",
            ));
        }
        Ok(())
    }
}

/// Signs ordinary P2PKH transfers
#[derive(Debug, Clone)]
pub struct NormalSolver {
    signer: Signer,
}

impl NormalSolver {
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            signer: Signer::new(private_key),
        }
    }

    pub fn from_key_source<K: KeySource + ?Sized>(source: &K, path: &str) -> SwapResult<Self> {
        Ok(Self::new(source.private_key(path)?))
    }

    pub fn solve(&self, sighash: LegacySighash) -> SwapResult<ScriptBuf> {
        Ok(self.signer.pay_to_pubkey_hash(sighash)?.into_script())
    }
}

/// Signs the P2PKH inputs that fund a contract address
#[derive(Debug, Clone)]
pub struct FundSolver {
    signer: Signer,
}

impl FundSolver {
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            signer: Signer::new(private_key),
        }
    }

    pub fn from_key_source<K: KeySource + ?Sized>(source: &K, path: &str) -> SwapResult<Self> {
        Ok(Self::new(source.private_key(path)?))
    }

    pub fn solve(&self, sighash: LegacySighash) -> SwapResult<ScriptBuf> {
        Ok(self.signer.pay_to_pubkey_hash(sighash)?.into_script())
    }
}

/// Parse solver bytecode into HTLC terms and its redeem script
fn parse_contract(bytecode: &str) -> SwapResult<(HtlcTerms, ScriptBuf)> {
    let bytes = hex::decode(bytecode.trim())
        .map_err(|e| SwapError::bytecode(format!("bytecode is not hex: {}", e)))?;
    let (terms, script) = HtlcTerms::from_bytecode(&bytes).map_err(|e| SwapError::bytecode(e.to_string()))?;
    Ok((terms, script.compile()))
}

/// Spends the hashlock branch by revealing the secret
#[derive(Debug, Clone)]
pub struct ClaimSolver {
    signer: Signer,
    secret: Vec<u8>,
    terms: HtlcTerms,
    redeem_script: ScriptBuf,
}

/// The counterparty's claim is the same spend
pub type WithdrawSolver = ClaimSolver;

impl ClaimSolver {
    /// `secret` is the preimage itself; `bytecode` is the HTLC redeem script in hex
    pub fn new(private_key: PrivateKey, secret: &[u8], bytecode: &str) -> SwapResult<Self> {
        let (terms, redeem_script) = parse_contract(bytecode)?;
        if crypto::hash256(secret) != terms.hashlock {
            return Err(SwapError::InvalidSecret);
        }
        Ok(Self {
            signer: Signer::new(private_key),
            secret: secret.to_vec(),
            terms,
            redeem_script,
        })
    }

    pub fn from_key_source<K: KeySource + ?Sized>(
        source: &K,
        path: &str,
        secret: &[u8],
        bytecode: &str,
    ) -> SwapResult<Self> {
        Self::new(source.private_key(path)?, secret, bytecode)
    }

    /// `<sig> <pubkey> <secret> OP_1`
    pub fn solve(&self, sighash: LegacySighash) -> SwapResult<ScriptBuf> {
        Ok(self
            .signer
            .pay_to_pubkey_hash(sighash)?
            .push_slice(push_bytes(self.secret.clone())?)
            .push_opcode(OP_PUSHNUM_1)
            .into_script())
    }

    /// Redeem script revealed alongside the solution
    pub fn witness(&self) -> &ScriptBuf {
        &self.redeem_script
    }

    pub fn terms(&self) -> &HtlcTerms {
        &self.terms
    }
}

/// Spends the relative timelock branch after expiry
#[derive(Debug, Clone)]
pub struct RefundSolver {
    signer: Signer,
    sequence: u32,
    terms: HtlcTerms,
    redeem_script: ScriptBuf,
}

impl RefundSolver {
    /// `sequence` must equal the timelock in `bytecode`
    pub fn new(private_key: PrivateKey, bytecode: &str, sequence: u32) -> SwapResult<Self> {
        let (terms, redeem_script) = parse_contract(bytecode)?;
        if terms.sequence != sequence {
            return Err(SwapError::bytecode(format!(
                "script timelock is {} but solver sequence is {}",
                terms.sequence, sequence
            )));
        }
        Ok(Self {
            signer: Signer::new(private_key),
            sequence,
            terms,
            redeem_script,
        })
    }

    pub fn from_key_source<K: KeySource + ?Sized>(
        source: &K,
        path: &str,
        bytecode: &str,
        sequence: u32,
    ) -> SwapResult<Self> {
        Self::new(source.private_key(path)?, bytecode, sequence)
    }

    /// `<sig> <pubkey> OP_0`
    pub fn solve(&self, sighash: LegacySighash) -> SwapResult<ScriptBuf> {
        Ok(self
            .signer
            .pay_to_pubkey_hash(sighash)?
            .push_opcode(OP_PUSHBYTES_0)
            .into_script())
    }

    /// Redeem script revealed alongside the solution
    pub fn witness(&self) -> &ScriptBuf {
        &self.redeem_script
    }

    /// Input sequence that satisfies `OP_CHECKSEQUENCEVERIFY`
    pub fn sequence(&self) -> Sequence {
        Sequence(self.sequence)
    }

    pub fn terms(&self) -> &HtlcTerms {
        &self.terms
    }
}

/// Any solver, dispatched on transaction kind
#[derive(Debug, Clone)]
pub enum Solver {
    Normal(NormalSolver),
    Fund(FundSolver),
    Claim(ClaimSolver),
    Refund(RefundSolver),
}

impl Solver {
    /// Transaction kind this solver signs
    pub fn kind(&self) -> TxKind {
        match self {
            Solver::Normal(_) => TxKind::Normal,
            Solver::Fund(_) => TxKind::Fund,
            Solver::Claim(_) => TxKind::Claim,
            Solver::Refund(_) => TxKind::Refund,
        }
    }

    /// Fail unless this solver signs `kind` transactions
    pub fn expect_kind(&self, kind: TxKind) -> SwapResult<()> {
        if self.kind() != kind {
            return Err(SwapError::SolverTypeMismatch {
                expected: format!("{} solver", kind),
                found: format!("{} solver", self.kind()),
            });
        }
        Ok(())
    }

    fn signer(&self) -> &Signer {
        match self {
            Solver::Normal(solver) => &solver.signer,
            Solver::Fund(solver) => &solver.signer,
            Solver::Claim(solver) => &solver.signer,
            Solver::Refund(solver) => &solver.signer,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer().public_key
    }

    /// Redeem script for P2SH spends
    pub fn witness(&self) -> Option<&ScriptBuf> {
        match self {
            Solver::Normal(_) | Solver::Fund(_) => None,
            Solver::Claim(solver) => Some(solver.witness()),
            Solver::Refund(solver) => Some(solver.witness()),
        }
    }

    /// Sequence the solver requires on every input it signs
    pub fn sequence(&self) -> Option<Sequence> {
        match self {
            Solver::Refund(solver) => Some(solver.sequence()),
            _ => None,
        }
    }

    /// Script committed to by the sighash: the redeem script or the spent output script
    pub fn script_code(&self, script_pubkey: &Script) -> ScriptBuf {
        match self.witness() {
            Some(redeem_script) => redeem_script.clone(),
            None => script_pubkey.to_owned(),
        }
    }

    /// Check that this solver can satisfy an output locked under `script_pubkey`
    pub fn check_spendable(&self, script_pubkey: &Script) -> SwapResult<()> {
        let (terms, redeem_script) = match self {
            Solver::Normal(_) | Solver::Fund(_) => return self.signer().check_controls(script_pubkey),
            Solver::Claim(solver) => (&solver.terms, &solver.redeem_script),
            Solver::Refund(solver) => (&solver.terms, &solver.redeem_script),
        };

        if script_pubkey != ScriptBuf::new_p2sh(&redeem_script.script_hash()).as_script() {
            return Err(SwapError::bytecode(
                "redeem script does not hash to the spent contract output",
            ));
        }
        let party = match self {
            Solver::Refund(_) => terms.sender,
            _ => terms.recipient,
        };
        if party != self.public_key().pubkey_hash() {
            return Err(SwapError::transaction(format!(
                "solver key is not the {} party of the contract",
                if matches!(self, Solver::Refund(_)) { "sender" } else { "recipient" }
            )));
        }
        Ok(())
    }

    /// Full scriptSig for one input
    pub fn unlocking_script(&self, sighash: LegacySighash) -> SwapResult<ScriptBuf> {
        let mut script_sig = match self {
            Solver::Normal(solver) => solver.solve(sighash)?,
            Solver::Fund(solver) => solver.solve(sighash)?,
            Solver::Claim(solver) => solver.solve(sighash)?,
            Solver::Refund(solver) => solver.solve(sighash)?,
        };
        if let Some(redeem_script) = self.witness() {
            script_sig.push_slice(push_bytes(redeem_script.to_bytes())?);
        }
        Ok(script_sig)
    }
}

impl From<NormalSolver> for Solver {
    fn from(solver: NormalSolver) -> Self {
        Solver::Normal(solver)
    }
}

impl From<FundSolver> for Solver {
    fn from(solver: FundSolver) -> Self {
        Solver::Fund(solver)
    }
}

impl From<ClaimSolver> for Solver {
    fn from(solver: ClaimSolver) -> Self {
        Solver::Claim(solver)
    }
}

impl From<RefundSolver> for Solver {
    fn from(solver: RefundSolver) -> Self {
        Solver::Refund(solver)
    }
}
