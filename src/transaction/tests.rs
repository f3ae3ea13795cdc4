//! End-to-end tests for building, signing and submitting swap transactions.

use super::*;
use crate::config::htlc::DEFAULT_SEQUENCE;
use crate::htlc::{build_htlc, Htlc};
use crate::services::{submit_transaction_raw, InMemoryProvider};
use crate::signature::{decode_transaction_raw, sign_transaction_raw};
use crate::solver::{ClaimSolver, FundSolver, NormalSolver, RefundSolver};
use crate::utils::crypto;
use bitcoin::{
    hashes::Hash,
    script::Instruction,
    secp256k1::{Message, Secp256k1},
    PrivateKey, Txid,
};

const SECRET: &[u8] = b"Hello Meheret!";

struct Fixture {
    provider: InMemoryProvider,
    config: BuildConfig,
    sender_key: PrivateKey,
    recipient_key: PrivateKey,
    sender: Address,
    recipient: Address,
    htlc: Htlc,
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn key(byte: u8) -> PrivateKey {
    PrivateKey::from_slice(&[byte; 32], Network::Testnet).unwrap()
}

fn address_of(private_key: &PrivateKey) -> Address {
    let public_key = private_key.public_key(&Secp256k1::new());
    Address::p2pkh(public_key.pubkey_hash(), Network::Testnet)
}

fn wallet_utxo(owner: &Address, index: u8, value: u64) -> Utxo {
    Utxo {
        txid: Txid::from_byte_array([index; 32]),
        vout: 0,
        value,
        script_pubkey: owner.script_pubkey(),
    }
}

fn fixture() -> Fixture {
    init_logger();
    let sender_key = key(0x11);
    let recipient_key = key(0x22);
    let sender = address_of(&sender_key);
    let recipient = address_of(&recipient_key);
    let htlc = build_htlc(
        &crypto::secret_hash(SECRET),
        &recipient.to_string(),
        &sender.to_string(),
        DEFAULT_SEQUENCE,
        Network::Testnet,
    )
    .unwrap();

    let provider = InMemoryProvider::new(Network::Testnet);
    provider.add_utxo(&sender, wallet_utxo(&sender, 1, 100_000));

    Fixture {
        provider,
        config: BuildConfig::new(Network::Testnet),
        sender_key,
        recipient_key,
        sender,
        recipient,
        htlc,
    }
}

/// Record a funding transaction whose second output pays `value` into the contract
fn add_funding(fixture: &Fixture, value: u64) -> String {
    let funding = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([7; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![
            TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey: fixture.sender.script_pubkey(),
            },
            TxOut {
                value: Amount::from_sat(value),
                script_pubkey: fixture.htlc.script_pubkey(),
            },
        ],
    };
    fixture.provider.add_transaction(&funding).to_string()
}

/// Sign directly and through the encoded envelope, returning both signed envelopes
fn sign_both_ways<T: SpendableTransaction + Clone>(
    unsigned: &T,
    solver: &Solver,
) -> (TransactionRaw, TransactionRaw) {
    let direct = unsigned.clone().sign(solver).unwrap().envelope();
    let unsigned_raw = unsigned.transaction_raw().unwrap();
    let via_raw = sign_transaction_raw(&unsigned_raw, solver).unwrap();
    (direct, TransactionRaw::decode(&via_raw).unwrap())
}

#[test]
fn test_normal_signing_equivalence() {
    let fixture = fixture();
    let recipient = fixture.recipient.to_string();
    let unsigned = NormalTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &[(recipient.as_str(), SendAmount::Exact(20_000))],
    )
    .unwrap();

    // payout plus change
    assert_eq!(unsigned.fee(), 678);
    assert_eq!(unsigned.transaction().output.len(), 2);
    assert_eq!(unsigned.transaction().output[1].value.to_sat(), 100_000 - 20_000 - 678);

    let solver = Solver::from(NormalSolver::new(fixture.sender_key));
    let (direct, via_envelope) = sign_both_ways(&unsigned, &solver);
    assert_eq!(direct.raw, via_envelope.raw);
    assert_eq!(direct, via_envelope);
    assert_eq!(direct.raw_type.to_string(), "bitcoin_normal_signed");
}

#[test]
fn test_fund_signing_equivalence() {
    let fixture = fixture();
    let unsigned = FundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &fixture.htlc.address().to_string(),
        SendAmount::Exact(10_000),
    )
    .unwrap();

    let outputs = &unsigned.transaction().output;
    assert_eq!(outputs[0].script_pubkey, fixture.htlc.script_pubkey());
    assert_eq!(outputs[0].value.to_sat(), 10_000);
    assert_eq!(
        unsigned.envelope().extra.get("htlc_address"),
        Some(&fixture.htlc.address().to_string())
    );

    let solver = Solver::from(FundSolver::new(fixture.sender_key));
    let (direct, via_envelope) = sign_both_ways(&unsigned, &solver);
    assert_eq!(direct.raw, via_envelope.raw);
    assert_eq!(direct.raw_type.to_string(), "bitcoin_fund_signed");
}

#[test]
fn test_claim_signing_equivalence_and_fee() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);

    let unsigned = ClaimTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Max,
    )
    .unwrap();

    assert_eq!(unsigned.fee(), 576);
    let tx = unsigned.transaction();
    assert_eq!(tx.input[0].previous_output.vout, 1);
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].value.to_sat(), 10_000_000 - 576);
    assert_eq!(
        unsigned.envelope().raw_type.to_string(),
        "bitcoin_claim_unsigned"
    );

    let solver = Solver::from(
        ClaimSolver::new(fixture.recipient_key, SECRET, &fixture.htlc.bytecode()).unwrap(),
    );
    let (direct, via_envelope) = sign_both_ways(&unsigned, &solver);
    assert_eq!(direct.raw, via_envelope.raw);
    assert_eq!(direct.fee, 576);
}

#[test]
fn test_claim_signature_verifies() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);
    let solver = Solver::from(
        ClaimSolver::new(fixture.recipient_key, SECRET, &fixture.htlc.bytecode()).unwrap(),
    );

    let signed = ClaimTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Max,
    )
    .unwrap()
    .sign(&solver)
    .unwrap();

    let tx = signed.transaction();
    let items: Vec<_> = tx.input[0]
        .script_sig
        .instructions()
        .collect::<Result<_, _>>()
        .unwrap();
    let Instruction::PushBytes(signature) = items[0] else {
        panic!("scriptSig must start with a signature push");
    };
    let signature = bitcoin::ecdsa::Signature::from_slice(signature.as_bytes()).unwrap();

    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(0, &fixture.htlc.redeem_script(), EcdsaSighashType::All.to_u32())
        .unwrap();
    let message = Message::from_digest(sighash.to_byte_array());
    let public_key = fixture.recipient_key.public_key(&Secp256k1::new());
    assert!(Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature.signature, &public_key.inner)
        .is_ok());
}

#[test]
fn test_claim_exact_amount_keeps_change_in_contract() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);

    let unsigned = ClaimTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Exact(5_000_000),
    )
    .unwrap();

    assert_eq!(unsigned.fee(), 678);
    let outputs = &unsigned.transaction().output;
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].value.to_sat(), 5_000_000);
    assert_eq!(outputs[1].value.to_sat(), 10_000_000 - 5_000_000 - 678);
    assert_eq!(outputs[1].script_pubkey, fixture.htlc.script_pubkey());
}

#[test]
fn test_refund_signing_equivalence_and_sequence() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);

    let unsigned = RefundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.sender.to_string(),
        SendAmount::Max,
    )
    .unwrap();
    assert_eq!(unsigned.transaction().input[0].sequence, Sequence::MAX);

    let solver = Solver::from(
        RefundSolver::new(fixture.sender_key, &fixture.htlc.bytecode(), DEFAULT_SEQUENCE).unwrap(),
    );
    let (direct, via_envelope) = sign_both_ways(&unsigned, &solver);
    assert_eq!(direct.raw, via_envelope.raw);

    let signed = direct.transaction().unwrap();
    assert_eq!(signed.version, Version::TWO);
    assert_eq!(signed.input[0].sequence, Sequence(DEFAULT_SEQUENCE));
}

#[test]
fn test_withdraw_is_a_claim() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);

    let withdraw = WithdrawTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Max,
    )
    .unwrap();
    assert_eq!(withdraw.envelope().raw_type.kind, TxKind::Claim);
}

#[test]
fn test_solver_kind_gating() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);
    let unsigned = RefundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.sender.to_string(),
        SendAmount::Max,
    )
    .unwrap();
    let claim_solver = Solver::from(
        ClaimSolver::new(fixture.recipient_key, SECRET, &fixture.htlc.bytecode()).unwrap(),
    );

    let unsigned_raw = unsigned.transaction_raw().unwrap();
    assert!(matches!(
        sign_transaction_raw(&unsigned_raw, &claim_solver),
        Err(SwapError::SolverTypeMismatch { .. })
    ));
    assert!(matches!(
        unsigned.sign(&claim_solver),
        Err(SwapError::SolverTypeMismatch { .. })
    ));

    // a refund envelope cannot be resumed as a claim
    assert!(matches!(
        ClaimTransaction::from_transaction_raw(&unsigned_raw),
        Err(SwapError::SolverTypeMismatch { .. })
    ));
}

#[test]
fn test_signing_rejects_foreign_keys_and_contracts() {
    let fixture = fixture();
    let unsigned = NormalTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &[(fixture.recipient.to_string().as_str(), SendAmount::Exact(20_000))],
    )
    .unwrap();
    let wrong_key = Solver::from(NormalSolver::new(fixture.recipient_key));
    assert!(matches!(
        unsigned.sign(&wrong_key),
        Err(SwapError::Transaction { .. })
    ));

    // claim with a contract that differs only in its timeout
    let funding_txid = add_funding(&fixture, 10_000_000);
    let other = build_htlc(
        &crypto::secret_hash(SECRET),
        &fixture.recipient.to_string(),
        &fixture.sender.to_string(),
        144,
        Network::Testnet,
    )
    .unwrap();
    let claim = ClaimTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Max,
    )
    .unwrap();
    let solver = Solver::from(ClaimSolver::new(fixture.recipient_key, SECRET, &other.bytecode()).unwrap());
    assert!(matches!(
        claim.sign(&solver),
        Err(SwapError::InvalidBytecode { .. })
    ));
}

#[test]
fn test_signed_transaction_cannot_be_signed_again() {
    let fixture = fixture();
    let solver = Solver::from(FundSolver::new(fixture.sender_key));
    let signed = FundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &fixture.htlc.address().to_string(),
        SendAmount::Exact(10_000),
    )
    .unwrap()
    .sign(&solver)
    .unwrap();
    assert_eq!(signed.state(), TxState::Signed);

    let signed_raw = signed.transaction_raw().unwrap();
    assert!(matches!(
        signed.sign(&solver),
        Err(SwapError::Transaction { .. })
    ));
    assert!(matches!(
        sign_transaction_raw(&signed_raw, &solver),
        Err(SwapError::Transaction { .. })
    ));
}

#[test]
fn test_insufficient_balance() {
    let fixture = fixture();
    let result = FundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &fixture.htlc.address().to_string(),
        SendAmount::Exact(1_000_000),
    );
    match result {
        Err(SwapError::Balance {
            required,
            available,
        }) => {
            assert_eq!(required, 1_000_678);
            assert_eq!(available, 100_000);
        }
        other => panic!("expected balance error, got {:?}", other),
    }

    let funding_txid = add_funding(&fixture, 1_000);
    assert!(matches!(
        ClaimTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &funding_txid,
            &fixture.recipient.to_string(),
            SendAmount::Exact(1_000),
        ),
        Err(SwapError::Balance { .. })
    ));
}

#[test]
fn test_max_amount_sweeps_sender() {
    let fixture = fixture();
    fixture
        .provider
        .add_utxo(&fixture.sender, wallet_utxo(&fixture.sender, 2, 50_000));

    let unsigned = NormalTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &[(fixture.recipient.to_string().as_str(), SendAmount::Max)],
    )
    .unwrap();

    assert_eq!(unsigned.fee(), 1_020);
    let tx = unsigned.transaction();
    assert_eq!(tx.input.len(), 2);
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].value.to_sat(), 150_000 - 1_020);
}

#[test]
fn test_build_input_validation() {
    let fixture = fixture();
    let recipient = fixture.recipient.to_string();

    // fund destination must be a contract address
    assert!(matches!(
        FundTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &recipient,
            SendAmount::Exact(10_000),
        ),
        Err(SwapError::InvalidAddress { .. })
    ));

    // mainnet recipient on a testnet build
    assert!(matches!(
        NormalTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &[("1KiZ4RbXeYGyqQbKT6T5mSLW8LSKPBUXw6", SendAmount::Exact(10_000))],
        ),
        Err(SwapError::InvalidAddress { .. })
    ));

    assert!(matches!(
        NormalTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &[(recipient.as_str(), SendAmount::Max), (recipient.as_str(), SendAmount::Exact(1_000))],
        ),
        Err(SwapError::Transaction { .. })
    ));
}

#[test]
fn test_funding_without_contract_output() {
    let fixture = fixture();
    let funding = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![],
        output: vec![TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: fixture.sender.script_pubkey(),
        }],
    };
    let funding_txid = fixture.provider.add_transaction(&funding).to_string();

    assert!(matches!(
        ClaimTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &funding_txid,
            &fixture.recipient.to_string(),
            SendAmount::Max,
        ),
        Err(SwapError::NoContractUtxo { .. })
    ));
}

#[test]
fn test_custom_fee_model() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000_000);
    let config = fixture.config.with_fee_model(FeeModel {
        base_input_cost: 1_000,
        marginal_input_cost: 500,
        marginal_output_cost: 200,
    });

    let unsigned = RefundTransaction::build_transaction(
        &fixture.provider,
        &config,
        &funding_txid,
        &fixture.sender.to_string(),
        SendAmount::Max,
    )
    .unwrap();
    assert_eq!(unsigned.fee(), 1_000);
}

#[test]
fn test_submit_transaction_raw() {
    let fixture = fixture();
    let unsigned = FundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &fixture.htlc.address().to_string(),
        SendAmount::Exact(10_000),
    )
    .unwrap();

    let unsigned_raw = unsigned.transaction_raw().unwrap();
    assert!(matches!(
        submit_transaction_raw(&fixture.provider, &unsigned_raw),
        Err(SwapError::InvalidEnvelope { .. })
    ));

    let solver = Solver::from(FundSolver::new(fixture.sender_key));
    let signed_raw = sign_transaction_raw(&unsigned_raw, &solver).unwrap();
    let decoded = decode_transaction_raw(&signed_raw).unwrap();

    let txid = submit_transaction_raw(&fixture.provider, &signed_raw).unwrap();
    assert_eq!(txid, decoded.txid);
    assert_eq!(fixture.provider.submitted(), vec![decoded.transaction]);

    fixture.provider.set_offline(true);
    let err = submit_transaction_raw(&fixture.provider, &signed_raw).unwrap_err();
    assert!(err.is_retryable());
}

#[test]
fn test_fund_without_change_output() {
    let fixture = fixture();
    let unsigned = FundTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &fixture.htlc.address().to_string(),
        SendAmount::Exact(100_000 - 678),
    )
    .unwrap();

    // change would be zero, so no change output
    assert_eq!(unsigned.fee(), 678);
    let outputs = &unsigned.transaction().output;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].value.to_sat(), 100_000 - 678);

    let spent = unsigned.core().previous_outputs();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].value, 100_000);
    assert_eq!(spent[0].tx_output_n, 0);
    assert_eq!(spent[0].script, hex::encode(fixture.sender.script_pubkey().as_bytes()));
    assert_eq!(
        unsigned.core().extra().get("htlc_address"),
        Some(&fixture.htlc.address().to_string())
    );
}

#[test]
fn test_claim_small_leftover_goes_to_fee() {
    let fixture = fixture();
    let funding_txid = add_funding(&fixture, 10_000);

    let unsigned = ClaimTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &funding_txid,
        &fixture.recipient.to_string(),
        SendAmount::Exact(10_000 - 600),
    )
    .unwrap();

    // 600 left cannot pay the 678 two-output fee
    assert_eq!(unsigned.fee(), 600);
    let outputs = &unsigned.transaction().output;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].value.to_sat(), 9_400);
    assert_eq!(outputs[0].script_pubkey, fixture.recipient.script_pubkey());

    let spent = unsigned.core().previous_outputs();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].value, 10_000);
    assert_eq!(spent[0].tx_output_n, 1);
    assert_eq!(
        unsigned.core().extra().get("address"),
        Some(&fixture.recipient.to_string())
    );
}

#[test]
fn test_amounts_beyond_money_supply() {
    let fixture = fixture();
    let recipient = fixture.recipient.to_string();
    let max_money = Amount::MAX_MONEY.to_sat();

    assert!(matches!(
        FundTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &fixture.htlc.address().to_string(),
            SendAmount::Exact(u64::MAX),
        ),
        Err(SwapError::Transaction { .. })
    ));

    // each payout fits, their sum does not
    assert!(matches!(
        NormalTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &[
                (recipient.as_str(), SendAmount::Exact(max_money)),
                (recipient.as_str(), SendAmount::Exact(max_money)),
            ],
        ),
        Err(SwapError::Transaction { .. })
    ));

    assert!(matches!(
        NormalTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &fixture.sender.to_string(),
            &[(recipient.as_str(), SendAmount::Exact(max_money))],
        ),
        Err(SwapError::Balance { .. })
    ));

    let funding_txid = add_funding(&fixture, 10_000);
    assert!(matches!(
        ClaimTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &funding_txid,
            &recipient,
            SendAmount::Exact(u64::MAX - 100),
        ),
        Err(SwapError::Transaction { .. })
    ));
    assert!(matches!(
        RefundTransaction::build_transaction(
            &fixture.provider,
            &fixture.config,
            &funding_txid,
            &fixture.sender.to_string(),
            SendAmount::Exact(max_money),
        ),
        Err(SwapError::Balance { .. })
    ));
}

#[test]
fn test_utxo_limit_bounds_selection() {
    let fixture = fixture();
    fixture
        .provider
        .add_utxo(&fixture.sender, wallet_utxo(&fixture.sender, 2, 50_000));
    let recipient = fixture.recipient.to_string();
    let payouts = [(recipient.as_str(), SendAmount::Exact(120_000))];

    let unsigned = NormalTransaction::build_transaction(
        &fixture.provider,
        &fixture.config,
        &fixture.sender.to_string(),
        &payouts,
    )
    .unwrap();
    assert_eq!(unsigned.transaction().input.len(), 2);
    assert_eq!(unsigned.core().previous_outputs().len(), 2);

    let limited = fixture.config.with_utxo_limit(1);
    match NormalTransaction::build_transaction(
        &fixture.provider,
        &limited,
        &fixture.sender.to_string(),
        &payouts,
    ) {
        Err(SwapError::Balance {
            required,
            available,
        }) => {
            assert_eq!(required, 120_678);
            assert_eq!(available, 100_000);
        }
        other => panic!("expected balance error, got {:?}", other),
    }
}
