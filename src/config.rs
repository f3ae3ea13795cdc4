//! # Configuration Constants
//!
//! Constants used throughout the swap engine. Nothing here is global mutable
//! state: the network is always passed explicitly, and fee constants only
//! seed [`crate::utxo::FeeModel::default`].

/// Fee model constants (smallest native unit, satoshis).
///
/// Calibrated to the byte size of a legacy P2PKH input and output. The first
/// input carries the fixed transaction overhead, so a one-input/one-output
/// transaction costs exactly [`BASE_INPUT_COST`].
pub mod fee {
    /// Cost of a transaction with one input and one output.
    pub const BASE_INPUT_COST: u64 = 576;

    /// Added cost of every input beyond the first.
    pub const MARGINAL_INPUT_COST: u64 = 444;

    /// Added cost of every output beyond the first.
    pub const MARGINAL_OUTPUT_COST: u64 = 102;
}

/// Network and RPC configuration
pub mod network {
    /// Default Bitcoin Core RPC host
    pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

    /// Default RPC username
    pub const DEFAULT_RPC_USER: &str = "user";

    /// Default RPC password
    pub const DEFAULT_RPC_PASSWORD: &str = "password";

    /// Default RPC port for mainnet
    pub const MAINNET_RPC_PORT: &str = "8332";

    /// Default RPC port for testnet
    pub const TESTNET_RPC_PORT: &str = "18332";

    /// Default RPC port for signet
    pub const SIGNET_RPC_PORT: &str = "38332";

    /// Default RPC port for regtest
    pub const REGTEST_RPC_PORT: &str = "18443";

    /// Maximum number of unspent outputs requested per address
    pub const DEFAULT_UTXO_LIMIT: usize = 15;
}

/// HTLC defaults
pub mod htlc {
    /// Default relative timeout, in blocks, for the refund branch.
    pub const DEFAULT_SEQUENCE: u32 = 1000;

    /// Secret hash length in bytes (sha256).
    pub const SECRET_HASH_LENGTH: usize = 32;
}

/// Transaction-raw envelope settings
pub mod envelope {
    /// Chain tag prefixed to every envelope `type` field.
    pub const CHAIN: &str = "bitcoin";
}

/// Environment variable names
pub mod env {
    /// RPC host override
    pub const RPC_URL: &str = "RPC_URL";

    /// RPC port override
    pub const RPC_PORT: &str = "RPC_PORT";

    /// RPC username override
    pub const RPC_USER: &str = "RPC_USER";

    /// RPC password override
    pub const RPC_PASSWORD: &str = "RPC_PASSWORD";
}
