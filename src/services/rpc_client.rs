use crate::config::{env as config_env, network as network_config};
use crate::error::{SwapError, SwapResult};
use crate::services::provider::{ChainProvider, TransactionDetail};
use crate::utils;
use crate::utxo::Utxo;
use bitcoin::{Address, Amount, Network, ScriptBuf, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use serde_json::Value;
use std::{env, str::FromStr};

/// Bitcoin Core RPC collaborator
#[derive(Debug)]
pub struct BitcoinRpcProvider {
    client: Client,
    network: Network,
}

impl BitcoinRpcProvider {
    /// Create a client against an explicit endpoint
    pub fn new(url: &str, auth: Auth, network: Network) -> SwapResult<Self> {
        let client = Client::new(url, auth)?;
        Ok(Self { client, network })
    }

    /// Create a client with configuration from environment or defaults
    pub fn from_env(network: Network) -> SwapResult<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        let rpc_url = env::var(config_env::RPC_URL)
            .unwrap_or_else(|_| network_config::DEFAULT_RPC_HOST.to_string());
        let rpc_port = env::var(config_env::RPC_PORT)
            .unwrap_or_else(|_| default_port(network).to_string());
        let rpc_user = env::var(config_env::RPC_USER)
            .unwrap_or_else(|_| network_config::DEFAULT_RPC_USER.to_string());
        let rpc_password = env::var(config_env::RPC_PASSWORD)
            .unwrap_or_else(|_| network_config::DEFAULT_RPC_PASSWORD.to_string());

        let auth = Auth::UserPass(rpc_user, rpc_password);
        let url = format!("http://{}:{}", rpc_url, rpc_port);
        log::info!("Connecting to {} RPC at {}", utils::network::name(network), url);

        Self::new(&url, auth, network)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn ensure_network(&self, network: Network) -> SwapResult<()> {
        if network != self.network {
            return Err(SwapError::rpc(format!(
                "client serves {}, requested {}",
                utils::network::name(self.network),
                utils::network::name(network)
            )));
        }
        Ok(())
    }

    /// Scan the UTXO set for outputs paying an address
    fn scan_utxos_for_address(&self, address: &Address) -> SwapResult<Vec<Value>> {
        let scanobject = format!("addr({})", address);
        let result: Value = self
            .client
            .call(
                "scantxoutset",
                &[
                    Value::String("start".to_string()),
                    Value::Array(vec![Value::String(scanobject)]),
                ],
            )
            .map_err(|e| {
                log::warn!("scantxoutset failed for {}: {}", address, e);
                SwapError::from(e)
            })?;

        if let Some(unspents) = result["unspents"].as_array() {
            Ok(unspents.clone())
        } else {
            Ok(vec![])
        }
    }
}

fn default_port(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => network_config::MAINNET_RPC_PORT,
        Network::Signet => network_config::SIGNET_RPC_PORT,
        Network::Regtest => network_config::REGTEST_RPC_PORT,
        _ => network_config::TESTNET_RPC_PORT,
    }
}

/// Convert one `scantxoutset` entry
fn parse_unspent(entry: &Value) -> SwapResult<Utxo> {
    let field = |name: &str| SwapError::rpc(format!("scantxoutset entry missing {}", name));

    let txid = entry["txid"]
        .as_str()
        .ok_or_else(|| field("txid"))
        .and_then(|txid| Txid::from_str(txid).map_err(|e| SwapError::rpc(e.to_string())))?;
    let vout = entry["vout"]
        .as_u64()
        .ok_or_else(|| field("vout"))
        .and_then(|vout| {
            u32::try_from(vout).map_err(|_| SwapError::rpc(format!("vout {} out of range", vout)))
        })?;
    let value = entry["amount"]
        .as_f64()
        .ok_or_else(|| field("amount"))
        .and_then(|btc| Amount::from_btc(btc).map_err(|e| SwapError::rpc(e.to_string())))?;
    let script_pubkey = entry["scriptPubKey"]
        .as_str()
        .ok_or_else(|| field("scriptPubKey"))
        .and_then(|script| Ok(ScriptBuf::from_bytes(hex::decode(script)?)))?;

    Ok(Utxo {
        txid,
        vout,
        value: value.to_sat(),
        script_pubkey,
    })
}

impl ChainProvider for BitcoinRpcProvider {
    fn get_balance(&self, address: &Address, network: Network) -> SwapResult<u64> {
        self.ensure_network(network)?;
        let unspents = self.scan_utxos_for_address(address)?;
        unspents
            .iter()
            .map(|entry| parse_unspent(entry).map(|utxo| utxo.value))
            .sum()
    }

    fn get_utxos(&self, address: &Address, network: Network, limit: usize) -> SwapResult<Vec<Utxo>> {
        self.ensure_network(network)?;
        self.scan_utxos_for_address(address)?
            .iter()
            .take(limit)
            .map(parse_unspent)
            .collect()
    }

    fn get_transaction(&self, txid: &Txid, network: Network) -> SwapResult<TransactionDetail> {
        self.ensure_network(network)?;
        let tx = self.client.get_raw_transaction(txid, None)?;
        Ok(TransactionDetail::from_transaction(&tx))
    }

    fn submit_raw(&self, raw_hex: &str, network: Network) -> SwapResult<Txid> {
        self.ensure_network(network)?;
        let txid = self.client.send_raw_transaction(raw_hex).map_err(|e| {
            log::warn!("sendrawtransaction rejected: {}", e);
            SwapError::from(e)
        })?;
        log::info!("Broadcast transaction {}", txid);
        Ok(txid)
    }
}
