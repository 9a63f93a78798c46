//! The engine context: every piece of state the action vectors share.
//! Actions receive `&EngineContext` and nothing else.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use squall_chain_client::{Address, CidJson, NodeHandle, NodePool, PoolConfig};
use squall_harness::DeterministicRng;

use crate::config::EngineConfig;
use crate::keystore::{load_keystore, Wallet};
use crate::payments::PaymentsProfile;

/// A confirmed contract deployment. Entries are never removed; a destroyed
/// contract's address stays behind as a post-destruct probe target.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub address: Address,
    pub ctype: &'static str,
    pub deployer: Address,
}

/// A submitted deployment whose receipt has not been seen yet.
#[derive(Debug, Clone)]
pub struct PendingDeploy {
    pub message: CidJson,
    pub ctype: &'static str,
    pub deployer: Address,
    pub epoch: i64,
}

pub struct EngineContext {
    pub config: EngineConfig,
    pub pool: NodePool,
    pub wallets: Vec<Wallet>,
    wallet_index: HashMap<Address, usize>,
    pub rng: DeterministicRng,
    /// Per-address monotonic nonce counters for native messages.
    nonces: Mutex<HashMap<Address, u64>>,
    /// Separate counters for delegated (EVM) transactions, keyed by the
    /// sender's derived native address. Invalidated on push failure.
    eth_nonces: Mutex<HashMap<Address, u64>>,
    pub contracts: Mutex<Vec<DeployedContract>>,
    pub pending_deploys: Mutex<Vec<PendingDeploy>>,
    pub payments: Option<PaymentsProfile>,
}

impl EngineContext {
    /// Connects the pool, loads wallets, waits for the chain, and seeds the
    /// nonce counters. Any failure here is a fatal startup error.
    pub async fn initialise(config: EngineConfig) -> Result<Self> {
        let pool = NodePool::connect(&PoolConfig {
            names: config.nodes.clone(),
            port: config.rpc_port.clone(),
            forest_port: config.forest_rpc_port.clone(),
            devgen_dir: config.devgen_dir.clone(),
        })
        .context("connecting node pool")?;

        let wallets = load_keystore(&config.keystore_path).context("loading keystore")?;
        let wallet_index = wallets
            .iter()
            .enumerate()
            .map(|(i, w)| (w.address.clone(), i))
            .collect();

        wait_for_chain(&pool, config.wait_height).await;

        let rng = DeterministicRng::seeded(config.rng_seed);
        let nonces = init_nonces(&pool, &wallets).await;
        let payments =
            PaymentsProfile::load(&config.payments_env_path, &config.provider_key_path);

        Ok(Self {
            config,
            pool,
            wallets,
            wallet_index,
            rng,
            nonces: Mutex::new(nonces),
            eth_nonces: Mutex::new(HashMap::new()),
            contracts: Mutex::new(Vec::new()),
            pending_deploys: Mutex::new(Vec::new()),
            payments,
        })
    }

    pub fn pick_node(&self) -> &NodeHandle {
        self.pool.get(self.rng.next_int(self.pool.len()))
    }

    pub fn pick_wallet(&self) -> &Wallet {
        &self.wallets[self.rng.next_int(self.wallets.len())]
    }

    pub fn wallet_by_address(&self, address: &Address) -> Option<&Wallet> {
        self.wallet_index.get(address).map(|i| &self.wallets[*i])
    }

    /// Nonce the next native message from `address` must carry.
    pub fn current_nonce(&self, address: &Address) -> u64 {
        *self.nonces.lock().get(address).unwrap_or(&0)
    }

    /// Consumes one nonce after a successful push.
    pub fn bump_nonce(&self, address: &Address) {
        *self.nonces.lock().entry(address.clone()).or_insert(0) += 1;
    }

    /// Takes the next delegated-tx nonce, syncing from the node when the
    /// local view is absent. Returns `None` when the sync itself fails.
    pub async fn take_eth_nonce(&self, node: &NodeHandle, sender: &Address) -> Option<u64> {
        let cached = { self.eth_nonces.lock().get(sender).copied() };
        let nonce = match cached {
            Some(nonce) => nonce,
            None => match node.client.mpool_get_nonce(&sender.to_string()).await {
                Ok(nonce) => nonce,
                Err(err) => {
                    warn!(target: "engine::nonce", sender = %sender, %err, "nonce sync failed");
                    return None;
                }
            },
        };
        self.eth_nonces.lock().insert(sender.clone(), nonce + 1);
        Some(nonce)
    }

    /// Drops the cached delegated-tx counter so the next send resyncs; the
    /// failure may have come from a stale local view.
    pub fn invalidate_eth_nonce(&self, sender: &Address) {
        self.eth_nonces.lock().remove(sender);
    }

    pub fn contracts_of_type(&self, ctype: &str) -> Vec<DeployedContract> {
        self.contracts
            .lock()
            .iter()
            .filter(|c| c.ctype == ctype)
            .cloned()
            .collect()
    }

    pub fn register_contract(&self, contract: DeployedContract) {
        self.contracts.lock().push(contract);
    }
}

/// Blocks until the primary node's head reaches the target height.
async fn wait_for_chain(pool: &NodePool, target_height: i64) {
    let node = pool.primary();
    info!(target: "engine::init", target_height, "waiting for chain");
    loop {
        match node.client.chain_head().await {
            Ok(head) if head.height >= target_height => {
                info!(target: "engine::init", height = head.height, "chain ready");
                return;
            }
            Ok(head) => {
                info!(target: "engine::init", height = head.height, "chain still behind, waiting");
            }
            Err(err) => {
                warn!(target: "engine::init", %err, "head query failed, retrying");
            }
        }
        sleep(Duration::from_secs(2)).await;
    }
}

/// Seeds the native nonce counters from the primary node's mempool view.
async fn init_nonces(pool: &NodePool, wallets: &[Wallet]) -> HashMap<Address, u64> {
    let node = pool.primary();
    let mut nonces = HashMap::with_capacity(wallets.len());
    for wallet in wallets {
        let nonce = match node.client.mpool_get_nonce(&wallet.address.to_string()).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(
                    target: "engine::init",
                    address = %wallet.address,
                    %err,
                    "cannot fetch nonce, starting at 0"
                );
                0
            }
        };
        nonces.insert(wallet.address.clone(), nonce);
    }
    info!(target: "engine::init", addresses = nonces.len(), "nonces initialised");
    nonces
}
