//! Action vectors and their dispatch. Each vector is a nullary action over
//! the engine context; the deck holds `ActionKind` values and the main loop
//! executes whichever one it draws.

pub mod consensus;
pub mod evm;
pub mod mempool;
pub mod reorg;

use squall_harness::{Deck, DeckBuilder, DeckError};

use crate::context::EngineContext;
use crate::payments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    TransferMarket,
    GasWar,
    HeavyCompute,
    Adversarial,
    ChainMonitor,
    DeployContracts,
    ContractCall,
    SelfDestructCycle,
    ContractRace,
    GasGuzzler,
    LogBlaster,
    MemoryBomb,
    StorageSpam,
    ReorgChaos,
    PaymentsMonitor,
    PaymentsTransfer,
    PaymentsDeposit,
    PaymentsApproveOperator,
    PaymentsCreateRail,
    PaymentsModifyRail,
    PaymentsSettleRail,
    PaymentsWithdraw,
}

impl ActionKind {
    pub async fn execute(self, ctx: &EngineContext) {
        match self {
            ActionKind::TransferMarket => mempool::transfer_market(ctx).await,
            ActionKind::GasWar => mempool::gas_war(ctx).await,
            ActionKind::HeavyCompute => consensus::heavy_compute(ctx).await,
            ActionKind::Adversarial => mempool::adversarial(ctx).await,
            ActionKind::ChainMonitor => consensus::chain_monitor(ctx).await,
            ActionKind::DeployContracts => evm::deploy_contracts(ctx).await,
            ActionKind::ContractCall => evm::contract_call(ctx).await,
            ActionKind::SelfDestructCycle => evm::selfdestruct_cycle(ctx).await,
            ActionKind::ContractRace => evm::contract_race(ctx).await,
            ActionKind::GasGuzzler => evm::gas_guzzler(ctx).await,
            ActionKind::LogBlaster => evm::log_blaster(ctx).await,
            ActionKind::MemoryBomb => evm::memory_bomb(ctx).await,
            ActionKind::StorageSpam => evm::storage_spam(ctx).await,
            ActionKind::ReorgChaos => reorg::reorg_chaos(ctx).await,
            ActionKind::PaymentsMonitor => payments::run_monitor(ctx).await,
            ActionKind::PaymentsTransfer => payments::transfer_token(ctx).await,
            ActionKind::PaymentsDeposit => payments::deposit(ctx).await,
            ActionKind::PaymentsApproveOperator => payments::approve_operator(ctx).await,
            ActionKind::PaymentsCreateRail => payments::create_rail(ctx).await,
            ActionKind::PaymentsModifyRail => payments::modify_rail(ctx).await,
            ActionKind::PaymentsSettleRail => payments::settle_rail(ctx).await,
            ActionKind::PaymentsWithdraw => payments::withdraw(ctx).await,
        }
    }
}

/// Builds the engine's weighted deck from the `STRESS_WEIGHT_*` variables.
pub fn build_deck() -> Result<Deck<ActionKind>, DeckError> {
    DeckBuilder::new()
        .action("transfer-market", "STRESS_WEIGHT_TRANSFER", 0, ActionKind::TransferMarket)
        .action("gas-war", "STRESS_WEIGHT_GAS_WAR", 0, ActionKind::GasWar)
        .action("heavy-compute", "STRESS_WEIGHT_HEAVY_COMPUTE", 0, ActionKind::HeavyCompute)
        .action("adversarial", "STRESS_WEIGHT_ADVERSARIAL", 0, ActionKind::Adversarial)
        .action("chain-monitor", "STRESS_WEIGHT_CHAIN_MONITOR", 0, ActionKind::ChainMonitor)
        // Contract stress vectors.
        .action("deploy-contracts", "STRESS_WEIGHT_DEPLOY", 2, ActionKind::DeployContracts)
        .action("contract-call", "STRESS_WEIGHT_CONTRACT_CALL", 3, ActionKind::ContractCall)
        .action("selfdestruct-cycle", "STRESS_WEIGHT_SELFDESTRUCT", 1, ActionKind::SelfDestructCycle)
        .action("contract-race", "STRESS_WEIGHT_CONTRACT_RACE", 2, ActionKind::ContractRace)
        // Resource stress vectors.
        .action("gas-guzzler", "STRESS_WEIGHT_GAS_GUZZLER", 0, ActionKind::GasGuzzler)
        .action("log-blaster", "STRESS_WEIGHT_LOG_BLASTER", 0, ActionKind::LogBlaster)
        .action("memory-bomb", "STRESS_WEIGHT_MEMORY_BOMB", 0, ActionKind::MemoryBomb)
        .action("storage-spam", "STRESS_WEIGHT_STORAGE_SPAM", 0, ActionKind::StorageSpam)
        // Network chaos.
        .action("reorg-chaos", "STRESS_WEIGHT_REORG", 0, ActionKind::ReorgChaos)
        // Payment-layer vectors, active only with the payments profile.
        .action("payments-monitor", "STRESS_WEIGHT_PAY_MONITOR", 0, ActionKind::PaymentsMonitor)
        .action("payments-transfer", "STRESS_WEIGHT_PAY_TRANSFER", 0, ActionKind::PaymentsTransfer)
        .action("payments-deposit", "STRESS_WEIGHT_PAY_DEPOSIT", 0, ActionKind::PaymentsDeposit)
        .action(
            "payments-approve-operator",
            "STRESS_WEIGHT_PAY_APPROVE_OPERATOR",
            0,
            ActionKind::PaymentsApproveOperator,
        )
        .action("payments-create-rail", "STRESS_WEIGHT_PAY_CREATE_RAIL", 0, ActionKind::PaymentsCreateRail)
        .action("payments-modify-rail", "STRESS_WEIGHT_PAY_MODIFY_RAIL", 0, ActionKind::PaymentsModifyRail)
        .action("payments-settle-rail", "STRESS_WEIGHT_PAY_SETTLE_RAIL", 0, ActionKind::PaymentsSettleRail)
        .action("payments-withdraw", "STRESS_WEIGHT_PAY_WITHDRAW", 0, ActionKind::PaymentsWithdraw)
        .build()
}
