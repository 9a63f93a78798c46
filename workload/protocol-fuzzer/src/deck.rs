//! The weighted attack deck: every attack of an enabled category enters
//! the deck once per weight point.

use squall_harness::{Deck, DeckBuilder, DeckError};

use crate::context::FuzzerContext;
use crate::exchange_client::ClientAttack;
use crate::exchange_server::{run_server_attack, ServerMutation};
use crate::hello::HelloAttack;

#[derive(Debug, Clone, Copy)]
pub enum AttackKind {
    ExchangeClient(ClientAttack),
    ExchangeServer(ServerMutation),
    Hello(HelloAttack),
}

impl AttackKind {
    pub async fn execute(self, ctx: &FuzzerContext) {
        match self {
            AttackKind::ExchangeClient(attack) => attack.execute(ctx).await,
            AttackKind::ExchangeServer(mutation) => run_server_attack(ctx, mutation).await,
            AttackKind::Hello(attack) => attack.execute(ctx).await,
        }
    }
}

/// Builds the attack deck from the `FUZZER_WEIGHT_*` variables.
pub fn build_deck() -> Result<Deck<AttackKind>, DeckError> {
    let client_attacks: Vec<(String, AttackKind)> = ClientAttack::ALL
        .iter()
        .map(|a| (a.name().to_string(), AttackKind::ExchangeClient(*a)))
        .collect();
    let server_attacks: Vec<(String, AttackKind)> = ServerMutation::ALL
        .iter()
        .map(|m| (m.name().to_string(), AttackKind::ExchangeServer(*m)))
        .collect();
    let hello_attacks: Vec<(String, AttackKind)> = HelloAttack::ALL
        .iter()
        .map(|a| (a.name().to_string(), AttackKind::Hello(*a)))
        .collect();

    DeckBuilder::new()
        .category("FUZZER_WEIGHT_EXCHANGE_CLIENT", 3, client_attacks)
        .category("FUZZER_WEIGHT_EXCHANGE_SERVER", 3, server_attacks)
        .category("FUZZER_WEIGHT_HELLO", 3, hello_attacks)
        .build()
}
