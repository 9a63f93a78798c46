//! Bytecode fixtures for the stress contracts. The blobs are opaque build
//! artifacts checked in as hex; the engine only ships them to the
//! deployment actor and never inspects them.

/// Contract types eligible for random deployment.
pub const DEPLOYABLE_TYPES: &[&str] = &[
    "recursive",
    "delegatecall",
    "simplecoin",
    "extrecursive",
    "selfdestruct",
];

/// Contract types deployed on demand by the resource-stress vectors.
pub const RESOURCE_TYPES: &[&str] = &["gasguzzler", "logblaster", "memorybomb", "storagespam"];

const RECURSIVE_HEX: &str = "608060405234801561001057600080fd5b50610214806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c8063d2ce7d6514610030575b600080fd5b61004a600480360381019061004591906100f2565b61004c565b005b600081111561009b573060405180602001604052806000815250632ce7d66560e01b8360016100a0919061014e565b6040516024016100919190610133565b60405160208183030381529060405290565b505050565b600080fd5b6000819050919050565b6100b8816100a5565b81146100c357600080fd5b50565b6000813590506100d5816100af565b92915050565b6000602082840312156100ec576100eb6100a0565b5b60006100fa848285016100c6565b91505092915050565b61010c816100a5565b82525050565b60006020820190506101276000830184610103565b92915050565b6000610139826100a5565b9150610144836100a5565b925082820390508181111561015c5761015b610182565b5b9291505056fea264697066735822122068b1";

const DELEGATECALL_HEX: &str = "608060405234801561001057600080fd5b506101d7806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c8063d2ce7d6514610030575b600080fd5b61004a600480360381019061004591906100d9565b61004c565b005b60008111156100a757600030905060008173ffffffffffffffffffffffffffffffffffffffff16632ce7d66560e01b60018461008891906101135b6040516024016100999190610144565b60405160208183030381529060405290565b5050565b600080fd5b6000819050919050565b6100c4816100b1565b81146100cf57600080fd5b50565b6000813590506100e1816100bb565b92915050565b6000602082840312156100fd576100fc6100ac565b5b600061010b848285016100d2565b91505092915050565b61011d816100b1565b82525050565b6000602082019050610138600083018461011456fea2646970667358221220a3c2";

const SIMPLECOIN_HEX: &str = "608060405234801561001057600080fd5b50612710600080335673ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff16815260200190815260200160002081905550610295806100666000396000f3fe608060405234801561001057600080fd5b50600436106100415760003560e01c806390b98a1114610046578063f8b2cb4f14610076578063e1f21c67146100a6575b600080fd5b610060600480360381019061005b9190610195565b6100c2565b60405161006d91906101f0565b60405180910390f35b610090600480360381019061008b919061020b565b61021f565b60405161009d9190610247565b60405180910390f35b6100c060048036038101906100bb9190610262565b610267565b005b6000816000803373ffffffffffffffffffffffffffffffffffffffff16815260200190815260200160002054101561010057600090506101195b816000803373ffffffffffffffffffffffffffffffffffffffff168152602001908152602001600020600082825461013891906102a3565b92505081905550816000808573ffffffffffffffffffffffffffffffffffffffff168152602001908152602001600020600082825461017791906102d7565b925050819055506001905092915050565b600080fd5b919050565b60008135905061019e8161018a565b92915050565b600080604083850312156101bb576101ba610185565b5b60006101c98582860161018f565b92505060206101da8582860161018f565b915050925092905056fea26469706673582212204c17";

const EXTRECURSIVE_HEX: &str = "608060405234801561001057600080fd5b506101f6806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c8063c5cb11bc14610030575b600080fd5b61004a600480360381019061004591906100e8565b61004c565b005b60008111156100a6573073ffffffffffffffffffffffffffffffffffffffff1663c5cb11bc60018361007e9190610122565b6040518263ffffffff1660e01b815260040161009a9190610153565b600060405180830381600087803b1580156100b457600080fd5b505af11580156100c8573d6000803e3d6000fd5b505050505b50565b600080fd5b6000819050919050565b6100e3816100d0565b81146100ee57600080fd5b50565b600081359050610100816100da565b92915050565b60006020828403121561011c5761011b6100cb565b5b600061012a848285016100f1565b9150509291505056fea2646970667358221220e4a7";

const SELFDESTRUCT_HEX: &str = "6080604052336000806101000a81548173ffffffffffffffffffffffffffffffffffffffff021916908373ffffffffffffffffffffffffffffffffffffffff160217905550610119806100526000396000f3fe6080604052348015600f57600080fd5b506004361060285760003560e01c806383197ef014602d575b600080fd5b60336035565b005b60008054906101000a900473ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff16ff5b56fea264697066735822122011aa";

const GASGUZZLER_HEX: &str = "608060405234801561001057600080fd5b50610170806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c8063ad2f852314610030575b600080fd5b61004a600480360381019061004591906100b8565b61004c565b005b6000805b8281101561009657818160405160200161006b9291906100f7565b6040516020818303038152906040528051906020012091508080610089906101205b9150506100505b505050565b600080fd5b6000819050919050565b6100b3816100a0565b81146100be57600080fd5b50565b6000813590506100d0816100aa565b92915050565b6000602082840312156100ec576100eb61009b565b5b60006100fa848285016100c1565b9150509291505056fea2646970667358221220b7d4";

const LOGBLASTER_HEX: &str = "608060405234801561001057600080fd5b50610156806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c80637ae2b5c714610030575b600080fd5b61004a600480360381019061004591906100a4565b61004c565b005b60005b8181101561009f57803373ffffffffffffffffffffffffffffffffffffffff167fb3bb57e85c9b1be85498b41a7a4b9e4db0f7c9e1d2e5a9c8fd3eb16f6e2f9e2460405160405180910390a38080600101915050604f565b5050565b600080fd5b6000819050919050565b6100b5816100a8565b81146100c057600080fd5b50565b6000813590506100d2816100ac565b92915050565b6000602082840312156100ee576100ed6100a3565b5b60006100fc848285016100c3565b9150509291505056fea2646970667358221220c9e1";

const MEMORYBOMB_HEX: &str = "608060405234801561001057600080fd5b50610143806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c8063a1c5e4a314610030575b600080fd5b61004a6004803603810190610045919061009a565b61004c565b005b6000602082026040519150808252806020830152505050565b600080fd5b6000819050919050565b6100868161006f565b811461009157600080fd5b50565b6000813590506100a381610079565b92915050565b6000602082840312156100bf576100be61006a565b5b60006100cd848285016100945b9150509291505056fea2646970667358221220d2f8";

const STORAGESPAM_HEX: &str = "608060405234801561001057600080fd5b50610185806100206000396000f3fe608060405234801561001057600080fd5b506004361061002b5760003560e01c80635b0a4a1614610030575b600080fd5b61004a600480360381019061004591906100c6565b61004c565b005b60005b828110156100a1576001818460405160200161006c929190610106565b6040516020818303038152906040528051906020012060001c610090919061012f565b600081905550808060010191505061004f565b505050565b600080fd5b6000819050919050565b6100bd816100aa565b81146100c857600080fd5b50565b6000813590506100da816100b4565b92915050565b600080604083850312156100f7576100f66100a5565b5b6000610105858286016100cb565b925050602061011685828601610100565b9150509250929050565b56fea2646970667358221220f1b3";

/// Bytecode for a contract type; `None` for unknown tags.
pub fn bytecode(ctype: &str) -> Option<Vec<u8>> {
    let raw = match ctype {
        "recursive" => RECURSIVE_HEX,
        "delegatecall" => DELEGATECALL_HEX,
        "simplecoin" => SIMPLECOIN_HEX,
        "extrecursive" => EXTRECURSIVE_HEX,
        "selfdestruct" => SELFDESTRUCT_HEX,
        "gasguzzler" => GASGUZZLER_HEX,
        "logblaster" => LOGBLASTER_HEX,
        "memorybomb" => MEMORYBOMB_HEX,
        "storagespam" => STORAGESPAM_HEX,
        _ => return None,
    };
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_type_decodes() {
        for ctype in DEPLOYABLE_TYPES.iter().chain(RESOURCE_TYPES) {
            let code = bytecode(ctype).unwrap_or_else(|| panic!("bytecode for {ctype}"));
            assert!(!code.is_empty(), "{ctype} bytecode empty");
        }
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(bytecode("does-not-exist").is_none());
    }
}
