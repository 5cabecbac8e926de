#![allow(dead_code)]

/// Common fixtures for account tests

pub mod mocks;

use alloy_primitives::{Address, Bytes, U256, address, bytes};
use keyway_account::{AccountIdentity, FactoryConfig, PublicKey};
use keyway_core::test_utils::TestPasskey;

pub const FACTORY: Address = address!("0xfac7000000000000000000000000000000000001");
pub const IMPLEMENTATION: Address = address!("0x1111000000000000000000000000000000000001");
pub const OWNER: Address = address!("0x0000000000000000000000000000000000000bee");

/// Stand-in proxy creation bytecode
pub fn creation_code() -> Bytes {
    bytes!("608060405260405161040a38038061040a83398101604081905261002291610268565b")
}

pub fn factory_config() -> FactoryConfig {
    FactoryConfig {
        factory: FACTORY,
        creation_code: Some(creation_code()),
        constructor_args: FactoryConfig::erc1967_proxy_args(IMPLEMENTATION),
    }
}

pub fn passkey_identity(salt: u64) -> AccountIdentity {
    let (x, y) = TestPasskey::new([11u8; 32]).coordinates();
    AccountIdentity { public_key: Some(PublicKey { x, y }), owner: OWNER, salt: U256::from(salt) }
}
