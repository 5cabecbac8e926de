//! Account side of the pipeline: address derivation and operation building.

pub mod builder;
pub mod cache;
pub mod chain;
pub mod contracts;
pub mod deriver;

pub use builder::{
    BuildRequest, BuilderConfig, Call, DeploymentState, GasDefaults, GasOverrides, Intent,
    UserOperationBuilder,
};
pub use cache::{CachedDeploymentOracle, DeploymentCache};
pub use chain::{AccountIdentity, DeploymentOracle, FactoryReader, NonceSource, PublicKey};
pub use deriver::{AddressDeriver, FactoryConfig};
