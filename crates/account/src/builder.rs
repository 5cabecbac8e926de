//! Assembles unsigned user operations from intents.

use alloy_primitives::{Address, Bytes, U256, aliases::U192};
use alloy_sol_types::SolCall;
use keyway_core::{
    BuildError, UserOperation, UserOperationGasEstimate,
    codec::{FactoryCall, join_deployment_payload, pack_pair},
    user_operation::ENTRY_POINT_V07,
};
use tracing::info;

use crate::{
    chain::{AccountIdentity, DeploymentOracle, FactoryReader, NonceSource},
    contracts::{IAccount, IAccountFactory},
    deriver::AddressDeriver,
};

/// One call made by the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Target contract or recipient.
    pub to: Address,
    /// Native value forwarded.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

/// What the operation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Transfer native value.
    SendValue {
        /// Recipient.
        to: Address,
        /// Amount.
        value: U256,
    },
    /// Single contract call.
    Call(Call),
    /// Several calls executed atomically.
    BatchCall(Vec<Call>),
}

impl Intent {
    /// Calldata for the account's `execute` or `executeBatch`.
    pub fn encode(&self) -> Result<Bytes, BuildError> {
        let encoded = match self {
            Self::SendValue { to, value } => {
                IAccount::executeCall { dest: *to, value: *value, func: Bytes::new() }.abi_encode()
            }
            Self::Call(call) => IAccount::executeCall {
                dest: call.to,
                value: call.value,
                func: call.data.clone(),
            }
            .abi_encode(),
            Self::BatchCall(calls) if calls.is_empty() => return Err(BuildError::EmptyBatch),
            Self::BatchCall(calls) => IAccount::executeBatchCall {
                dest: calls.iter().map(|c| c.to).collect(),
                value: calls.iter().map(|c| c.value).collect(),
                func: calls.iter().map(|c| c.data.clone()).collect(),
            }
            .abi_encode(),
        };
        Ok(Bytes::from(encoded))
    }
}

/// Deployment status of the account, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// Address is fundable but has no code yet.
    Counterfactual,
    /// Code is present.
    Deployed,
}

impl DeploymentState {
    /// Asks `oracle` for the status of `address`.
    pub async fn query<O: DeploymentOracle + ?Sized>(
        oracle: &O,
        address: Address,
    ) -> Result<Self, BuildError> {
        Ok(if oracle.is_deployed(address).await? { Self::Deployed } else { Self::Counterfactual })
    }
}

/// Gas and fee values used when the caller does not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasDefaults {
    /// Validation gas. Passkey verification is expensive without a precompile.
    pub verification_gas_limit: U256,
    /// Execution gas.
    pub call_gas_limit: U256,
    /// Relay overhead gas.
    pub pre_verification_gas: U256,
    /// Fee cap per gas, in wei.
    pub max_fee_per_gas: U256,
    /// Tip per gas, in wei.
    pub max_priority_fee_per_gas: U256,
}

impl Default for GasDefaults {
    fn default() -> Self {
        Self {
            verification_gas_limit: U256::from(500_000),
            call_gas_limit: U256::from(200_000),
            pre_verification_gas: U256::from(60_000),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        }
    }
}

/// Per-operation overrides. Each set field replaces the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasOverrides {
    /// See [`GasDefaults::verification_gas_limit`].
    pub verification_gas_limit: Option<U256>,
    /// See [`GasDefaults::call_gas_limit`].
    pub call_gas_limit: Option<U256>,
    /// See [`GasDefaults::pre_verification_gas`].
    pub pre_verification_gas: Option<U256>,
    /// See [`GasDefaults::max_fee_per_gas`].
    pub max_fee_per_gas: Option<U256>,
    /// See [`GasDefaults::max_priority_fee_per_gas`].
    pub max_priority_fee_per_gas: Option<U256>,
}

impl GasOverrides {
    /// Applies `self` over `defaults` field by field.
    pub fn resolve(&self, defaults: &GasDefaults) -> GasDefaults {
        GasDefaults {
            verification_gas_limit: self
                .verification_gas_limit
                .unwrap_or(defaults.verification_gas_limit),
            call_gas_limit: self.call_gas_limit.unwrap_or(defaults.call_gas_limit),
            pre_verification_gas: self.pre_verification_gas.unwrap_or(defaults.pre_verification_gas),
            max_fee_per_gas: self.max_fee_per_gas.unwrap_or(defaults.max_fee_per_gas),
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .unwrap_or(defaults.max_priority_fee_per_gas),
        }
    }

    /// Layers `other`'s set fields on top of `self`.
    pub fn merge(self, other: Self) -> Self {
        Self {
            verification_gas_limit: other.verification_gas_limit.or(self.verification_gas_limit),
            call_gas_limit: other.call_gas_limit.or(self.call_gas_limit),
            pre_verification_gas: other.pre_verification_gas.or(self.pre_verification_gas),
            max_fee_per_gas: other.max_fee_per_gas.or(self.max_fee_per_gas),
            max_priority_fee_per_gas: other
                .max_priority_fee_per_gas
                .or(self.max_priority_fee_per_gas),
        }
    }
}

impl From<UserOperationGasEstimate> for GasOverrides {
    fn from(estimate: UserOperationGasEstimate) -> Self {
        Self {
            verification_gas_limit: Some(estimate.verification_gas_limit),
            call_gas_limit: Some(estimate.call_gas_limit),
            pre_verification_gas: Some(estimate.pre_verification_gas),
            ..Default::default()
        }
    }
}

/// Builder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// EntryPoint the nonce is read from.
    pub entry_point: Address,
    /// Nonce namespace.
    pub nonce_key: U192,
    /// Gas defaults.
    pub gas: GasDefaults,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { entry_point: ENTRY_POINT_V07, nonce_key: U192::ZERO, gas: GasDefaults::default() }
    }
}

/// Everything needed to build one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// The account.
    pub identity: AccountIdentity,
    /// Known account address. Derived from `identity` when absent.
    pub sender: Option<Address>,
    /// What to execute.
    pub intent: Intent,
    /// Current deployment status of the account.
    pub state: DeploymentState,
    /// Whether this operation deploys the account.
    pub deploy: bool,
    /// Gas overrides.
    pub overrides: GasOverrides,
}

/// Builds unsigned operations.
#[derive(Debug)]
pub struct UserOperationBuilder<N, F> {
    config: BuilderConfig,
    nonces: N,
    deriver: AddressDeriver<F>,
}

impl<N: NonceSource, F: FactoryReader> UserOperationBuilder<N, F> {
    /// New builder.
    pub const fn new(config: BuilderConfig, nonces: N, deriver: AddressDeriver<F>) -> Self {
        Self { config, nonces, deriver }
    }

    /// The address deriver.
    pub const fn deriver(&self) -> &AddressDeriver<F> {
        &self.deriver
    }

    /// Builds the operation with an empty signature.
    pub async fn build(&self, request: &BuildRequest) -> Result<UserOperation, BuildError> {
        match (request.deploy, request.state) {
            (true, DeploymentState::Deployed) => {
                return Err(BuildError::AlreadyDeployed(self.reported_sender(request).await?));
            }
            (false, DeploymentState::Counterfactual) => {
                return Err(BuildError::NotDeployed(self.reported_sender(request).await?));
            }
            _ => {}
        }

        let sender = match request.sender {
            Some(sender) => sender,
            None => self.deriver.derive_address(&request.identity).await?,
        };
        let init_code = if request.deploy {
            self.deployment_payload(&request.identity)
        } else {
            Bytes::new()
        };

        let call_data = request.intent.encode()?;
        let nonce =
            self.nonces.get_nonce(self.config.entry_point, sender, self.config.nonce_key).await?;
        let gas = request.overrides.resolve(&self.config.gas);

        let op = UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            account_gas_limits: pack_pair(gas.verification_gas_limit, gas.call_gas_limit)?,
            pre_verification_gas: gas.pre_verification_gas,
            gas_fees: pack_pair(gas.max_priority_fee_per_gas, gas.max_fee_per_gas)?,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };

        info!(
            sender = %op.sender,
            nonce = %op.nonce,
            deploys = op.deploys_account(),
            call_data_len = op.call_data.len(),
            "built user operation"
        );
        Ok(op)
    }

    /// Sender named in a rejected request. Falls back to the factory only
    /// without creation bytecode.
    async fn reported_sender(&self, request: &BuildRequest) -> Result<Address, BuildError> {
        if let Some(sender) = request.sender {
            return Ok(sender);
        }
        match self.deriver.compute_local(&request.identity) {
            Ok(local) => Ok(local),
            Err(_) => Ok(self.deriver.derive_address(&request.identity).await?),
        }
    }

    /// `factory ++ createAccount(x, y, owner, salt)`.
    pub fn deployment_payload(&self, identity: &AccountIdentity) -> Bytes {
        let (x, y) = identity.coordinates();
        let data = IAccountFactory::createAccountCall { x, y, owner: identity.owner, salt: identity.salt }
            .abi_encode();
        join_deployment_payload(Some(&FactoryCall {
            factory: self.deriver.config().factory,
            data: Bytes::from(data),
        }))
    }
}
