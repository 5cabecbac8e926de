//! Configuration for the keyway CLI

use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keyway_account::{BuilderConfig, FactoryConfig, GasDefaults};
use keyway_bundler::{BundlerClientConfig, PollConfig, RetryPolicy};
use keyway_core::EntryPointVersion;
use keyway_core::logger::LogFormat;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Chain RPC used for nonces, factory reads and code checks
    #[arg(long, env = "KEYWAY_RPC_URL", global = true)]
    pub rpc_url: Option<Url>,

    /// ERC-4337 relay (bundler) endpoint
    #[arg(long, env = "KEYWAY_BUNDLER_URL", global = true)]
    pub bundler_url: Option<Url>,

    /// Chain ID the operation hash is bound to
    #[arg(long, env = "KEYWAY_CHAIN_ID", default_value = "8453", global = true)]
    pub chain_id: u64,

    /// EntryPoint version: v0.7 or v0.8
    #[arg(long, env = "KEYWAY_ENTRY_POINT_VERSION", default_value = "v0.7", global = true)]
    pub entry_point_version: EntryPointVersion,

    /// EntryPoint address; the canonical deployment of the version when unset
    #[arg(long, env = "KEYWAY_ENTRY_POINT", global = true)]
    pub entry_point: Option<Address>,

    /// Account factory
    #[arg(long, env = "KEYWAY_FACTORY", global = true)]
    pub factory: Option<Address>,

    /// File holding the hex-encoded creation bytecode of the account proxy
    #[arg(long, env = "KEYWAY_CREATION_CODE_FILE", global = true)]
    pub creation_code_file: Option<PathBuf>,

    /// Account implementation the proxy points at
    #[arg(long, env = "KEYWAY_IMPLEMENTATION", global = true)]
    pub implementation: Option<Address>,

    /// Namespace of the relay's gas price extension, e.g. pimlico
    #[arg(long, env = "KEYWAY_GAS_PRICE_NAMESPACE", global = true)]
    pub gas_price_namespace: Option<String>,

    #[arg(long, env = "KEYWAY_VERIFICATION_GAS_LIMIT", default_value = "500000", global = true)]
    pub verification_gas_limit: U256,

    #[arg(long, env = "KEYWAY_CALL_GAS_LIMIT", default_value = "200000", global = true)]
    pub call_gas_limit: U256,

    #[arg(long, env = "KEYWAY_PRE_VERIFICATION_GAS", default_value = "60000", global = true)]
    pub pre_verification_gas: U256,

    /// Fee cap per gas, in wei
    #[arg(long, env = "KEYWAY_MAX_FEE_PER_GAS", default_value = "2000000000", global = true)]
    pub max_fee_per_gas: U256,

    /// Tip per gas, in wei
    #[arg(
        long,
        env = "KEYWAY_MAX_PRIORITY_FEE_PER_GAS",
        default_value = "1000000000",
        global = true
    )]
    pub max_priority_fee_per_gas: U256,

    /// Seconds to wait for a receipt
    #[arg(long, env = "KEYWAY_POLL_TIMEOUT_SECS", default_value = "60", global = true)]
    pub poll_timeout_secs: u64,

    /// Milliseconds between receipt lookups
    #[arg(long, env = "KEYWAY_POLL_INTERVAL_MS", default_value = "2000", global = true)]
    pub poll_interval_ms: u64,

    /// Submit attempts, the first one included
    #[arg(long, env = "KEYWAY_RETRY_ATTEMPTS", default_value = "3", global = true)]
    pub retry_attempts: usize,

    /// Backoff before the first retry; doubles per attempt
    #[arg(long, env = "KEYWAY_RETRY_BASE_DELAY_MS", default_value = "1000", global = true)]
    pub retry_base_delay_ms: u64,

    #[arg(long, env = "KEYWAY_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// text or json
    #[arg(long, env = "KEYWAY_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Derive the counterfactual account address
    Address(AccountArgs),
    /// Build, sign with the owner key, submit and wait for inclusion
    Send(SendArgs),
    /// Encode a WebAuthn assertion as a compact account signature
    EncodeWebauthn(EncodeWebauthnArgs),
    /// Look up the receipt of a user operation
    Receipt {
        /// User operation hash
        hash: B256,
    },
    /// List the entry points the relay serves
    EntryPoints,
    /// Query the relay's gas price extension
    GasPrice,
}

#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// Passkey public key x coordinate
    #[arg(long, requires = "y")]
    pub x: Option<B256>,

    /// Passkey public key y coordinate
    #[arg(long, requires = "x")]
    pub y: Option<B256>,

    /// Owner address; defaults to the owner key's address when sending
    #[arg(long)]
    pub owner: Option<Address>,

    #[arg(long, default_value = "0")]
    pub salt: U256,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    /// Hex private key of the account owner
    #[arg(long, env = "KEYWAY_OWNER_PRIVATE_KEY", hide_env_values = true)]
    pub owner_key: String,

    /// Call target
    #[arg(long)]
    pub to: Address,

    /// Value in wei
    #[arg(long, default_value = "0")]
    pub value: U256,

    /// Calldata for the target
    #[arg(long)]
    pub data: Option<Bytes>,

    /// Attach the deployment payload; the account must not be deployed yet
    #[arg(long)]
    pub deploy: bool,

    /// Use configured gas limits instead of asking the relay
    #[arg(long)]
    pub skip_estimate: bool,

    /// Fail on the first relay error instead of backing off
    #[arg(long)]
    pub no_retry: bool,
}

/// How assertion fields are encoded on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEncoding {
    Hex,
    Base64url,
}

#[derive(Args, Debug, Clone)]
pub struct EncodeWebauthnArgs {
    #[arg(long)]
    pub authenticator_data: String,

    #[arg(long)]
    pub client_data_json: String,

    /// DER-encoded P-256 signature
    #[arg(long)]
    pub signature: String,

    /// Encoding of the three fields above
    #[arg(long, value_enum, default_value = "base64url")]
    pub encoding: CredentialEncoding,

    /// 65-byte owner signature to append for two-factor accounts
    #[arg(long)]
    pub owner_signature: Option<Bytes>,
}

impl Config {
    pub fn entry_point(&self) -> Address {
        self.entry_point.unwrap_or_else(|| self.entry_point_version.canonical_address())
    }

    pub const fn gas_defaults(&self) -> GasDefaults {
        GasDefaults {
            verification_gas_limit: self.verification_gas_limit,
            call_gas_limit: self.call_gas_limit,
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        }
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig { entry_point: self.entry_point(), gas: self.gas_defaults(), ..Default::default() }
    }

    pub fn bundler_config(&self) -> BundlerClientConfig {
        BundlerClientConfig {
            entry_point: self.entry_point(),
            entry_point_version: self.entry_point_version,
            chain_id: self.chain_id,
            gas_price_namespace: self.gas_price_namespace.clone(),
            poll: PollConfig {
                timeout: Duration::from_secs(self.poll_timeout_secs),
                interval: Duration::from_millis(self.poll_interval_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.retry_attempts.max(1),
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }

    /// Factory parameters; the creation bytecode is read from disk when configured.
    pub fn factory_config(&self) -> anyhow::Result<FactoryConfig> {
        let factory =
            self.factory.ok_or_else(|| anyhow::anyhow!("--factory / KEYWAY_FACTORY is required"))?;
        let creation_code = match &self.creation_code_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
                Some(text.trim().parse::<Bytes>()?)
            }
            None => None,
        };
        let constructor_args =
            self.implementation.map(FactoryConfig::erc1967_proxy_args).unwrap_or_default();
        Ok(FactoryConfig { factory, creation_code, constructor_args })
    }
}
