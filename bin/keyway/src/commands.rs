//! Subcommand handlers.

use alloy_primitives::{Address, B256};
use anyhow::{Context, anyhow};
use keyway_account::{
    AccountIdentity, AddressDeriver, BuildRequest, Call, CachedDeploymentOracle, DeploymentCache,
    DeploymentState, GasOverrides, Intent, PublicKey, UserOperationBuilder,
    chain::connect,
};
use keyway_bundler::BundlerClient;
use keyway_core::{
    ChallengeSigner, CredentialInput, Error, LocalOwnerSigner, SignatureScheme, WebAuthnAssertion,
    classify, encode_signature, signature::encode_webauthn,
};
use tokio::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::{AccountArgs, Config, CredentialEncoding, EncodeWebauthnArgs, SendArgs};

/// Reduces a pipeline error to its classified message and hint.
fn classified(err: impl Into<Error>) -> anyhow::Error {
    let classified = classify(&err.into());
    anyhow!("{classified}")
}

fn rpc_url(config: &Config) -> anyhow::Result<Url> {
    config.rpc_url.clone().context("--rpc-url / KEYWAY_RPC_URL is required")
}

fn bundler(config: &Config) -> anyhow::Result<BundlerClient> {
    let url = config.bundler_url.clone().context("--bundler-url / KEYWAY_BUNDLER_URL is required")?;
    Ok(BundlerClient::http(url, config.bundler_config())?)
}

fn identity(args: &AccountArgs, owner: Address) -> AccountIdentity {
    let public_key = args.x.zip(args.y).map(|(x, y)| PublicKey { x, y });
    AccountIdentity { public_key, owner, salt: args.salt }
}

pub async fn address(config: &Config, args: &AccountArgs) -> anyhow::Result<()> {
    let owner = args.owner.context("--owner is required")?;
    let identity = identity(args, owner);
    let deriver = AddressDeriver::new(config.factory_config()?, connect(rpc_url(config)?));

    let address = deriver.derive_address(&identity).await.map_err(classified)?;
    println!("{address}");
    Ok(())
}

pub async fn send(config: &Config, args: &SendArgs) -> anyhow::Result<()> {
    let signer = LocalOwnerSigner::from_hex(&args.owner_key).map_err(classified)?;
    let identity = identity(&args.account, args.account.owner.unwrap_or_else(|| signer.address()));
    let provider = connect(rpc_url(config)?);
    let bundler = bundler(config)?;
    bundler.ensure_entry_point_supported().await.map_err(classified)?;

    let builder = UserOperationBuilder::new(
        config.builder_config(),
        provider.clone(),
        AddressDeriver::new(config.factory_config()?, provider.clone()),
    );
    let oracle = CachedDeploymentOracle::new(provider, DeploymentCache::default());

    let sender = builder.deriver().derive_address(&identity).await.map_err(classified)?;
    let state = DeploymentState::query(&oracle, sender).await.map_err(classified)?;
    info!(%sender, ?state, deploy = args.deploy, "resolved account");

    let intent = match &args.data {
        Some(data) => Intent::Call(Call { to: args.to, value: args.value, data: data.clone() }),
        None => Intent::SendValue { to: args.to, value: args.value },
    };
    let mut request = BuildRequest {
        identity,
        sender: Some(sender),
        intent,
        state,
        deploy: args.deploy,
        overrides: GasOverrides::default(),
    };

    if let Some(tiers) = bundler.get_user_operation_gas_price().await {
        request.overrides = request.overrides.merge(GasOverrides {
            max_fee_per_gas: Some(tiers.standard.max_fee_per_gas),
            max_priority_fee_per_gas: Some(tiers.standard.max_priority_fee_per_gas),
            ..Default::default()
        });
    }

    let mut op = builder.build(&request).await.map_err(classified)?;
    if !args.skip_estimate {
        let draft = op.clone().with_signature(signer.scheme().dummy_signature());
        let estimate = bundler.estimate_user_operation_gas(&draft).await.map_err(classified)?;
        request.overrides = request.overrides.merge(estimate.into());
        op = builder.build(&request).await.map_err(classified)?;
    }

    let challenge = op.hash(config.entry_point(), config.chain_id, config.entry_point_version);
    let material = signer.sign_challenge(challenge).await.map_err(classified)?;
    let op = op.with_signature(encode_signature(&material).map_err(classified)?);

    let timeout = Duration::from_secs(config.poll_timeout_secs);
    let result = bundler.submit_and_wait(&op, timeout, !args.no_retry).await;
    // Inclusion or revert both change on-chain state.
    oracle.invalidate(&sender);
    let receipt = result.map_err(classified)?;

    if receipt.success && op.deploys_account() {
        info!(%sender, "account deployed");
    }
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

pub fn encode_webauthn_signature(args: &EncodeWebauthnArgs) -> anyhow::Result<()> {
    let input = |value: &str| match args.encoding {
        CredentialEncoding::Hex => CredentialInput::Hex(value.to_string()),
        CredentialEncoding::Base64url => CredentialInput::Base64Url(value.to_string()),
    };
    let assertion = WebAuthnAssertion::from_credentials(
        input(&args.authenticator_data),
        input(&args.client_data_json),
        input(&args.signature),
    )
    .map_err(classified)?;

    let encoded =
        encode_webauthn(&assertion, args.owner_signature.as_ref().map(|sig| &sig[..])).map_err(classified)?;
    let scheme = if args.owner_signature.is_some() {
        SignatureScheme::PasskeyAndOwner
    } else {
        SignatureScheme::Passkey
    };
    info!(?scheme, len = encoded.len(), "encoded signature");
    println!("{encoded}");
    Ok(())
}

pub async fn receipt(config: &Config, hash: B256) -> anyhow::Result<()> {
    match bundler(config)?.get_user_operation_receipt(hash).await.map_err(classified)? {
        Some(receipt) => println!("{}", serde_json::to_string_pretty(&receipt)?),
        None => warn!(%hash, "no receipt yet"),
    }
    Ok(())
}

pub async fn entry_points(config: &Config) -> anyhow::Result<()> {
    let configured = config.entry_point();
    for entry_point in bundler(config)?.supported_entry_points().await.map_err(classified)? {
        let marker = if entry_point == configured { " (configured)" } else { "" };
        println!("{entry_point}{marker}");
    }
    Ok(())
}

pub async fn gas_price(config: &Config) -> anyhow::Result<()> {
    let client = bundler(config)?;
    match client.get_user_operation_gas_price().await {
        Some(tiers) => {
            for (name, tier) in [("slow", tiers.slow), ("standard", tiers.standard), ("fast", tiers.fast)] {
                println!(
                    "{name}: maxFeePerGas={} maxPriorityFeePerGas={}",
                    tier.max_fee_per_gas, tier.max_priority_fee_per_gas
                );
            }
        }
        None => {
            let defaults = config.gas_defaults();
            warn!("relay gas price unavailable, showing configured fees");
            println!(
                "configured: maxFeePerGas={} maxPriorityFeePerGas={}",
                defaults.max_fee_per_gas, defaults.max_priority_fee_per_gas
            );
        }
    }
    Ok(())
}
