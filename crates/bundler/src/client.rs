//! Relay client: submission, lookups and receipt polling.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address, B256};
use keyway_core::{
    BundlerError, ClassifiedError, EntryPointVersion, UserOperation, UserOperationGasEstimate,
    classify_bundler,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::metrics::{Metrics, record_error};
use crate::retry::RetryPolicy;
use crate::state::BundlerRequestState;
use crate::transport::{BundlerTransport, HttpTransport};
use crate::types::{GasPriceTiers, UserOperationLookup, UserOperationReceipt};

/// Floor for the receipt poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Receipt polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up after this long without a receipt.
    pub timeout: Duration,
    /// Pause between receipt lookups.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(60), interval: Duration::from_secs(2) }
    }
}

/// What the client submits against.
#[derive(Debug, Clone)]
pub struct BundlerClientConfig {
    /// EntryPoint the operations target.
    pub entry_point: Address,
    /// Selects the operation hash layout.
    pub entry_point_version: EntryPointVersion,
    /// Used to compute the expected operation hash.
    pub chain_id: u64,
    /// Vendor namespace of the gas price extension, e.g. `pimlico`.
    pub gas_price_namespace: Option<String>,
    /// Receipt polling bounds.
    pub poll: PollConfig,
    /// Backoff around submit and wait.
    pub retry: RetryPolicy,
}

impl BundlerClientConfig {
    /// Defaults for the canonical EntryPoint of `version`.
    pub fn new(entry_point_version: EntryPointVersion, chain_id: u64) -> Self {
        Self {
            entry_point: entry_point_version.canonical_address(),
            entry_point_version,
            chain_id,
            gas_price_namespace: None,
            poll: PollConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for an ERC-4337 relay.
///
/// Every failed request is classified and logged before it is returned.
pub struct BundlerClient<T = HttpTransport> {
    transport: T,
    config: BundlerClientConfig,
    metrics: Metrics,
}

impl<T> fmt::Debug for BundlerClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlerClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl BundlerClient<HttpTransport> {
    /// Client talking JSON-RPC over HTTP to `url`.
    pub fn http(url: Url, config: BundlerClientConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(HttpTransport::new(url)?, config))
    }
}

impl<T: BundlerTransport> BundlerClient<T> {
    /// Client over any transport.
    pub fn new(transport: T, config: BundlerClientConfig) -> Self {
        Self { transport, config, metrics: Metrics::default() }
    }

    /// Client configuration.
    pub const fn config(&self) -> &BundlerClientConfig {
        &self.config
    }

    /// Underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, BundlerError> {
        let result = match self.transport.request(method, params.clone()).await {
            Ok(value) => serde_json::from_value(value).map_err(|err| BundlerError::InvalidResponse {
                method: method.to_string(),
                params,
                message: err.to_string(),
            }),
            Err(err) => Err(err),
        };
        result.inspect_err(|err| {
            self.report(err);
        })
    }

    fn report(&self, err: &BundlerError) -> ClassifiedError {
        let classified = classify_bundler(err);
        warn!(
            method = err.method().unwrap_or_default(),
            kind = %classified.kind,
            retryable = classified.retryable,
            validation_code = classified.validation_code.as_deref(),
            hint = classified.hint,
            error = %err,
            "relay request failed"
        );
        record_error(classified.kind);
        classified
    }

    /// `eth_sendUserOperation`. Returns the hash assigned by the relay.
    pub async fn submit(&self, op: &UserOperation) -> Result<B256, BundlerError> {
        let params = json!([op.to_rpc()?, self.config.entry_point]);
        let hash: B256 = self.call("eth_sendUserOperation", params).await?;

        let expected =
            op.hash(self.config.entry_point, self.config.chain_id, self.config.entry_point_version);
        if hash != expected {
            warn!(
                relay_hash = %hash,
                local_hash = %expected,
                "relay returned an unexpected user operation hash"
            );
        }
        info!(user_op_hash = %hash, sender = %op.sender, nonce = %op.nonce, "user operation submitted");
        Ok(hash)
    }

    /// `eth_estimateUserOperationGas`. The operation should carry a dummy
    /// signature of the right size.
    pub async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
    ) -> Result<UserOperationGasEstimate, BundlerError> {
        let params = json!([op.to_rpc()?, self.config.entry_point]);
        self.call("eth_estimateUserOperationGas", params).await
    }

    /// `eth_getUserOperationReceipt`. `None` while the operation is pending.
    pub async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.call("eth_getUserOperationReceipt", json!([user_op_hash])).await
    }

    /// `eth_getUserOperationByHash`.
    pub async fn get_user_operation_by_hash(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationLookup>, BundlerError> {
        self.call("eth_getUserOperationByHash", json!([user_op_hash])).await
    }

    /// `eth_supportedEntryPoints`.
    pub async fn supported_entry_points(&self) -> Result<Vec<Address>, BundlerError> {
        self.call("eth_supportedEntryPoints", json!([])).await
    }

    /// Fails unless the relay lists the configured EntryPoint.
    pub async fn ensure_entry_point_supported(&self) -> Result<(), BundlerError> {
        let supported = self.supported_entry_points().await?;
        if supported.contains(&self.config.entry_point) {
            return Ok(());
        }
        let err = BundlerError::UnsupportedEntryPoint { entry_point: self.config.entry_point, supported };
        self.report(&err);
        Err(err)
    }

    /// Vendor gas price quote. Best-effort: `None` when no namespace is
    /// configured or the relay does not answer.
    pub async fn get_user_operation_gas_price(&self) -> Option<GasPriceTiers> {
        let namespace = self.config.gas_price_namespace.as_deref()?;
        let method = format!("{namespace}_getUserOperationGasPrice");
        match self.call(&method, json!([])).await {
            Ok(tiers) => Some(tiers),
            Err(_) => {
                debug!(method = %method, "gas price extension unavailable");
                None
            }
        }
    }

    /// Looks up the receipt every `interval` until one arrives or `timeout`
    /// elapses.
    ///
    /// A receipt with `success == false` fails immediately with
    /// [`BundlerError::Reverted`]. Retryable lookup failures are remembered
    /// and reported in [`BundlerError::Timeout`]; other failures end the loop.
    pub async fn poll_for_receipt(
        &self,
        user_op_hash: B256,
        timeout: Duration,
        interval: Duration,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        let mut polls = 0u32;
        let mut last_error = None;

        let outcome = loop {
            polls += 1;
            match self.get_user_operation_receipt(user_op_hash).await {
                Ok(Some(receipt)) if !receipt.success => {
                    break Err(BundlerError::Reverted { user_op_hash, reason: receipt.reason });
                }
                Ok(Some(receipt)) => break Ok(receipt),
                Ok(None) => {}
                Err(err) if classify_bundler(&err).retryable => last_error = Some(Box::new(err)),
                Err(err) => break Err(err),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                break Err(BundlerError::Timeout { user_op_hash, waited, last_error });
            }
            sleep(interval.min(timeout - waited)).await;
        };

        self.metrics.receipt_polls.record(f64::from(polls));
        match &outcome {
            Ok(receipt) => info!(
                %user_op_hash,
                transaction_hash = ?receipt.transaction_hash(),
                actual_gas_used = %receipt.actual_gas_used,
                "user operation included"
            ),
            Err(err @ (BundlerError::Reverted { .. } | BundlerError::Timeout { .. })) => {
                self.report(err);
            }
            Err(_) => {}
        }
        outcome
    }

    /// Submits `op` and waits for its receipt.
    ///
    /// With `retry`, the submit and poll sequence is repeated under the
    /// configured [`RetryPolicy`] while failures classify as retryable.
    pub async fn submit_and_wait(
        &self,
        op: &UserOperation,
        timeout: Duration,
        retry: bool,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let state = Mutex::new(BundlerRequestState::Pending);
        self.drive(op, timeout, retry, &state).await
    }

    /// Same as [`Self::submit_and_wait`], reporting the terminal request state.
    pub async fn submit_and_track(
        &self,
        op: &UserOperation,
        timeout: Duration,
        retry: bool,
    ) -> BundlerRequestState {
        let state = Mutex::new(BundlerRequestState::Pending);
        // The outcome is recorded in `state`.
        let _ = self.drive(op, timeout, retry, &state).await;
        state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drive(
        &self,
        op: &UserOperation,
        timeout: Duration,
        retry: bool,
        state: &Mutex<BundlerRequestState>,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let policy = if retry { self.config.retry } else { RetryPolicy::none() };
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();

        let result = policy
            .run(|| async {
                attempts.fetch_add(1, Ordering::Relaxed);
                let user_op_hash = self.submit(op).await?;
                transition(state, BundlerRequestState::Submitted(user_op_hash));
                self.poll_for_receipt(user_op_hash, timeout, self.config.poll.interval).await
            })
            .await;

        self.metrics.submit_and_wait_duration.record(started.elapsed().as_secs_f64());
        let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
        self.metrics.retries.increment(retries as u64);

        let next = match &result {
            Ok(receipt) => BundlerRequestState::Included(Box::new(receipt.clone())),
            Err(err) => BundlerRequestState::Failed(classify_bundler(err)),
        };
        transition(state, next);
        result
    }
}

fn transition(state: &Mutex<BundlerRequestState>, next: BundlerRequestState) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(err) = state.advance(next) {
        warn!(error = %err, "ignoring bundler request state transition");
    }
}
