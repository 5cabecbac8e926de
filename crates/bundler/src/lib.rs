//! Relay side of the pipeline: JSON-RPC submission, retry and receipt polling.

pub mod client;
pub mod metrics;
pub mod retry;
pub mod state;
pub mod transport;
pub mod types;

pub use client::{BundlerClient, BundlerClientConfig, PollConfig};
pub use retry::RetryPolicy;
pub use state::{BundlerRequestState, InvalidTransition};
pub use transport::{BundlerTransport, DEFAULT_REQUEST_TIMEOUT, HttpTransport};
pub use types::{
    BundleTransaction, GasPrice, GasPriceTiers, UserOperationLookup, UserOperationReceipt,
};
