//! dripboard-evm: JSON-RPC client, log fetcher, event decoder and the
//! synchronization pass.

pub mod builder;
pub mod decoder;
pub mod fetcher;
pub mod rpc;
pub mod sync;

pub use builder::SyncConfigBuilder;
pub use decoder::{DecodeOutcome, EventDecoder};
pub use fetcher::{EvmRpcClient, FetchResult, LogFetcher, RawLog, SourcedLog};
pub use rpc::{HttpRpcClient, TransportError};
pub use sync::SyncEngine;
