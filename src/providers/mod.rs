//! Providers Module - external data sources
//!
//! Ledger client seam, the JSON-RPC implementation, handle pooling, the
//! known-rugger blocklist and, behind `test-utils`, an in-memory ledger for tests.

pub mod blocklist;
pub mod ledger;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod pool;
pub mod rpc;

pub use blocklist::{Blocklist, BlocklistEntry, InMemoryBlocklist};
pub use ledger::*;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockLedger, TxBuilder};
pub use pool::{HttpConnector, LedgerConnector, RpcPool, SharedConnector};
pub use rpc::RpcProvider;
