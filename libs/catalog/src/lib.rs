//! IBKR Relay Catalog - Operations the remote executor offers
//!
//! Maps agent-facing tool names to the executor's wire operations,
//! validates arguments before anything is sent, and checks results
//! against the shape each operation promises. [`RelayClient`] puts this
//! in front of a [`ibkr_relay_fabric::Dispatcher`].

pub mod arguments;
pub mod client;
pub mod operation;
pub mod results;

pub use arguments::{build_request, OperationRequest, SymbolSpec};
pub use client::RelayClient;
pub use operation::{Operation, Parameter};
pub use results::{
    validate_response, ContractDetail, Dataset, HealthReport, OhlcvBar, OperationResult, Position,
    StoredArtifact, SymbolMatch,
};
