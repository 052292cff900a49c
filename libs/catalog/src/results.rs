//! Typed results and response-shape validation.

use std::collections::BTreeMap;

use ibkr_relay_core::{CallError, CallResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operation::Operation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
    #[serde(default, alias = "ping_ms", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

/// Dataset the executor uploaded instead of returning inline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    #[serde(alias = "s3_uri")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// Bulk result, either inline or as a pointer to where it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dataset<T> {
    Stored(StoredArtifact),
    Inline(T),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position: f64,
    #[serde(default, alias = "avg_cost", skip_serializing_if = "Option::is_none")]
    pub avg_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub symbol: String,
    #[serde(alias = "timestamp")]
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub symbol: String,
    pub con_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetail {
    pub con_id: i64,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, alias = "ohlcv_available", skip_serializing_if = "Option::is_none")]
    pub ohlcv_available: Option<bool>,
}

/// Validated result of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    Health(HealthReport),
    AccountSummary(Dataset<BTreeMap<String, Value>>),
    Positions(Dataset<Vec<Position>>),
    Bars(Dataset<Vec<OhlcvBar>>),
    ContractDetails(Dataset<Vec<ContractDetail>>),
    Symbols(Vec<SymbolMatch>),
    Contract(ContractDetail),
}

/// Check a remote result against what the operation promises
pub fn validate_response(operation: Operation, result: Value) -> CallResult<OperationResult> {
    let typed = match operation {
        Operation::Health => OperationResult::Health(parse(operation, result)?),
        Operation::AccountSummary => OperationResult::AccountSummary(parse(operation, result)?),
        Operation::Positions => OperationResult::Positions(parse(operation, result)?),
        Operation::DailyOhlcv | Operation::HourlyOhlcv | Operation::CustomOhlcv => {
            OperationResult::Bars(parse(operation, result)?)
        }
        Operation::ContractDetails => OperationResult::ContractDetails(parse(operation, result)?),
        Operation::SearchSymbols => OperationResult::Symbols(parse(operation, result)?),
        Operation::ContractById => OperationResult::Contract(parse(operation, result)?),
    };
    Ok(typed)
}

fn parse<T: DeserializeOwned>(operation: Operation, result: Value) -> CallResult<T> {
    if result.is_null() {
        return Err(CallError::unexpected_shape(operation.tool_name(), "result is missing"));
    }
    serde_json::from_value(result)
        .map_err(|e| CallError::unexpected_shape(operation.tool_name(), e.to_string()))
}

/// Accessors used by the typed client helpers
impl OperationResult {
    pub fn into_health(self) -> Option<HealthReport> {
        match self {
            Self::Health(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_account_summary(self) -> Option<Dataset<BTreeMap<String, Value>>> {
        match self {
            Self::AccountSummary(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn into_positions(self) -> Option<Dataset<Vec<Position>>> {
        match self {
            Self::Positions(positions) => Some(positions),
            _ => None,
        }
    }

    pub fn into_bars(self) -> Option<Dataset<Vec<OhlcvBar>>> {
        match self {
            Self::Bars(bars) => Some(bars),
            _ => None,
        }
    }

    pub fn into_contract_details(self) -> Option<Dataset<Vec<ContractDetail>>> {
        match self {
            Self::ContractDetails(details) => Some(details),
            _ => None,
        }
    }

    pub fn into_symbols(self) -> Option<Vec<SymbolMatch>> {
        match self {
            Self::Symbols(matches) => Some(matches),
            _ => None,
        }
    }

    pub fn into_contract(self) -> Option<ContractDetail> {
        match self {
            Self::Contract(detail) => Some(detail),
            _ => None,
        }
    }
}
