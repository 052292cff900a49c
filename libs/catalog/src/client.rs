use std::collections::BTreeMap;
use std::time::Duration;

use ibkr_relay_core::{CallError, CallResult};
use ibkr_relay_fabric::codec::{Codec, JsonCodec};
use ibkr_relay_fabric::Dispatcher;
use serde_json::{json, Value};
use tracing::debug;

use crate::arguments::{build_request, OperationRequest, SymbolSpec};
use crate::operation::Operation;
use crate::results::{
    validate_response, ContractDetail, Dataset, HealthReport, OhlcvBar, OperationResult, Position,
    SymbolMatch,
};

/// Typed entry point for the executor's operations
///
/// Arguments are validated before anything is sent, and results are
/// checked against the shape each operation promises.
pub struct RelayClient<C = JsonCodec> {
    dispatcher: Dispatcher<C>,
    timeout: Option<Duration>,
}

impl<C: Codec> RelayClient<C> {
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self {
            dispatcher,
            timeout: None,
        }
    }

    /// Use one timeout for every operation instead of the catalog defaults
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn timeout_for(&self, operation: Operation) -> Duration {
        self.timeout.unwrap_or_else(|| operation.default_timeout())
    }

    /// Invoke an operation by tool (or wire) name with JSON arguments
    pub async fn call(&self, name: &str, arguments: &Value) -> CallResult<OperationResult> {
        let request = build_request(name, arguments)?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: OperationRequest) -> CallResult<OperationResult> {
        let OperationRequest { operation, payload } = request;
        let timeout = self.timeout_for(operation);
        debug!(
            operation = %operation,
            timeout_secs = timeout.as_secs(),
            "Dispatching operation"
        );

        let result = self
            .dispatcher
            .call(operation.wire_name(), payload, timeout)
            .await
            .map_err(|e| rename_operation(e, operation))?;
        validate_response(operation, result)
    }

    pub async fn health(&self) -> CallResult<HealthReport> {
        let op = Operation::Health;
        expect(op, self.call_op(op, Value::Null).await?.into_health())
    }

    pub async fn account_summary(&self) -> CallResult<Dataset<BTreeMap<String, Value>>> {
        let op = Operation::AccountSummary;
        expect(op, self.call_op(op, Value::Null).await?.into_account_summary())
    }

    pub async fn positions(&self) -> CallResult<Dataset<Vec<Position>>> {
        let op = Operation::Positions;
        expect(op, self.call_op(op, Value::Null).await?.into_positions())
    }

    pub async fn daily_ohlcv(&self) -> CallResult<Dataset<Vec<OhlcvBar>>> {
        let op = Operation::DailyOhlcv;
        expect(op, self.call_op(op, Value::Null).await?.into_bars())
    }

    pub async fn hourly_ohlcv(&self) -> CallResult<Dataset<Vec<OhlcvBar>>> {
        let op = Operation::HourlyOhlcv;
        expect(op, self.call_op(op, Value::Null).await?.into_bars())
    }

    pub async fn contract_details(&self) -> CallResult<Dataset<Vec<ContractDetail>>> {
        let op = Operation::ContractDetails;
        expect(op, self.call_op(op, Value::Null).await?.into_contract_details())
    }

    pub async fn search_symbols(&self, query: &str) -> CallResult<Vec<SymbolMatch>> {
        let op = Operation::SearchSymbols;
        let result = self.call_op(op, json!({ "query": query })).await?;
        expect(op, result.into_symbols())
    }

    pub async fn contract_by_id(&self, contract_id: u64, check_ohlcv: bool) -> CallResult<ContractDetail> {
        let op = Operation::ContractById;
        let arguments = json!({ "contract_id": contract_id, "check_ohlcv": check_ohlcv });
        expect(op, self.call_op(op, arguments).await?.into_contract())
    }

    /// OHLCV bars for arbitrary instruments
    ///
    /// `duration` and `bar_size` fall back to `7 D` and `1 day`.
    pub async fn custom_ohlcv(
        &self,
        symbols: &[SymbolSpec],
        duration: Option<&str>,
        bar_size: Option<&str>,
    ) -> CallResult<Dataset<Vec<OhlcvBar>>> {
        let op = Operation::CustomOhlcv;
        let symbols = serde_json::to_value(symbols)
            .map_err(|e| CallError::invalid_arguments(op.tool_name(), e.to_string()))?;

        let mut arguments = json!({ "symbols": symbols });
        if let Some(duration) = duration {
            arguments["duration"] = Value::from(duration);
        }
        if let Some(bar_size) = bar_size {
            arguments["bar_size"] = Value::from(bar_size);
        }
        expect(op, self.call_op(op, arguments).await?.into_bars())
    }

    async fn call_op(&self, operation: Operation, arguments: Value) -> CallResult<OperationResult> {
        self.call(operation.tool_name(), &arguments).await
    }
}

/// Report failures under the tool name the caller used
fn rename_operation(error: CallError, operation: Operation) -> CallError {
    let tool = operation.tool_name().to_string();
    match error {
        CallError::Timeout {
            correlation_id,
            elapsed,
            ..
        } => CallError::Timeout {
            operation: tool,
            correlation_id,
            elapsed,
        },
        CallError::DispatchFailed { reason, .. } => CallError::DispatchFailed {
            operation: tool,
            reason,
        },
        other => other,
    }
}

fn expect<T>(operation: Operation, value: Option<T>) -> CallResult<T> {
    value.ok_or_else(|| {
        CallError::unexpected_shape(operation.tool_name(), "result kind does not match operation")
    })
}
