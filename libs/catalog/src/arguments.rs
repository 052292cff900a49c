//! Request building and argument validation.
//!
//! Everything here runs before the transport is touched: a call that
//! fails validation never consumes a correlation id.

use ibkr_relay_core::{CallError, CallResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::operation::Operation;

pub const DEFAULT_DURATION: &str = "7 D";
pub const DEFAULT_BAR_SIZE: &str = "1 day";
pub const DEFAULT_SEC_TYPE: &str = "STK";

const DURATION_UNITS: [&str; 5] = ["S", "D", "W", "M", "Y"];

/// Bar sizes the terminal serves historical data in
pub const BAR_SIZES: [&str; 21] = [
    "1 secs", "5 secs", "10 secs", "15 secs", "30 secs", "1 min", "2 mins", "3 mins", "5 mins",
    "10 mins", "15 mins", "20 mins", "30 mins", "1 hour", "2 hours", "3 hours", "4 hours",
    "8 hours", "1 day", "1 week", "1 month",
];

/// Validated request, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub operation: Operation,
    /// Arguments under the executor's field names
    pub payload: Map<String, Value>,
}

/// Instrument for a custom OHLCV request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSpec {
    pub symbol: String,
    pub currency: String,
    pub sec_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con_id: Option<u64>,
}

impl SymbolSpec {
    pub fn stock(symbol: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            currency: currency.into(),
            sec_type: DEFAULT_SEC_TYPE.to_string(),
            exchange: None,
            con_id: None,
        }
    }
}

/// Validate arguments for a named operation and build its payload
///
/// `arguments` must be a JSON object or `null`; unknown fields are ignored.
pub fn build_request(operation_name: &str, arguments: &Value) -> CallResult<OperationRequest> {
    let operation = Operation::lookup(operation_name)?;
    let args = Arguments::new(operation, arguments)?;

    let mut payload = Map::new();
    match operation {
        Operation::Health
        | Operation::AccountSummary
        | Operation::Positions
        | Operation::DailyOhlcv
        | Operation::HourlyOhlcv
        | Operation::ContractDetails => {}
        Operation::SearchSymbols => {
            payload.insert("query".to_string(), Value::from(args.required_str("query")?));
        }
        Operation::ContractById => {
            payload.insert(
                "contract_id".to_string(),
                Value::from(args.required_positive_int("contract_id")?),
            );
            payload.insert(
                "check_ohlcv_availability".to_string(),
                Value::from(args.optional_bool("check_ohlcv")?.unwrap_or(false)),
            );
        }
        Operation::CustomOhlcv => {
            let symbols = args.symbols()?;
            let duration = args.optional_str("duration")?.unwrap_or(DEFAULT_DURATION);
            let bar_size = args.optional_str("bar_size")?.unwrap_or(DEFAULT_BAR_SIZE);
            args.check_duration(duration)?;
            args.check_bar_size(bar_size)?;

            let symbols = serde_json::to_value(&symbols)
                .map_err(|e| args.invalid(format!("symbols: {e}")))?;
            payload.insert("symbols".to_string(), symbols);
            payload.insert("duration_str".to_string(), Value::from(duration));
            payload.insert("bar_size_setting".to_string(), Value::from(bar_size));
        }
    }

    Ok(OperationRequest { operation, payload })
}

struct Arguments<'a> {
    operation: Operation,
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    fn new(operation: Operation, arguments: &'a Value) -> CallResult<Self> {
        let fields = match arguments {
            Value::Null => None,
            Value::Object(fields) => Some(fields),
            _ => {
                return Err(CallError::invalid_arguments(
                    operation.tool_name(),
                    "arguments must be an object",
                ))
            }
        };
        Ok(Self { operation, fields })
    }

    fn invalid(&self, reason: impl Into<String>) -> CallError {
        CallError::invalid_arguments(self.operation.tool_name(), reason)
    }

    /// Present, non-null field
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields
            .and_then(|fields| fields.get(name))
            .filter(|value| !value.is_null())
    }

    fn optional_str(&self, name: &str) -> CallResult<Option<&'a str>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim())),
            Some(Value::String(_)) => Err(self.invalid(format!("{name} must not be empty"))),
            Some(_) => Err(self.invalid(format!("{name} must be a string"))),
        }
    }

    fn required_str(&self, name: &str) -> CallResult<&'a str> {
        self.optional_str(name)?
            .ok_or_else(|| self.invalid(format!("{name} is required")))
    }

    fn optional_bool(&self, name: &str) -> CallResult<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(format!("{name} must be a boolean"))),
        }
    }

    fn required_positive_int(&self, name: &str) -> CallResult<u64> {
        let value = self
            .get(name)
            .ok_or_else(|| self.invalid(format!("{name} is required")))?;
        positive_int(value).ok_or_else(|| self.invalid(format!("{name} must be a positive integer")))
    }

    fn symbols(&self) -> CallResult<Vec<SymbolSpec>> {
        let items = match self.get("symbols") {
            None => return Err(self.invalid("symbols is required")),
            Some(Value::Array(items)) if items.is_empty() => {
                return Err(self.invalid("symbols must not be empty"))
            }
            Some(Value::Array(items)) => items,
            Some(_) => return Err(self.invalid("symbols must be an array")),
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.symbol_spec(index, item))
            .collect()
    }

    fn symbol_spec(&self, index: usize, item: &Value) -> CallResult<SymbolSpec> {
        let Value::Object(fields) = item else {
            return Err(self.invalid(format!("symbols[{index}] must be an object")));
        };
        let text = |name: &str, required: bool| -> CallResult<Option<String>> {
            match fields.get(name) {
                None | Some(Value::Null) if required => {
                    Err(self.invalid(format!("symbols[{index}].{name} is required")))
                }
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
                Some(_) => Err(self.invalid(format!(
                    "symbols[{index}].{name} must be a non-empty string"
                ))),
            }
        };

        let con_id = match fields.get("conId") {
            None | Some(Value::Null) => None,
            Some(value) => Some(positive_int(value).ok_or_else(|| {
                self.invalid(format!("symbols[{index}].conId must be a positive integer"))
            })?),
        };

        Ok(SymbolSpec {
            symbol: text("symbol", true)?.unwrap_or_default(),
            currency: text("currency", true)?.unwrap_or_default(),
            sec_type: text("secType", false)?.unwrap_or_else(|| DEFAULT_SEC_TYPE.to_string()),
            exchange: text("exchange", false)?,
            con_id,
        })
    }

    /// `<count> <unit>`, e.g. `7 D` or `1 Y`
    fn check_duration(&self, duration: &str) -> CallResult<()> {
        let mut parts = duration.split_whitespace();
        let valid = match (parts.next(), parts.next(), parts.next()) {
            (Some(count), Some(unit), None) => {
                count.parse::<u32>().is_ok_and(|n| n > 0) && DURATION_UNITS.contains(&unit)
            }
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(self.invalid(format!(
                "duration {duration:?} must look like '7 D' (units S, D, W, M, Y)"
            )))
        }
    }

    fn check_bar_size(&self, bar_size: &str) -> CallResult<()> {
        if BAR_SIZES.contains(&bar_size) {
            Ok(())
        } else {
            Err(self.invalid(format!("bar_size {bar_size:?} is not a supported bar size")))
        }
    }
}

fn positive_int(value: &Value) -> Option<u64> {
    value.as_u64().filter(|n| *n > 0)
}
