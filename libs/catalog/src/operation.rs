use std::fmt;
use std::time::Duration;

use ibkr_relay_core::{CallError, CallResult};

/// Every operation the remote executor understands
///
/// All of them only read terminal state, so re-issuing one after an
/// unknown outcome is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    AccountSummary,
    Positions,
    DailyOhlcv,
    HourlyOhlcv,
    ContractDetails,
    SearchSymbols,
    ContractById,
    CustomOhlcv,
}

/// Argument accepted by an operation, for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const QUERY: Parameter = Parameter {
    name: "query",
    kind: "string",
    required: true,
    description: "Search query (e.g. 'AAPL', 'Apple', 'TSLA')",
};

const CONTRACT_ID: Parameter = Parameter {
    name: "contract_id",
    kind: "integer",
    required: true,
    description: "IBKR contract ID (conId)",
};

const CHECK_OHLCV: Parameter = Parameter {
    name: "check_ohlcv",
    kind: "boolean",
    required: false,
    description: "Also verify OHLCV data availability (default false)",
};

const SYMBOLS: Parameter = Parameter {
    name: "symbols",
    kind: "array",
    required: true,
    description: "Symbol specs: {symbol, currency, secType?, exchange?, conId?}",
};

const DURATION: Parameter = Parameter {
    name: "duration",
    kind: "string",
    required: false,
    description: "Duration string such as '7 D', '1 M', '1 Y' (default '7 D')",
};

const BAR_SIZE: Parameter = Parameter {
    name: "bar_size",
    kind: "string",
    required: false,
    description: "Bar size such as '1 day', '1 hour', '5 mins' (default '1 day')",
};

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Health,
        Operation::AccountSummary,
        Operation::Positions,
        Operation::DailyOhlcv,
        Operation::HourlyOhlcv,
        Operation::ContractDetails,
        Operation::SearchSymbols,
        Operation::ContractById,
        Operation::CustomOhlcv,
    ];

    /// Name exposed to the calling agent
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Health => "ibkr_health",
            Self::AccountSummary => "ibkr_account_summary",
            Self::Positions => "ibkr_positions",
            Self::DailyOhlcv => "ibkr_daily_ohlcv",
            Self::HourlyOhlcv => "ibkr_hourly_ohlcv",
            Self::ContractDetails => "ibkr_contract_details",
            Self::SearchSymbols => "ibkr_search_symbols",
            Self::ContractById => "ibkr_contract_by_id",
            Self::CustomOhlcv => "ibkr_custom_ohlcv",
        }
    }

    /// Name the remote executor dispatches on
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Health => "tws_health",
            Self::AccountSummary => "account_values",
            Self::Positions => "raw_positions",
            Self::DailyOhlcv => "daily_ohlcv",
            Self::HourlyOhlcv => "hourly_ohlcv",
            Self::ContractDetails => "contract_details",
            Self::SearchSymbols => "find_symbols",
            Self::ContractById => "get_contract_details_by_id",
            Self::CustomOhlcv => "ohlcv",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Health => "Check the TWS connection: status, server time and ping latency",
            Self::AccountSummary => "Account values including balances, buying power and P&L",
            Self::Positions => "Current portfolio positions with quantities and average costs",
            Self::DailyOhlcv => "Daily OHLCV bars for all tracked symbols",
            Self::HourlyOhlcv => "Hourly OHLCV bars for all tracked symbols",
            Self::ContractDetails => "Contract details for all tracked symbols",
            Self::SearchSymbols => "Search contracts matching a query string",
            Self::ContractById => "Contract details for one IBKR contract ID",
            Self::CustomOhlcv => "OHLCV bars for arbitrary symbols",
        }
    }

    pub fn parameters(self) -> &'static [Parameter] {
        match self {
            Self::SearchSymbols => &[QUERY],
            Self::ContractById => &[CONTRACT_ID, CHECK_OHLCV],
            Self::CustomOhlcv => &[SYMBOLS, DURATION, BAR_SIZE],
            _ => &[],
        }
    }

    /// How long a call waits for the executor before giving up
    ///
    /// Bulk history requests are paced by the terminal and take far
    /// longer than lookups.
    pub fn default_timeout(self) -> Duration {
        let minutes = match self {
            Self::Health | Self::SearchSymbols | Self::ContractById => 2,
            Self::AccountSummary | Self::Positions => 5,
            Self::DailyOhlcv | Self::HourlyOhlcv | Self::ContractDetails | Self::CustomOhlcv => 20,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Resolve a tool name, or a wire name
    pub fn lookup(name: &str) -> CallResult<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.tool_name() == name || op.wire_name() == name)
            .ok_or_else(|| CallError::UnknownOperation(name.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}
