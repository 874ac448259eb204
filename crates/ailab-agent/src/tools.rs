//! Built-in demonstration tools.
//!
//! [`DemoToolkit`] exposes a fake weather lookup and three pricing tools
//! meant to be chained (price with tax, exchange rate, conversion).  When
//! given an [`ExecutionState`], each tool records what it did there.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::llm::types::ToolDefinition;
use crate::runtime::ToolAdapter;
use crate::state::ExecutionState;

pub const GET_WEATHER: &str = "get_weather";
pub const CALCULATE_PRICE: &str = "calculate_price";
pub const GET_EXCHANGE_RATE: &str = "get_exchange_rate";
pub const CONVERT_CURRENCY: &str = "convert_currency";

/// Offline tool adapter with deterministic answers.
#[derive(Debug, Clone, Default)]
pub struct DemoToolkit {
    state: Option<ExecutionState>,
}

impl DemoToolkit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every tool step into `state`.
    pub fn with_state(state: ExecutionState) -> Self {
        Self { state: Some(state) }
    }

    fn log(&self, message: &str, data: Value) {
        if let Some(state) = &self.state {
            state.log(message, Some(data));
        }
    }

    fn set(&self, key: &str, value: Value) {
        if let Some(state) = &self.state {
            state.set(key, value);
        }
    }

    fn weather(&self, args: &Value) -> Result<Value> {
        let location = str_arg(GET_WEATHER, args, "location")?;
        self.log("weather lookup", json!({ "location": location }));
        Ok(json!({
            "location": location,
            "temperature": 72,
            "unit": "F",
            "description": "Sunny",
        }))
    }

    fn price(&self, args: &Value) -> Result<Value> {
        let price = num_arg(CALCULATE_PRICE, args, "price")?;
        let tax_rate = num_arg(CALCULATE_PRICE, args, "taxRate")?;
        self.log("calculating price", json!({ "price": price, "taxRate": tax_rate }));

        let total = round2(price * (1.0 + tax_rate));
        self.set("taxedPrice", json!(total));
        self.set("currency", json!("USD"));
        Ok(json!({
            "total": total,
            "currency": "USD",
            "calculation": format!("{price} * (1 + {tax_rate}) = {total:.2}"),
        }))
    }

    fn exchange_rate(&self, args: &Value) -> Result<Value> {
        let from = str_arg(GET_EXCHANGE_RATE, args, "from")?;
        let to = str_arg(GET_EXCHANGE_RATE, args, "to")?;
        if self.state.as_ref().is_some_and(|s| s.get("taxedPrice").is_none()) {
            self.log("exchange rate requested before a price was calculated", json!({}));
        }

        let rate = rate_for(from, to);
        self.set("exchangeRate", json!(rate));
        Ok(json!({ "rate": rate, "pair": format!("{from}/{to}") }))
    }

    fn convert(&self, args: &Value) -> Result<Value> {
        let amount = num_arg(CONVERT_CURRENCY, args, "amount")?;
        let to = args.get("to").and_then(Value::as_str).unwrap_or("CNY");
        let rate = match args.get("rate").and_then(Value::as_f64) {
            Some(rate) => rate,
            None => self
                .state
                .as_ref()
                .and_then(|s| s.get("exchangeRate"))
                .and_then(|v| v.as_f64())
                .unwrap_or_else(|| {
                    let from = args.get("from").and_then(Value::as_str).unwrap_or("USD");
                    rate_for(from, to)
                }),
        };

        let converted = round2(amount * rate);
        self.set("finalAmount", json!(converted));
        self.set("finalCurrency", json!(to));
        Ok(json!({
            "converted": converted,
            "currency": to,
            "rate": rate,
            "calculation": format!("{amount} * {rate} = {converted:.2}"),
        }))
    }
}

#[async_trait]
impl ToolAdapter for DemoToolkit {
    fn adapter_id(&self) -> &str {
        "demo"
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: GET_WEATHER.into(),
                description: "Get the current weather for a location".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "location": {"type": "string", "description": "City name"}
                    },
                    "required": ["location"]
                }),
            },
            ToolDefinition {
                name: CALCULATE_PRICE.into(),
                description: "Calculate total price including tax".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "price": {"type": "number", "description": "Original price"},
                        "taxRate": {"type": "number", "description": "Tax rate as decimal, e.g. 0.1 for 10%"}
                    },
                    "required": ["price", "taxRate"]
                }),
            },
            ToolDefinition {
                name: GET_EXCHANGE_RATE.into(),
                description: "Get the exchange rate between two currency codes".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "from": {"type": "string", "description": "Source currency, e.g. USD"},
                        "to": {"type": "string", "description": "Target currency, e.g. CNY"}
                    },
                    "required": ["from", "to"]
                }),
            },
            ToolDefinition {
                name: CONVERT_CURRENCY.into(),
                description: "Convert an amount with an exchange rate".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "amount": {"type": "number"},
                        "rate": {"type": "number"},
                        "from": {"type": "string"},
                        "to": {"type": "string"}
                    },
                    "required": ["amount"]
                }),
            },
        ]
    }

    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String> {
        debug!(tool = tool_name, %arguments, "demo tool called");
        let result = match tool_name {
            GET_WEATHER => self.weather(&arguments)?,
            CALCULATE_PRICE => self.price(&arguments)?,
            GET_EXCHANGE_RATE => self.exchange_rate(&arguments)?,
            CONVERT_CURRENCY => self.convert(&arguments)?,
            other => {
                return Err(AgentError::UnknownTool {
                    tool_name: other.to_string(),
                });
            }
        };
        Ok(result.to_string())
    }
}

fn rate_for(from: &str, to: &str) -> f64 {
    if from == "USD" && to == "CNY" { 7.2 } else { 1.0 }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ToolExecutionFailed {
            tool_name: tool.to_string(),
            reason: format!("missing string argument `{key}`"),
        })
}

fn num_arg(tool: &str, args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::ToolExecutionFailed {
            tool_name: tool.to_string(),
            reason: format!("missing numeric argument `{key}`"),
        })
}
