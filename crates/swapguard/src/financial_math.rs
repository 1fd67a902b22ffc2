//! Float helpers for USD display values.
//!
//! USD figures are estimates shown next to exact token amounts; they never feed back into a
//! transaction. All `float_arithmetic` / cast lint expects live here so call sites stay clean.

#![expect(
    clippy::cast_precision_loss,
    clippy::float_arithmetic,
    reason = "dedicated float-math module; casts and arithmetic are intentional"
)]

use serde_json::Value;

/// Parse a decimal string to `f64`, treating anything unparseable as zero.
pub fn decimal_str_to_f64(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(0.0_f64)
}

/// A JSON number or numeric string as `f64`; missing or malformed values are zero.
pub fn json_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0_f64),
        Some(Value::String(s)) => decimal_str_to_f64(s),
        _ => 0.0_f64,
    }
}

/// USD value of `amount` whole tokens at `price` per token.
pub fn usd_value(amount: &str, price: f64) -> f64 {
    decimal_str_to_f64(amount) * price
}

pub fn sum_f64(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |a, b| a + b)
}

/// `total / count`, or zero when there is nothing to average.
pub fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0_f64
    } else {
        total / count as f64
    }
}
