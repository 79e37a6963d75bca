//! Shared JSON parsing helpers.
//!
//! Exchanges encode prices as JSON strings (`"30000.5"`) and timestamps as
//! native numbers; these helpers accept either form.

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_str_u64(v: Option<&serde_json::Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Parse a named field on a JSON object as `u64` (string or number).
#[inline]
pub fn parse_u64_field(v: &serde_json::Value, key: &str) -> Option<u64> {
    parse_str_u64(v.get(key))
}
