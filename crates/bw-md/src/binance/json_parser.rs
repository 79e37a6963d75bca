//! Binance kline JSON parser.

use bw_core::{BwError, Candle, CandleSeries};

use crate::json_util::{parse_str_f64, parse_str_u64};

/// Parse one kline row. Returns `None` if any field is missing or malformed.
pub fn parse_kline(row: &serde_json::Value) -> Option<Candle> {
    let arr = row.as_array()?;
    Some(Candle {
        open_time: parse_str_u64(arr.first())?,
        open: parse_str_f64(arr.get(1))?,
        high: parse_str_f64(arr.get(2))?,
        low: parse_str_f64(arr.get(3))?,
        close: parse_str_f64(arr.get(4))?,
        volume: parse_str_f64(arr.get(5))?,
        close_time: parse_str_u64(arr.get(6))?,
    })
}

/// Parse a `/api/v3/klines` response body into an ascending series.
///
/// Fails on the first malformed row, on a bar violating the OHLC invariants,
/// or if rows are not strictly ascending by open time.
pub fn parse_klines(body: &serde_json::Value) -> Result<CandleSeries, BwError> {
    let rows = body
        .as_array()
        .ok_or_else(|| BwError::Parse(format!("klines response is not an array: {body}")))?;

    let mut bars: Vec<Candle> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let bar = parse_kline(row).ok_or_else(|| BwError::Parse(format!("malformed kline row {i}: {row}")))?;
        if !bar.is_valid() {
            return Err(BwError::Parse(format!("kline row {i} violates OHLC invariants: {bar:?}")));
        }
        if let Some(prev) = bars.last() {
            if bar.open_time <= prev.open_time {
                return Err(BwError::Parse(format!("kline row {i} out of order")));
            }
        }
        bars.push(bar);
    }
    Ok(CandleSeries::new(bars))
}
