//! Candle message parsing and close detection.
//!
//! Kept free of I/O so the dedup rules can be driven directly from tests.
//! Per symbol the aggregator tracks the in-progress candle and the open
//! time of the last candle it reported closed. A final row at or before
//! that marker is a replay and only produces an update.

use crate::error::FeedError;
use chrono::{DateTime, Utc};
use momentum_core::{Bar, CandleEvent, CloseDetection};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct WsMessage {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    arg: Option<WsArg>,
    #[serde(default)]
    data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsArg {
    #[serde(default)]
    channel: Option<String>,
    #[serde(rename = "instId", default)]
    inst_id: Option<String>,
}

/// One parsed candle row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleRow {
    pub bar: Bar,
    /// `None` when the row has no confirm column.
    pub confirmed: Option<bool>,
}

impl CandleRow {
    /// Parses `[openTimeMs, open, high, low, close, volume, ...]` with
    /// numbers given as strings or JSON numbers.
    ///
    /// # Errors
    /// Returns `InvalidRow` if the row is too short or a price is not a
    /// finite number. A missing or unparsable volume is read as zero.
    pub fn parse(row: &[Value], confirm_index: usize) -> Result<Self, FeedError> {
        if row.len() < 5 {
            return Err(FeedError::InvalidRow(format!("expected >= 5 columns, got {}", row.len())));
        }
        let ts = number(&row[0])
            .filter(|v| *v >= 0.0)
            .ok_or_else(|| FeedError::InvalidRow(format!("bad open time: {}", row[0])))?;
        #[allow(clippy::cast_possible_truncation)]
        let open_time = DateTime::<Utc>::from_timestamp_millis(ts as i64)
            .ok_or_else(|| FeedError::InvalidRow(format!("open time out of range: {ts}")))?;

        let price = |i: usize, name: &str| {
            number(&row[i])
                .filter(|v| v.is_finite())
                .ok_or_else(|| FeedError::InvalidRow(format!("bad {name}: {}", row[i])))
        };
        let bar = Bar {
            open_time,
            open: price(1, "open")?,
            high: price(2, "high")?,
            low: price(3, "low")?,
            close: price(4, "close")?,
            volume: row.get(5).and_then(number).unwrap_or(0.0),
        };
        let confirmed = row.get(confirm_index).map(truthy);

        Ok(Self { bar, confirmed })
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

#[derive(Debug, Default, Clone)]
struct SymbolState {
    in_progress: Option<Bar>,
    last_closed: Option<DateTime<Utc>>,
}

impl SymbolState {
    fn is_replay(&self, open_time: DateTime<Utc>) -> bool {
        self.last_closed.is_some_and(|m| open_time <= m)
    }
}

/// Turns raw feed messages into [`CandleEvent`]s.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    granularity: String,
    detection: CloseDetection,
    confirm_index: usize,
    symbols: HashMap<String, SymbolState>,
}

impl CandleAggregator {
    #[must_use]
    pub fn new(granularity: impl Into<String>, detection: CloseDetection, confirm_index: usize) -> Self {
        Self {
            granularity: granularity.into(),
            detection,
            confirm_index,
            symbols: HashMap::new(),
        }
    }

    /// Open time of the last candle reported closed for `symbol`.
    #[must_use]
    pub fn last_closed(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.symbols.get(symbol).and_then(|s| s.last_closed)
    }

    /// Handles one text frame.
    ///
    /// Non-candle messages yield no events. Malformed rows are skipped
    /// individually.
    ///
    /// # Errors
    /// Returns `Parse` for invalid JSON and `Subscribe` for an error event.
    pub fn handle_text(&mut self, text: &str) -> Result<Vec<CandleEvent>, FeedError> {
        let msg: WsMessage = serde_json::from_str(text)?;

        if let Some(event) = msg.event.as_deref() {
            if event == "error" {
                let code = msg.code.map(|c| c.to_string()).unwrap_or_default();
                return Err(FeedError::Subscribe(format!(
                    "{code} {}",
                    msg.msg.unwrap_or_default()
                )));
            }
            debug!(event, "feed control message");
            return Ok(Vec::new());
        }

        let (Some(arg), Some(data)) = (msg.arg, msg.data) else {
            return Ok(Vec::new());
        };
        let (Some(channel), Some(symbol)) = (arg.channel, arg.inst_id) else {
            return Ok(Vec::new());
        };
        if !channel.starts_with("candle") || data.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows: Vec<CandleRow> = data
            .iter()
            .filter_map(|raw| match CandleRow::parse(raw, self.confirm_index) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "skipping candle row");
                    None
                }
            })
            .collect();
        rows.sort_by_key(|r| r.bar.open_time);

        let snapshot = msg.action.as_deref() == Some("snapshot");
        Ok(self.apply_rows(&symbol, &rows, snapshot))
    }

    /// Applies rows of one message, ascending by open time.
    ///
    /// The first snapshot for a symbol primes the marker instead of
    /// reporting every historical candle as closed: all rows but the last
    /// become updates and the last one is processed normally.
    pub fn apply_rows(&mut self, symbol: &str, rows: &[CandleRow], snapshot: bool) -> Vec<CandleEvent> {
        let mut events = Vec::with_capacity(rows.len() + 1);
        let state = self.symbols.entry(symbol.to_string()).or_default();

        let mut rest = rows;
        if snapshot && state.last_closed.is_none() && rows.len() > 1 {
            let (history, last) = rows.split_at(rows.len() - 1);
            for row in history {
                events.push(self.update(symbol, row.bar));
            }
            if let Some(state) = self.symbols.get_mut(symbol) {
                state.last_closed = history.last().map(|r| r.bar.open_time);
            }
            debug!(symbol, primed = history.len(), "feed snapshot primed");
            rest = last;
        }

        for row in rest {
            self.apply_row(symbol, *row, &mut events);
        }
        events
    }

    fn apply_row(&mut self, symbol: &str, row: CandleRow, events: &mut Vec<CandleEvent>) {
        let is_final = match self.detection {
            CloseDetection::ConfirmFlag => row.confirmed,
            CloseDetection::Rollover => None,
        };
        let state = self.symbols.entry(symbol.to_string()).or_default();

        match is_final {
            Some(true) => {
                let bar = match state.in_progress {
                    Some(cur) if cur.open_time == row.bar.open_time => {
                        state.in_progress = None;
                        merge(cur, row.bar)
                    }
                    _ => row.bar,
                };
                if state.is_replay(bar.open_time) {
                    events.push(self.update(symbol, bar));
                } else {
                    state.last_closed = Some(bar.open_time);
                    events.push(self.closed(symbol, bar));
                }
            }
            Some(false) => {
                let bar = match state.in_progress {
                    Some(cur) if cur.open_time == row.bar.open_time => merge(cur, row.bar),
                    _ => row.bar,
                };
                if !state.is_replay(bar.open_time) {
                    state.in_progress = Some(bar);
                }
                events.push(self.update(symbol, bar));
            }
            None => match state.in_progress {
                Some(cur) if row.bar.open_time > cur.open_time => {
                    let prior_replayed = state.is_replay(cur.open_time);
                    state.in_progress = Some(row.bar);
                    if !prior_replayed {
                        state.last_closed = Some(cur.open_time);
                        events.push(self.closed(symbol, cur));
                    }
                    events.push(self.update(symbol, row.bar));
                }
                Some(cur) if row.bar.open_time == cur.open_time => {
                    let bar = merge(cur, row.bar);
                    state.in_progress = Some(bar);
                    events.push(self.update(symbol, bar));
                }
                Some(_) => events.push(self.update(symbol, row.bar)),
                None => {
                    if !state.is_replay(row.bar.open_time) {
                        state.in_progress = Some(row.bar);
                    }
                    events.push(self.update(symbol, row.bar));
                }
            },
        }
    }

    fn update(&self, symbol: &str, bar: Bar) -> CandleEvent {
        CandleEvent::Update {
            symbol: symbol.to_string(),
            granularity: self.granularity.clone(),
            bar,
        }
    }

    fn closed(&self, symbol: &str, bar: Bar) -> CandleEvent {
        debug!(symbol, open_time = %bar.open_time, close = bar.close, "candle closed");
        CandleEvent::Closed {
            symbol: symbol.to_string(),
            granularity: self.granularity.clone(),
            bar,
        }
    }
}

/// Folds a newer snapshot of the same candle into the aggregate.
fn merge(cur: Bar, next: Bar) -> Bar {
    Bar {
        open_time: cur.open_time,
        open: cur.open,
        high: cur.high.max(next.high),
        low: cur.low.min(next.low),
        close: next.close,
        volume: next.volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T0: i64 = 1_767_225_600_000;
    const FIVE_MIN: i64 = 300_000;

    fn row(i: i64, close: f64, confirm: Option<&str>) -> Vec<Value> {
        let mut r = vec![
            json!((T0 + i * FIVE_MIN).to_string()),
            json!("100"),
            json!((close + 1.0).to_string()),
            json!((close - 1.0).to_string()),
            json!(close.to_string()),
            json!("12.5"),
            json!("1250"),
            json!("1250"),
        ];
        if let Some(c) = confirm {
            r.push(json!(c));
        }
        r
    }

    fn message(action: &str, rows: Vec<Vec<Value>>) -> String {
        json!({
            "action": action,
            "arg": {"instType": "USDT-FUTURES", "channel": "candle5m", "instId": "BTCUSDT"},
            "data": rows,
            "ts": T0
        })
        .to_string()
    }

    fn kinds(events: &[CandleEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| if e.is_closed() { "closed" } else { "update" })
            .collect()
    }

    // ==================== Row Parsing Tests ====================

    #[test]
    fn test_parse_row_with_string_numbers() {
        let parsed = CandleRow::parse(&row(0, 101.5, Some("1")), 8).unwrap();
        assert_eq!(parsed.bar.open_time.timestamp_millis(), T0);
        assert_eq!(parsed.bar.close, 101.5);
        assert_eq!(parsed.bar.high, 102.5);
        assert_eq!(parsed.bar.volume, 12.5);
        assert_eq!(parsed.confirmed, Some(true));
    }

    #[test]
    fn test_parse_row_without_confirm_column() {
        let parsed = CandleRow::parse(&row(0, 101.5, None), 8).unwrap();
        assert_eq!(parsed.confirmed, None);
    }

    #[test]
    fn test_parse_row_rejects_bad_close() {
        let mut r = row(0, 101.5, None);
        r[4] = json!("abc");
        assert!(matches!(CandleRow::parse(&r, 8), Err(FeedError::InvalidRow(_))));
        assert!(CandleRow::parse(&r[..3], 8).is_err());
    }

    #[test]
    fn test_parse_row_accepts_json_numbers() {
        let r = vec![json!(T0), json!(1.0), json!(2.0), json!(0.5), json!(1.5)];
        let parsed = CandleRow::parse(&r, 8).unwrap();
        assert_eq!(parsed.bar.close, 1.5);
        assert_eq!(parsed.bar.volume, 0.0);
    }

    // ==================== Confirm Flag Tests ====================

    #[test]
    fn test_confirmed_row_emits_closed_once() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        let events = agg
            .handle_text(&message("update", vec![row(0, 101.0, Some("0"))]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["update"]);

        let events = agg
            .handle_text(&message("update", vec![row(0, 102.0, Some("1"))]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["closed"]);
        assert_eq!(events[0].bar().close, 102.0);
        assert_eq!(events[0].symbol(), "BTCUSDT");

        let replay = agg
            .handle_text(&message("update", vec![row(0, 102.0, Some("1"))]))
            .unwrap();
        assert_eq!(kinds(&replay), vec!["update"]);
    }

    #[test]
    fn test_replay_older_than_marker_is_update_only() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        agg.handle_text(&message("update", vec![row(5, 101.0, Some("1"))]))
            .unwrap();
        let events = agg
            .handle_text(&message("update", vec![row(3, 99.0, Some("1"))]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["update"]);
        assert_eq!(
            agg.last_closed("BTCUSDT").unwrap().timestamp_millis(),
            T0 + 5 * FIVE_MIN
        );
    }

    #[test]
    fn test_in_progress_rows_merge() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        agg.handle_text(&message("update", vec![row(0, 105.0, Some("0"))]))
            .unwrap();
        let events = agg
            .handle_text(&message("update", vec![row(0, 95.0, Some("0"))]))
            .unwrap();
        let bar = events[0].bar();
        assert_eq!(bar.high, 106.0);
        assert_eq!(bar.low, 94.0);
        assert_eq!(bar.close, 95.0);

        let closed = agg
            .handle_text(&message("update", vec![row(0, 100.0, Some("1"))]))
            .unwrap();
        assert_eq!(closed[0].bar().high, 106.0);
        assert_eq!(closed[0].bar().low, 94.0);
    }

    #[test]
    fn test_confirm_mode_without_flag_falls_back_to_rollover() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        agg.handle_text(&message("update", vec![row(0, 101.0, None)]))
            .unwrap();
        let events = agg
            .handle_text(&message("update", vec![row(1, 102.0, None)]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["closed", "update"]);
    }

    // ==================== Rollover Tests ====================

    #[test]
    fn test_rollover_closes_previous_candle() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::Rollover, 8);
        agg.handle_text(&message("update", vec![row(0, 101.0, None)]))
            .unwrap();
        agg.handle_text(&message("update", vec![row(0, 103.0, None)]))
            .unwrap();
        let events = agg
            .handle_text(&message("update", vec![row(1, 104.0, None)]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["closed", "update"]);
        assert_eq!(events[0].bar().open_time.timestamp_millis(), T0);
        assert_eq!(events[0].bar().close, 103.0);
        assert_eq!(events[1].bar().close, 104.0);
    }

    #[test]
    fn test_rollover_ignores_confirm_column() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::Rollover, 8);
        let events = agg
            .handle_text(&message("update", vec![row(0, 101.0, Some("1"))]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["update"]);
    }

    // ==================== Snapshot Tests ====================

    #[test]
    fn test_first_snapshot_primes_marker() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::Rollover, 8);
        let rows = (0..5).map(|i| row(i, 100.0 + i as f64, None)).collect();
        let events = agg.handle_text(&message("snapshot", rows)).unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| !e.is_closed()));
        assert_eq!(
            agg.last_closed("BTCUSDT").unwrap().timestamp_millis(),
            T0 + 3 * FIVE_MIN
        );

        let next = agg
            .handle_text(&message("update", vec![row(5, 110.0, None)]))
            .unwrap();
        assert_eq!(kinds(&next), vec!["closed", "update"]);
        assert_eq!(next[0].bar().open_time.timestamp_millis(), T0 + 4 * FIVE_MIN);
    }

    #[test]
    fn test_reconnect_snapshot_only_closes_new_candles() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        let first = (0..3).map(|i| row(i, 100.0, Some("1"))).collect();
        agg.handle_text(&message("snapshot", first)).unwrap();
        assert_eq!(
            agg.last_closed("BTCUSDT").unwrap().timestamp_millis(),
            T0 + 2 * FIVE_MIN
        );

        let second = (1..5).map(|i| row(i, 100.0, Some("1"))).collect();
        let events = agg.handle_text(&message("snapshot", second)).unwrap();
        assert_eq!(kinds(&events), vec!["update", "update", "closed", "closed"]);
    }

    // ==================== Control Message Tests ====================

    #[test]
    fn test_control_and_foreign_messages_yield_nothing() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        let sub = json!({"event": "subscribe", "arg": {"channel": "candle5m", "instId": "BTCUSDT"}});
        assert!(agg.handle_text(&sub.to_string()).unwrap().is_empty());

        let ticker = json!({"arg": {"channel": "ticker", "instId": "BTCUSDT"}, "data": [["1"]]});
        assert!(agg.handle_text(&ticker.to_string()).unwrap().is_empty());

        assert!(matches!(agg.handle_text("not json"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_error_event_is_reported() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        let err = json!({"event": "error", "code": 30001, "msg": "instId doesn't exist"});
        assert!(matches!(
            agg.handle_text(&err.to_string()),
            Err(FeedError::Subscribe(_))
        ));
    }

    #[test]
    fn test_bad_row_is_skipped_not_fatal() {
        let mut agg = CandleAggregator::new("5m", CloseDetection::ConfirmFlag, 8);
        let mut bad = row(0, 100.0, Some("1"));
        bad[4] = json!("NaN?");
        let events = agg
            .handle_text(&message("update", vec![bad, row(1, 101.0, Some("1"))]))
            .unwrap();
        assert_eq!(kinds(&events), vec!["closed"]);
        assert_eq!(events[0].bar().close, 101.0);
    }
}
