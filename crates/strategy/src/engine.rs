//! EMA/RSI/ATR momentum signal evaluation.
//!
//! [`StrategyEngine::evaluate`] is a pure function of the bar history and
//! the effective configuration. Besides the optional signal it returns
//! every condition it tested, so that accepted and rejected decisions can
//! both be explained later.

use crate::indicators::{atr, ema, rsi};
use crate::resolver::EffectiveConfig;
use momentum_core::{Bar, Side, TpLevel, TpTemplateEntry};
use serde::{Deserialize, Serialize};

/// Tolerance used when the configured EMA touch tolerance is not positive.
const DEFAULT_EMA_TOLERANCE: f64 = 0.0025;

/// One audited condition of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCheck {
    pub side: Side,
    pub condition_name: String,
    pub expected_value: String,
    pub actual_value: String,
    pub passed: bool,
}

/// Indicator values at the evaluated bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub close_price: f64,
    pub rsi_value: f64,
    pub atr_value: f64,
    pub ema_fast_value: f64,
    pub ema_slow_value: f64,
}

/// Proposed position at the most recent closed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub side: Side,
    pub entry_price: f64,
    pub sl: f64,
    /// Final ladder price.
    pub tp: f64,
    pub tp_targets: Vec<TpLevel>,
    pub trail_atr_mult: Option<f64>,
    /// Stop distance in price units (one R).
    pub r_multiple: f64,
    pub atr_value: f64,
}

impl StrategySignal {
    /// Distance between entry and stop on the losing side.
    #[must_use]
    pub fn stop_distance(&self) -> f64 {
        match self.side {
            Side::Long => self.entry_price - self.sl,
            Side::Short => self.sl - self.entry_price,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub signal: Option<StrategySignal>,
    pub checks: Vec<ConditionCheck>,
    pub snapshot: Snapshot,
}

/// Persisted outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationResult {
    SignalLong,
    SignalShort,
    Rejected,
}

impl EvaluationResult {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignalLong => "SIGNAL_LONG",
            Self::SignalShort => "SIGNAL_SHORT",
            Self::Rejected => "REJECTED",
        }
    }
}

impl From<&EvaluationOutput> for EvaluationResult {
    fn from(output: &EvaluationOutput) -> Self {
        match output.signal.as_ref().map(|s| s.side) {
            Some(Side::Long) => Self::SignalLong,
            Some(Side::Short) => Self::SignalShort,
            None => Self::Rejected,
        }
    }
}

impl std::str::FromStr for EvaluationResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGNAL_LONG" => Ok(Self::SignalLong),
            "SIGNAL_SHORT" => Ok(Self::SignalShort),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(format!("unknown evaluation result: {other}")),
        }
    }
}

/// Evaluates `bars` (ascending) under `config`.
#[must_use]
pub fn evaluate(bars: &[Bar], config: &EffectiveConfig) -> EvaluationOutput {
    StrategyEngine::new(config).evaluate(bars)
}

/// Engine parameters normalized from an [`EffectiveConfig`].
///
/// Percent inputs are converted to fractions here.
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    rsi_period: usize,
    rsi_overbought: f64,
    rsi_oversold: f64,
    ema_fast_period: usize,
    ema_slow_period: usize,
    ema_tolerance: f64,
    price_extension: f64,
    require_cross: bool,
    require_rebound_long: bool,
    require_rebound_short: bool,
    require_trend: bool,
    enable_rsi_long: bool,
    enable_rsi_short: bool,
    require_zone_long: bool,
    require_zone_short: bool,
    min_trend_strength: f64,
    min_displacement: f64,
    trend_tf_multiplier: usize,
    trend_tf_ema_period: usize,
    require_trend_confirmation: bool,
    atr_period: usize,
    atr_sl_mult: f64,
    tp1_r_multiple: f64,
    tp2_r_multiple: f64,
    tp1_ratio: f64,
    trailing_atr_mult: Option<f64>,
    min_warmup: usize,
    template: Option<Vec<TpTemplateEntry>>,
}

fn pct_to_fraction(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value / 100.0
    } else {
        fallback
    }
}

/// Drops unusable template entries and caps ratios so they never exceed a
/// cumulative total of 1.
fn normalize_template(raw: &[TpTemplateEntry]) -> Option<Vec<TpTemplateEntry>> {
    let mut remaining = 1.0_f64;
    let mut out = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.ratio <= 0.0 || entry.r_multiple <= 0.0 || remaining <= 0.0 {
            continue;
        }
        let ratio = entry.ratio.min(remaining);
        out.push(TpTemplateEntry {
            r_multiple: entry.r_multiple,
            ratio,
            label: entry.label.clone(),
        });
        remaining = (remaining - ratio).max(0.0);
    }
    (!out.is_empty()).then_some(out)
}

struct Indicators {
    close: f64,
    prev_close: f64,
    rsi: f64,
    prev_rsi: f64,
    atr: f64,
    ema_fast: f64,
    prev_ema_fast: f64,
    ema_slow: f64,
}

/// Market state derived from the indicators, shared by both sides.
struct Conditions {
    trend_up: bool,
    trend_down: bool,
    htf_up: bool,
    htf_down: bool,
    htf_ok: bool,
    in_zone: bool,
    crossed_up: bool,
    crossed_down: bool,
    rebound_up: bool,
    rebound_down: bool,
    displacement: f64,
    trend_strength: f64,
}

impl StrategyEngine {
    #[must_use]
    pub fn new(config: &EffectiveConfig) -> Self {
        let rebound = config.require_rsi_rebound;
        Self {
            rsi_period: config.rsi_period,
            rsi_overbought: config.rsi_overbought,
            rsi_oversold: config.rsi_oversold,
            ema_fast_period: config.ema_fast_period,
            ema_slow_period: config.ema_slow_period,
            ema_tolerance: pct_to_fraction(config.ema_touch_tolerance_pct, DEFAULT_EMA_TOLERANCE),
            price_extension: pct_to_fraction(config.price_extension_pct, 0.0),
            require_cross: config.require_price_cross,
            require_rebound_long: config.require_rsi_rebound_long.unwrap_or(rebound),
            require_rebound_short: config.require_rsi_rebound_short.unwrap_or(rebound),
            require_trend: config.require_primary_trend,
            enable_rsi_long: config.enable_rsi_long,
            enable_rsi_short: config.enable_rsi_short,
            require_zone_long: config.require_price_zone_long,
            require_zone_short: config.require_price_zone_short,
            min_trend_strength: pct_to_fraction(config.min_trend_strength_pct, 0.0),
            min_displacement: pct_to_fraction(config.min_price_displacement_pct, 0.0),
            trend_tf_multiplier: config.trend_tf_multiplier.max(1),
            trend_tf_ema_period: config.trend_tf_ema_period,
            require_trend_confirmation: config.require_trend_confirmation,
            atr_period: config.atr_period,
            atr_sl_mult: config.atr_sl_mult,
            tp1_r_multiple: config.tp1_r_multiple,
            tp2_r_multiple: config.tp2_r_multiple,
            tp1_ratio: config.tp1_ratio.clamp(0.0, 1.0),
            trailing_atr_mult: config.trailing_enabled.then_some(config.trailing_atr_mult),
            min_warmup: config.min_candles_warmup,
            template: normalize_template(&config.tp_template),
        }
    }

    /// Bars needed before any condition is evaluated.
    #[must_use]
    pub fn required_bars(&self) -> usize {
        self.min_warmup
            .max(self.ema_slow_period + 5)
            .max(self.rsi_period + 5)
    }

    #[must_use]
    pub fn evaluate(&self, bars: &[Bar]) -> EvaluationOutput {
        if bars.len() < self.required_bars() || bars.len() < 2 {
            return EvaluationOutput::default();
        }

        let ind = self.indicators(bars);
        let snapshot = Snapshot {
            close_price: ind.close,
            rsi_value: ind.rsi,
            atr_value: ind.atr,
            ema_fast_value: ind.ema_fast,
            ema_slow_value: ind.ema_slow,
        };
        if !ind.atr.is_finite()
            || !ind.ema_fast.is_finite()
            || !ind.ema_slow.is_finite()
            || ind.ema_fast <= 0.0
        {
            return EvaluationOutput {
                signal: None,
                checks: Vec::new(),
                snapshot,
            };
        }

        let cond = self.conditions(bars, &ind);
        let mut checks = self.long_checks(&ind, &cond);
        if checks.iter().all(|c| c.passed) {
            if let Some(signal) = self.build_signal(Side::Long, ind.close, ind.atr) {
                return EvaluationOutput {
                    signal: Some(signal),
                    checks,
                    snapshot,
                };
            }
        }

        let short = self.short_checks(&ind, &cond);
        let short_passed = short.iter().all(|c| c.passed);
        checks.extend(short);
        let signal = if short_passed {
            self.build_signal(Side::Short, ind.close, ind.atr)
        } else {
            None
        };

        EvaluationOutput {
            signal,
            checks,
            snapshot,
        }
    }

    fn indicators(&self, bars: &[Bar]) -> Indicators {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema_fast = ema(&closes, self.ema_fast_period);
        let ema_slow = ema(&closes, self.ema_slow_period);
        let rsi_values = rsi(&closes, self.rsi_period);
        let atr_values = atr(bars, self.atr_period);

        let last = closes.len() - 1;
        let prev = last - 1;
        Indicators {
            close: closes[last],
            prev_close: closes[prev],
            rsi: rsi_values[last],
            prev_rsi: rsi_values[prev],
            atr: atr_values[last],
            ema_fast: ema_fast[last],
            prev_ema_fast: ema_fast[prev],
            ema_slow: ema_slow[last],
        }
    }

    fn conditions(&self, bars: &[Bar], ind: &Indicators) -> Conditions {
        let trend_up = ind.ema_fast > ind.ema_slow;
        let trend_down = ind.ema_fast < ind.ema_slow;

        let (mut htf_up, mut htf_down, mut htf_ok) = (trend_up, trend_down, true);
        if self.trend_tf_multiplier > 1 && self.require_trend_confirmation {
            if let Some((close, ema)) = self.higher_timeframe_trend(bars) {
                htf_up = close > ema;
                htf_down = close < ema;
                htf_ok = htf_up || htf_down;
            }
        }

        let near =
            (ind.close - ind.ema_fast).abs() <= (ind.ema_fast * self.ema_tolerance).max(1e-6);
        let mut extension_ok = false;
        if !near && self.price_extension > 0.0 {
            let limit = ind.ema_fast * self.price_extension;
            if trend_up && ind.close > ind.ema_fast {
                extension_ok = ind.close - ind.ema_fast <= limit;
            } else if trend_down && ind.close < ind.ema_fast {
                extension_ok = ind.ema_fast - ind.close <= limit;
            }
        }

        let (displacement, trend_strength) = if ind.close > 0.0 {
            (
                (ind.close - ind.ema_fast).abs() / ind.close,
                (ind.ema_fast - ind.ema_slow).abs() / ind.close,
            )
        } else {
            (0.0, 0.0)
        };

        Conditions {
            trend_up,
            trend_down,
            htf_up,
            htf_down,
            htf_ok,
            in_zone: near || extension_ok,
            crossed_up: ind.prev_close < ind.prev_ema_fast && ind.close >= ind.ema_fast,
            crossed_down: ind.prev_close > ind.prev_ema_fast && ind.close <= ind.ema_fast,
            rebound_up: ind.rsi > ind.prev_rsi,
            rebound_down: ind.rsi < ind.prev_rsi,
            displacement,
            trend_strength,
        }
    }

    /// Resamples `bars` into groups of `trend_tf_multiplier` (trailing
    /// partial group included) and returns the last resampled close and its
    /// EMA, or `None` when there is not enough resampled history.
    fn higher_timeframe_trend(&self, bars: &[Bar]) -> Option<(f64, f64)> {
        let closes: Vec<f64> = bars
            .chunks(self.trend_tf_multiplier)
            .filter_map(|group| group.last().map(|b| b.close))
            .collect();
        if closes.len() < self.trend_tf_ema_period + 2 {
            return None;
        }
        let ema_values = ema(&closes, self.trend_tf_ema_period);
        Some((*closes.last()?, *ema_values.last()?))
    }

    fn long_checks(&self, ind: &Indicators, c: &Conditions) -> Vec<ConditionCheck> {
        let mut out = Vec::new();
        let mut push = |name: &str, expected: String, actual: String, passed: bool| {
            out.push(ConditionCheck {
                side: Side::Long,
                condition_name: name.to_string(),
                expected_value: expected,
                actual_value: actual,
                passed,
            });
        };

        if self.require_trend {
            push("trend_up", "true".into(), c.trend_up.to_string(), c.trend_up);
        }
        if self.enable_rsi_long {
            push(
                "rsi_oversold",
                format!("≤{}", self.rsi_oversold),
                format!("{:.2}", ind.rsi),
                ind.rsi <= self.rsi_oversold,
            );
        }
        if self.require_zone_long {
            push("price_zone_ok", "true".into(), c.in_zone.to_string(), c.in_zone);
        }
        if self.require_trend_confirmation {
            push("htf_trend_up", "true".into(), c.htf_up.to_string(), c.htf_up);
            push("htf_trend_ok", "true".into(), c.htf_ok.to_string(), c.htf_ok);
        }
        if self.require_cross {
            push("price_crossed_up", "true".into(), c.crossed_up.to_string(), c.crossed_up);
        }
        if self.require_rebound_long {
            push("rsi_rebound_up", "true".into(), c.rebound_up.to_string(), c.rebound_up);
        }
        if self.min_trend_strength > 0.0 {
            push(
                "trend_strength",
                format!("≥{}", self.min_trend_strength),
                format!("{:.4}", c.trend_strength),
                c.trend_strength >= self.min_trend_strength,
            );
        }
        if self.min_displacement > 0.0 {
            let below = ind.close <= ind.ema_fast;
            push(
                "price_displacement",
                format!("≥{} & below", self.min_displacement),
                format!(
                    "{:.4} ({})",
                    c.displacement,
                    if below { "below" } else { "above" }
                ),
                below && c.displacement >= self.min_displacement,
            );
        }
        out
    }

    fn short_checks(&self, ind: &Indicators, c: &Conditions) -> Vec<ConditionCheck> {
        let mut out = Vec::new();
        let mut push = |name: &str, expected: String, actual: String, passed: bool| {
            out.push(ConditionCheck {
                side: Side::Short,
                condition_name: name.to_string(),
                expected_value: expected,
                actual_value: actual,
                passed,
            });
        };

        if self.require_trend {
            push("trend_down", "true".into(), c.trend_down.to_string(), c.trend_down);
        }
        if self.enable_rsi_short {
            push(
                "rsi_overbought",
                format!("≥{}", self.rsi_overbought),
                format!("{:.2}", ind.rsi),
                ind.rsi >= self.rsi_overbought,
            );
        }
        if self.require_zone_short {
            push("price_zone_ok", "true".into(), c.in_zone.to_string(), c.in_zone);
        }
        if self.require_trend_confirmation {
            push("htf_trend_down", "true".into(), c.htf_down.to_string(), c.htf_down);
            push("htf_trend_ok", "true".into(), c.htf_ok.to_string(), c.htf_ok);
        }
        if self.require_cross {
            push(
                "price_crossed_down",
                "true".into(),
                c.crossed_down.to_string(),
                c.crossed_down,
            );
        }
        if self.require_rebound_short {
            push(
                "rsi_rebound_down",
                "true".into(),
                c.rebound_down.to_string(),
                c.rebound_down,
            );
        }
        if self.min_trend_strength > 0.0 {
            push(
                "trend_strength",
                format!("≥{}", self.min_trend_strength),
                format!("{:.4}", c.trend_strength),
                c.trend_strength >= self.min_trend_strength,
            );
        }
        if self.min_displacement > 0.0 {
            let above = ind.close >= ind.ema_fast;
            push(
                "price_displacement",
                format!("≥{} & above", self.min_displacement),
                format!(
                    "{:.4} ({})",
                    c.displacement,
                    if above { "above" } else { "below" }
                ),
                above && c.displacement >= self.min_displacement,
            );
        }
        out
    }

    fn build_signal(&self, side: Side, close: f64, atr_value: f64) -> Option<StrategySignal> {
        let dir = side.direction();
        let sl = close - dir * self.atr_sl_mult * atr_value;
        let stop_distance = dir * (close - sl);
        if stop_distance <= 0.0 || !stop_distance.is_finite() {
            return None;
        }

        let tp_targets = self.build_ladder(close, stop_distance, side);
        let tp = tp_targets.last()?.price;
        if tp <= 0.0 {
            return None;
        }

        Some(StrategySignal {
            side,
            entry_price: close,
            sl,
            tp,
            tp_targets,
            trail_atr_mult: self.trailing_atr_mult,
            r_multiple: stop_distance,
            atr_value,
        })
    }

    fn build_ladder(&self, entry: f64, stop_distance: f64, side: Side) -> Vec<TpLevel> {
        if let Some(template) = &self.template {
            let ladder = ladder_from_template(template, entry, stop_distance, side);
            if !ladder.is_empty() {
                return ladder;
            }
        }
        self.default_ladder(entry, stop_distance, side)
    }

    /// Two-level ladder: `tp1_ratio` at `tp1_r_multiple`, the remainder at
    /// `tp2_r_multiple`.
    fn default_ladder(&self, entry: f64, stop_distance: f64, side: Side) -> Vec<TpLevel> {
        let dir = side.direction();
        let r1 = self.tp1_ratio;
        let mut ladder = Vec::with_capacity(2);

        let p1 = entry + dir * self.tp1_r_multiple * stop_distance;
        if r1 > 0.0 && p1 > 0.0 {
            ladder.push(TpLevel {
                price: p1,
                ratio: r1,
                label: Some("TP1".to_string()),
            });
        }

        let p_final = entry + dir * self.tp2_r_multiple * stop_distance;
        if p_final <= 0.0 {
            return Vec::new();
        }

        if r1 >= 1.0 {
            match ladder.last_mut() {
                Some(level) => level.price = p_final,
                None => ladder.push(TpLevel {
                    price: p_final,
                    ratio: 1.0,
                    label: Some("TP1".to_string()),
                }),
            }
            return ladder;
        }

        let remainder = (1.0 - r1).max(0.0);
        let ratio = if ladder.is_empty() { 1.0 } else { remainder };
        ladder.push(TpLevel {
            price: p_final,
            ratio,
            label: Some(format!("TP{}", ladder.len() + 1)),
        });
        ladder
    }
}

/// Absolute ladder from a normalized template. Entries whose price would
/// be non-positive are skipped; any unassigned share goes to the last
/// surviving level.
fn ladder_from_template(
    template: &[TpTemplateEntry],
    entry: f64,
    stop_distance: f64,
    side: Side,
) -> Vec<TpLevel> {
    let dir = side.direction();
    let mut assigned = 0.0_f64;
    let mut ladder: Vec<TpLevel> = Vec::with_capacity(template.len());

    for (i, t) in template.iter().enumerate() {
        let price = entry + dir * t.r_multiple * stop_distance;
        if price <= 0.0 {
            continue;
        }
        assigned += t.ratio;
        ladder.push(TpLevel {
            price,
            ratio: t.ratio.min(1.0),
            label: Some(t.label.clone().unwrap_or_else(|| format!("TP{}", i + 1))),
        });
    }

    if assigned < 1.0 - 1e-6 {
        if let Some(last) = ladder.last_mut() {
            last.ratio += 1.0 - assigned;
        }
    }
    ladder
}
