//! Strategy parameter tiers.
//!
//! Three tiers feed the effective configuration of a session:
//! strategy defaults ([`StrategyParams`]), an optional per-symbol
//! [`SymbolOverride`], and per-session [`SessionOverrides`]. The override
//! tiers hold `Option` fields; `None` means "inherit".
//!
//! Percentage fields (`*_pct`) are expressed in percent (`0.6` = 0.6%),
//! except `risk_per_trade`, which is a fraction of equity.

use serde::{Deserialize, Serialize};

/// One entry of a take-profit ladder template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpTemplateEntry {
    /// Distance from entry in multiples of the stop distance.
    pub r_multiple: f64,
    /// Fraction of the position closed at this level.
    pub ratio: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl TpTemplateEntry {
    #[must_use]
    pub const fn new(r_multiple: f64, ratio: f64) -> Self {
        Self {
            r_multiple,
            ratio,
            label: None,
        }
    }
}

/// Base strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub ema_touch_tolerance_pct: f64,
    pub price_extension_pct: f64,
    pub require_price_cross: bool,
    pub require_rsi_rebound: bool,
    /// Falls back to `require_rsi_rebound` when unset.
    pub require_rsi_rebound_long: Option<bool>,
    /// Falls back to `require_rsi_rebound` when unset.
    pub require_rsi_rebound_short: Option<bool>,
    pub require_primary_trend: bool,
    pub enable_rsi_long: bool,
    pub enable_rsi_short: bool,
    pub require_price_zone_long: bool,
    pub require_price_zone_short: bool,
    pub min_trend_strength_pct: f64,
    pub min_price_displacement_pct: f64,
    pub trend_tf_multiplier: usize,
    pub trend_tf_ema_period: usize,
    pub require_trend_confirmation: bool,
    pub atr_period: usize,
    pub atr_tp_mult: f64,
    pub atr_sl_mult: f64,
    pub tp1_r_multiple: f64,
    pub tp2_r_multiple: f64,
    pub tp1_ratio: f64,
    pub trailing_enabled: bool,
    pub trailing_atr_mult: f64,
    pub min_candles_warmup: usize,
    pub granularity: String,
    /// Fraction of equity risked per trade.
    pub risk_per_trade: f64,
    pub max_notional_usdt: f64,
    pub min_profit_usdt: f64,
    pub taker_fee_pct: f64,
    pub min_trade_fee_usdt: f64,
    /// Ladder template. Empty means the two-level default ladder is used.
    pub tp_template: Vec<TpTemplateEntry>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 68.0,
            rsi_oversold: 32.0,
            ema_fast_period: 50,
            ema_slow_period: 200,
            ema_touch_tolerance_pct: 0.6,
            price_extension_pct: 0.25,
            require_price_cross: true,
            require_rsi_rebound: true,
            require_rsi_rebound_long: None,
            require_rsi_rebound_short: None,
            require_primary_trend: true,
            enable_rsi_long: true,
            enable_rsi_short: true,
            require_price_zone_long: true,
            require_price_zone_short: true,
            min_trend_strength_pct: 0.0,
            min_price_displacement_pct: 0.0,
            trend_tf_multiplier: 5,
            trend_tf_ema_period: 200,
            require_trend_confirmation: true,
            atr_period: 14,
            atr_tp_mult: 2.0,
            atr_sl_mult: 2.4,
            tp1_r_multiple: 0.7,
            tp2_r_multiple: 1.5,
            tp1_ratio: 0.4,
            trailing_enabled: true,
            trailing_atr_mult: 1.8,
            min_candles_warmup: 250,
            granularity: "5m".to_string(),
            risk_per_trade: 0.10,
            max_notional_usdt: 1000.0,
            min_profit_usdt: 4.0,
            taker_fee_pct: 0.06,
            min_trade_fee_usdt: 1.5,
            tp_template: vec![
                TpTemplateEntry::new(0.8, 0.4),
                TpTemplateEntry::new(1.5, 0.35),
                TpTemplateEntry::new(2.2, 0.25),
            ],
        }
    }
}

/// Per-symbol override of a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolOverride {
    pub symbol: String,
    pub rsi_overbought: Option<f64>,
    pub rsi_oversold: Option<f64>,
    pub ema_touch_tolerance_pct: Option<f64>,
    pub price_extension_pct: Option<f64>,
    pub require_price_cross: Option<bool>,
    pub require_rsi_rebound: Option<bool>,
    pub require_rsi_rebound_long: Option<bool>,
    pub require_rsi_rebound_short: Option<bool>,
    pub require_primary_trend: Option<bool>,
    pub enable_rsi_long: Option<bool>,
    pub enable_rsi_short: Option<bool>,
    pub require_price_zone_long: Option<bool>,
    pub require_price_zone_short: Option<bool>,
    pub min_trend_strength_pct: Option<f64>,
    pub min_price_displacement_pct: Option<f64>,
    pub atr_sl_mult: Option<f64>,
    pub atr_tp_mult: Option<f64>,
    pub trailing_atr_mult: Option<f64>,
    pub risk_per_trade: Option<f64>,
    pub min_profit_usdt: Option<f64>,
    /// Replaces the base ladder entirely when present and non-empty.
    pub tp_template: Option<Vec<TpTemplateEntry>>,
}

impl SymbolOverride {
    #[must_use]
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Tuned overrides shipped with the default strategy.
    #[must_use]
    pub fn seed_defaults() -> Vec<Self> {
        let ladder = |levels: [(f64, f64); 3]| {
            Some(
                levels
                    .iter()
                    .map(|&(r, ratio)| TpTemplateEntry::new(r, ratio))
                    .collect::<Vec<_>>(),
            )
        };

        vec![
            Self {
                rsi_oversold: Some(36.0),
                rsi_overbought: Some(64.0),
                ema_touch_tolerance_pct: Some(1.0),
                price_extension_pct: Some(0.6),
                require_price_cross: Some(false),
                ..Self::for_symbol("BTCUSDT")
            },
            Self {
                rsi_oversold: Some(29.0),
                rsi_overbought: Some(69.0),
                ema_touch_tolerance_pct: Some(1.1),
                price_extension_pct: Some(0.45),
                require_price_cross: Some(false),
                require_rsi_rebound: Some(true),
                require_rsi_rebound_long: Some(true),
                require_price_zone_long: Some(false),
                require_price_zone_short: Some(false),
                min_trend_strength_pct: Some(0.32),
                atr_sl_mult: Some(1.5),
                atr_tp_mult: Some(3.0),
                trailing_atr_mult: Some(1.2),
                tp_template: ladder([(0.6, 0.4), (1.2, 0.35), (2.0, 0.25)]),
                ..Self::for_symbol("ETHUSDT")
            },
            Self {
                rsi_oversold: Some(30.0),
                rsi_overbought: Some(71.0),
                ema_touch_tolerance_pct: Some(0.65),
                price_extension_pct: Some(0.32),
                require_primary_trend: Some(false),
                require_rsi_rebound: Some(true),
                require_rsi_rebound_long: Some(true),
                require_rsi_rebound_short: Some(true),
                require_price_zone_long: Some(true),
                require_price_zone_short: Some(true),
                min_trend_strength_pct: Some(0.35),
                atr_sl_mult: Some(1.5),
                atr_tp_mult: Some(5.0),
                trailing_atr_mult: Some(1.3),
                tp_template: ladder([(0.55, 0.4), (1.05, 0.35), (1.75, 0.25)]),
                ..Self::for_symbol("SOLUSDT")
            },
            Self {
                enable_rsi_short: Some(true),
                enable_rsi_long: Some(true),
                rsi_oversold: Some(30.0),
                rsi_overbought: Some(68.0),
                ema_touch_tolerance_pct: Some(0.7),
                price_extension_pct: Some(0.4),
                require_rsi_rebound: Some(true),
                require_price_zone_long: Some(true),
                atr_sl_mult: Some(1.5),
                atr_tp_mult: Some(4.0),
                min_trend_strength_pct: Some(0.32),
                trailing_atr_mult: Some(1.6),
                tp_template: ladder([(0.7, 0.5), (1.4, 0.3), (2.2, 0.2)]),
                ..Self::for_symbol("XRPUSDT")
            },
            Self {
                enable_rsi_short: Some(true),
                enable_rsi_long: Some(true),
                rsi_oversold: Some(31.0),
                rsi_overbought: Some(68.0),
                ema_touch_tolerance_pct: Some(0.8),
                price_extension_pct: Some(0.4),
                require_rsi_rebound: Some(true),
                require_price_zone_long: Some(true),
                atr_sl_mult: Some(1.5),
                atr_tp_mult: Some(4.5),
                min_trend_strength_pct: Some(0.32),
                trailing_atr_mult: Some(1.3),
                tp_template: ladder([(0.7, 0.5), (1.4, 0.3), (2.2, 0.2)]),
                ..Self::for_symbol("ADAUSDT")
            },
        ]
    }
}

/// Operator overrides attached to a single trading session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionOverrides {
    pub risk_per_trade: Option<f64>,
    pub max_notional_usdt: Option<f64>,
    pub min_profit_usdt: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_sums_to_one() {
        let params = StrategyParams::default();
        let total: f64 = params.tp_template.iter().map(|t| t.ratio).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seed_overrides_cover_tracked_symbols() {
        let seeds = SymbolOverride::seed_defaults();
        let symbols: Vec<_> = seeds.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT"]
        );
        // BTC keeps the base ladder
        assert!(seeds[0].tp_template.is_none());
        assert_eq!(seeds[1].tp_template.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params: StrategyParams =
            serde_json::from_str(r#"{"rsi_period": 21, "tp_template": []}"#).unwrap();
        assert_eq!(params.rsi_period, 21);
        assert_eq!(params.ema_slow_period, 200);
        assert!(params.tp_template.is_empty());
    }
}
