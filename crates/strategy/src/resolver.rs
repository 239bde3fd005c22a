//! Three-tier configuration merge.

use momentum_core::{SessionOverrides, StrategyParams, SymbolOverride};

/// Flat parameter set used for one evaluation cycle.
pub type EffectiveConfig = StrategyParams;

/// Merges strategy defaults, an optional per-symbol override and the
/// session's numeric overrides, in that order.
///
/// Only non-`None` override fields replace the value below them. A
/// non-empty symbol ladder template replaces the base ladder as a whole.
#[must_use]
pub fn resolve_config(
    base: &StrategyParams,
    symbol: Option<&SymbolOverride>,
    session: &SessionOverrides,
) -> EffectiveConfig {
    let mut cfg = base.clone();
    if let Some(o) = symbol {
        apply_symbol_override(&mut cfg, o);
    }
    apply_session_overrides(&mut cfg, session);
    cfg
}

fn apply_symbol_override(cfg: &mut EffectiveConfig, o: &SymbolOverride) {
    fn set<T: Copy>(slot: &mut T, value: Option<T>) {
        if let Some(v) = value {
            *slot = v;
        }
    }

    set(&mut cfg.rsi_overbought, o.rsi_overbought);
    set(&mut cfg.rsi_oversold, o.rsi_oversold);
    set(&mut cfg.ema_touch_tolerance_pct, o.ema_touch_tolerance_pct);
    set(&mut cfg.price_extension_pct, o.price_extension_pct);
    set(&mut cfg.require_price_cross, o.require_price_cross);
    set(&mut cfg.require_rsi_rebound, o.require_rsi_rebound);
    if o.require_rsi_rebound_long.is_some() {
        cfg.require_rsi_rebound_long = o.require_rsi_rebound_long;
    }
    if o.require_rsi_rebound_short.is_some() {
        cfg.require_rsi_rebound_short = o.require_rsi_rebound_short;
    }
    set(&mut cfg.require_primary_trend, o.require_primary_trend);
    set(&mut cfg.enable_rsi_long, o.enable_rsi_long);
    set(&mut cfg.enable_rsi_short, o.enable_rsi_short);
    set(&mut cfg.require_price_zone_long, o.require_price_zone_long);
    set(&mut cfg.require_price_zone_short, o.require_price_zone_short);
    set(&mut cfg.min_trend_strength_pct, o.min_trend_strength_pct);
    set(&mut cfg.min_price_displacement_pct, o.min_price_displacement_pct);
    set(&mut cfg.atr_sl_mult, o.atr_sl_mult);
    set(&mut cfg.atr_tp_mult, o.atr_tp_mult);
    set(&mut cfg.trailing_atr_mult, o.trailing_atr_mult);
    set(&mut cfg.risk_per_trade, o.risk_per_trade);
    set(&mut cfg.min_profit_usdt, o.min_profit_usdt);

    if let Some(template) = o.tp_template.as_ref().filter(|t| !t.is_empty()) {
        cfg.tp_template = template.clone();
    }
}

fn apply_session_overrides(cfg: &mut EffectiveConfig, s: &SessionOverrides) {
    if let Some(v) = s.risk_per_trade {
        cfg.risk_per_trade = v;
    }
    if let Some(v) = s.max_notional_usdt {
        cfg.max_notional_usdt = v;
    }
    if let Some(v) = s.min_profit_usdt {
        cfg.min_profit_usdt = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momentum_core::TpTemplateEntry;

    #[test]
    fn test_no_overrides_returns_base() {
        let base = StrategyParams::default();
        let cfg = resolve_config(&base, None, &SessionOverrides::default());
        assert_eq!(cfg, base);
    }

    #[test]
    fn test_symbol_override_only_replaces_set_fields() {
        let base = StrategyParams::default();
        let o = SymbolOverride {
            rsi_oversold: Some(36.0),
            require_price_cross: Some(false),
            ..SymbolOverride::for_symbol("BTCUSDT")
        };
        let cfg = resolve_config(&base, Some(&o), &SessionOverrides::default());
        assert_eq!(cfg.rsi_oversold, 36.0);
        assert!(!cfg.require_price_cross);
        assert_eq!(cfg.rsi_overbought, base.rsi_overbought);
        assert_eq!(cfg.tp_template, base.tp_template);
    }

    #[test]
    fn test_symbol_template_replaces_whole_ladder() {
        let base = StrategyParams::default();
        let o = SymbolOverride {
            tp_template: Some(vec![TpTemplateEntry::new(1.0, 1.0)]),
            ..SymbolOverride::for_symbol("ETHUSDT")
        };
        let cfg = resolve_config(&base, Some(&o), &SessionOverrides::default());
        assert_eq!(cfg.tp_template, vec![TpTemplateEntry::new(1.0, 1.0)]);
    }

    #[test]
    fn test_empty_symbol_template_keeps_base() {
        let base = StrategyParams::default();
        let o = SymbolOverride {
            tp_template: Some(Vec::new()),
            ..SymbolOverride::for_symbol("ETHUSDT")
        };
        let cfg = resolve_config(&base, Some(&o), &SessionOverrides::default());
        assert_eq!(cfg.tp_template.len(), 3);
    }

    #[test]
    fn test_session_overrides_apply_last() {
        let base = StrategyParams::default();
        let o = SymbolOverride {
            risk_per_trade: Some(0.05),
            min_profit_usdt: Some(2.0),
            ..SymbolOverride::for_symbol("SOLUSDT")
        };
        let session = SessionOverrides {
            risk_per_trade: Some(0.02),
            max_notional_usdt: Some(250.0),
            min_profit_usdt: None,
        };
        let cfg = resolve_config(&base, Some(&o), &session);
        assert_eq!(cfg.risk_per_trade, 0.02);
        assert_eq!(cfg.max_notional_usdt, 250.0);
        assert_eq!(cfg.min_profit_usdt, 2.0);
    }
}
