//! Candle-driven session cycles.
//!
//! Every closed candle is stored, then each running session on that
//! symbol goes through one cycle: rehydrate the simulator, advance open
//! positions, evaluate the strategy, maybe open a position, and commit
//! the whole change set in one store transaction. Live orders are sent
//! only after the commit succeeded.

use crate::convert;
use crate::guard::SymbolGuard;
use crate::sizing::{normalize_fee, size_entry, SizingRejection};
use anyhow::{Context, Result};
use chrono::Utc;
use momentum_core::{Bar, CandleEvent, EngineSettings, ExchangeClient, OrderRequest};
use momentum_data::{RunningSession, SessionCycle, TradingStore};
use momentum_execution::{FeeConfig, OpenPositionSpec, PositionSimulator};
use momentum_strategy::{evaluate, resolve_config, EvaluationResult};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Result of handling one closed candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleOutcome {
    /// Another cycle for the symbol was still running.
    Busy,
    Processed { sessions: usize, failed: usize },
}

/// Result of one session cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    InsufficientHistory { bars: usize },
    Completed(SessionReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub result: EvaluationResult,
    /// Trades realized on the closed candle.
    pub trades: usize,
    pub opened_position: Option<String>,
    pub rejection: Option<SizingRejection>,
    pub live_order_sent: bool,
}

pub struct Orchestrator<S, E> {
    store: Arc<S>,
    exchange: Arc<E>,
    settings: EngineSettings,
    guard: SymbolGuard,
}

impl<S, E> Orchestrator<S, E>
where
    S: TradingStore + 'static,
    E: ExchangeClient + 'static,
{
    #[must_use]
    pub fn new(store: Arc<S>, exchange: Arc<E>, settings: EngineSettings) -> Self {
        Self {
            store,
            exchange,
            settings,
            guard: SymbolGuard::new(),
        }
    }

    #[must_use]
    pub fn guard(&self) -> &SymbolGuard {
        &self.guard
    }

    /// Consumes candle events until shutdown or until the feed closes the
    /// channel. Each closed candle runs in its own task; in-flight tasks
    /// are awaited before returning.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<CandleEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tasks = JoinSet::new();
        info!("orchestrator started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown requested, stopping orchestrator");
                    break;
                }

                event = events.recv() => match event {
                    Some(CandleEvent::Closed { symbol, granularity, bar }) => {
                        let this = Arc::clone(&self);
                        tasks.spawn(async move {
                            if let Err(e) = this.on_candle_closed(&symbol, &granularity, &bar).await {
                                error!(symbol = %symbol, error = ?e, "candle.closed handling failed");
                            }
                        });
                    }
                    Some(CandleEvent::Update { symbol, bar, .. }) => {
                        trace!(symbol = %symbol, close = bar.close, "candle update");
                    }
                    None => {
                        info!("candle channel closed");
                        break;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "candle task panicked");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "candle task panicked");
            }
        }
        info!("orchestrator stopped");
    }

    /// Stores the closed bar and runs every running session on `symbol`.
    ///
    /// A failing session is logged and does not stop its siblings.
    ///
    /// # Errors
    /// Returns an error if the candle cannot be stored or sessions cannot
    /// be loaded.
    pub async fn on_candle_closed(
        &self,
        symbol: &str,
        granularity: &str,
        bar: &Bar,
    ) -> Result<CandleOutcome> {
        let candle_id = self
            .store
            .upsert_candle(symbol, granularity, bar)
            .await
            .with_context(|| format!("Failed to store closed candle for {symbol}"))?;

        let Some(_permit) = self.guard.try_acquire(symbol) else {
            warn!(symbol, "cycle already in flight, skipping candle");
            return Ok(CandleOutcome::Busy);
        };

        let sessions = self
            .store
            .running_sessions(symbol)
            .await
            .with_context(|| format!("Failed to load running sessions for {symbol}"))?;

        let mut processed = 0;
        let mut failed = 0;
        for running in &sessions {
            match self.process_session(running, &candle_id, granularity).await {
                Ok(outcome) => {
                    processed += 1;
                    debug!(session_id = %running.session.id, outcome = ?outcome, "session cycle done");
                }
                Err(e) => {
                    failed += 1;
                    error!(session_id = %running.session.id, error = ?e, "session cycle failed");
                }
            }
        }

        info!(
            symbol,
            close = bar.close,
            sessions = processed,
            failed,
            "processed closed candle"
        );
        Ok(CandleOutcome::Processed {
            sessions: processed,
            failed,
        })
    }

    /// Runs one cycle for one session.
    ///
    /// # Errors
    /// Returns an error if loading state or committing the cycle fails.
    /// Live order failures are logged only.
    pub async fn process_session(
        &self,
        running: &RunningSession,
        candle_id: &str,
        granularity: &str,
    ) -> Result<SessionOutcome> {
        let session = &running.session;

        let bars = self
            .store
            .recent_candles(&session.symbol, granularity, self.settings.bar_window)
            .await
            .context("Failed to load recent candles")?;
        let last_bar = match bars.last() {
            Some(bar) if bars.len() >= self.settings.min_history => *bar,
            _ => {
                debug!(session_id = %session.id, bars = bars.len(), "not enough history");
                return Ok(SessionOutcome::InsufficientHistory { bars: bars.len() });
            }
        };

        let config = resolve_config(
            &running.strategy,
            running.symbol_override.as_ref(),
            &session.overrides,
        );
        let fee_rate = normalize_fee(config.taker_fee_pct);
        let mut sim = PositionSimulator::new(
            session.current_balance,
            FeeConfig::new(fee_rate, config.min_trade_fee_usdt),
        );

        let stored = self
            .store
            .open_positions(&session.id)
            .await
            .context("Failed to load open positions")?;
        for record in &stored {
            sim.restore_position(convert::sim_position(record));
        }

        let mut cycle = SessionCycle::new(session.id.clone());

        let trades = sim.on_new_candle(&last_bar);
        for trade in &trades {
            info!(
                session_id = %session.id,
                position_id = %trade.position_id,
                reason = %trade.reason,
                qty = trade.qty,
                exit = trade.exit_price,
                pnl = trade.pnl,
                partial = trade.is_partial,
                "simulated close"
            );
        }
        cycle.trades = trades
            .iter()
            .map(|t| convert::trade_record(&session.id, t))
            .collect();
        let fully_closed: HashSet<&str> = trades
            .iter()
            .filter(|t| !t.is_partial)
            .map(|t| t.position_id.as_str())
            .collect();

        let output = evaluate(&bars, &config);
        let result = EvaluationResult::from(&output);
        cycle.evaluation = Some(convert::evaluation_record(
            &session.id,
            candle_id,
            &session.symbol,
            &output,
            Utc::now(),
        ));

        let leverage = f64::from(session.leverage);
        let mut rejection = None;
        let mut entry: Option<(String, OrderRequest)> = None;

        if let Some(signal) = &output.signal {
            match size_entry(signal, sim.equity(), leverage, &config, fee_rate) {
                Ok(sizing) => {
                    let position = sim.open_position(OpenPositionSpec {
                        id: Some(Uuid::new_v4().to_string()),
                        symbol: session.symbol.clone(),
                        side: signal.side,
                        qty: sizing.qty,
                        entry_price: signal.entry_price,
                        leverage,
                        sl: signal.sl,
                        tp: signal.tp,
                        open_time: last_bar.open_time,
                        tp_targets: signal.tp_targets.clone(),
                        trail_atr_mult: signal.trail_atr_mult,
                        atr_value: Some(signal.atr_value),
                        r_multiple: Some(signal.r_multiple),
                        risk_amount: sizing.risk_amount,
                    });
                    info!(
                        session_id = %session.id,
                        position_id = %position.id,
                        side = %position.side,
                        qty = position.qty,
                        entry = position.entry_price,
                        sl = position.sl,
                        tp = position.tp,
                        "opened simulated position"
                    );
                    cycle
                        .opened
                        .push(convert::position_record(&session.id, position));
                    entry = Some((
                        position.id.clone(),
                        OrderRequest {
                            symbol: session.symbol.clone(),
                            side: signal.side,
                            qty: sizing.qty,
                            leverage: session.leverage,
                            sl: Some(signal.sl),
                            tp: Some(signal.tp),
                        },
                    ));
                }
                Err(reason) => {
                    debug!(session_id = %session.id, reason = %reason, "signal not taken");
                    rejection = Some(reason);
                }
            }
        }

        for record in stored {
            if fully_closed.contains(record.id.as_str()) {
                cycle.updated.push(convert::closed_record(record));
            } else if let Some(position) = sim.open_positions().iter().find(|p| p.id == record.id) {
                cycle
                    .updated
                    .push(convert::position_record(&session.id, position));
            }
        }
        cycle.balance = sim.balance();
        cycle.equity = sim.equity();

        self.store
            .commit_cycle(&cycle)
            .await
            .with_context(|| format!("Failed to commit cycle for session {}", session.id))?;

        let opened_position = entry.as_ref().map(|(id, _)| id.clone());
        let live_order_sent = match entry {
            Some((position_id, order)) => self.dispatch_live(running, &position_id, &order).await,
            None => false,
        };

        Ok(SessionOutcome::Completed(SessionReport {
            result,
            trades: trades.len(),
            opened_position,
            rejection,
            live_order_sent,
        }))
    }

    /// Mirrors a simulated entry on the exchange for live sessions.
    async fn dispatch_live(
        &self,
        running: &RunningSession,
        position_id: &str,
        order: &OrderRequest,
    ) -> bool {
        if running.session.simulation {
            return false;
        }
        let Some(credentials) = running.credentials.as_ref().filter(|c| c.is_complete()) else {
            debug!(session_id = %running.session.id, "no credentials, live order skipped");
            return false;
        };

        match self.exchange.place_order(credentials, order).await {
            Ok(placed) => {
                info!(
                    session_id = %running.session.id,
                    position_id,
                    order_id = ?placed.order_id,
                    client_oid = %placed.client_oid,
                    side = %order.side,
                    qty = order.qty,
                    "live order placed"
                );
                true
            }
            Err(e) => {
                error!(
                    session_id = %running.session.id,
                    position_id,
                    error = %e,
                    "live order failed, simulated position kept"
                );
                false
            }
        }
    }
}
