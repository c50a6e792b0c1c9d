//! The funding-arb state machine.
//!
//! One instance owns the `HedgePosition` outright and is driven by strictly
//! sequential ticks from the run loop. Every state transition commits only on
//! confirmed execution results; partial information never drives a
//! transition. The worst outcome this machine exists to avoid is a single
//! unhedged leg, so a leg mismatch always produces a Critical alert and an
//! immediate corrective order.

use crate::alert::{AlertEvent, AlertKind, AlertSeverity, AlertSink};
use crate::config::{Config, PairConfig};
use crate::exchange::{
    Execution, ExecutionError, FillStatus, FundingSnapshot, LegKind, MarketData, MarketDataError,
    OrderHandle, OrderIntent, OrderSide,
};
use crate::strategy::position::{HedgePosition, PositionState};
use crate::strategy::sizer::PositionSizer;
use crate::utils::decimal::safe_div;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One leg of an in-flight entry or unwind.
#[derive(Debug, Clone)]
struct PendingLeg {
    intent: OrderIntent,
    handle: Option<OrderHandle>,
    filled: Option<Decimal>,
    failed: bool,
}

impl PendingLeg {
    fn submitted(intent: OrderIntent, handle: OrderHandle) -> Self {
        Self {
            intent,
            handle: Some(handle),
            filled: None,
            failed: false,
        }
    }

    fn unsubmitted(intent: OrderIntent) -> Self {
        Self {
            intent,
            handle: None,
            filled: None,
            failed: true,
        }
    }

    fn resolved(&self) -> bool {
        self.filled.is_some() || self.failed
    }
}

/// The intent-set currently in flight. At most one exists at a time; no new
/// intents are issued while one is pending.
#[derive(Debug, Clone)]
struct PendingPair {
    spot: Option<PendingLeg>,
    perp: Option<PendingLeg>,
    /// Funding rate at the snapshot that triggered this pair
    rate: Decimal,
    /// Prices at submission, used for the entry tolerance check
    spot_price: Decimal,
    mark_price: Decimal,
    polls: u32,
}

impl PendingPair {
    fn legs(&self) -> impl Iterator<Item = &PendingLeg> {
        self.spot.iter().chain(self.perp.iter())
    }

    fn all_filled(&self) -> bool {
        self.legs().all(|leg| leg.filled.is_some())
    }

    fn all_failed(&self) -> bool {
        self.legs().all(|leg| leg.failed)
    }

    fn any_filled(&self) -> bool {
        self.legs().any(|leg| leg.filled.is_some())
    }

    fn any_failed(&self) -> bool {
        self.legs().any(|leg| leg.failed)
    }

    fn any_unresolved(&self) -> bool {
        self.legs().any(|leg| !leg.resolved())
    }

    fn filled_qty(&self, leg: LegKind) -> Decimal {
        let slot = match leg {
            LegKind::Spot => &self.spot,
            LegKind::Perp => &self.perp,
        };
        slot.as_ref().and_then(|l| l.filled).unwrap_or(Decimal::ZERO)
    }

    fn describe(&self) -> String {
        fn leg_status(leg: &Option<PendingLeg>) -> String {
            match leg {
                None => "absent".to_string(),
                Some(l) => match (l.filled, l.failed) {
                    (Some(qty), _) => format!("filled {}", qty),
                    (None, true) => "failed".to_string(),
                    (None, false) => "pending".to_string(),
                },
            }
        }
        format!(
            "spot {}, perp {}",
            leg_status(&self.spot),
            leg_status(&self.perp)
        )
    }
}

/// Single-pair funding-rate arbitrage over {Flat, Entering, Open, Exiting}.
pub struct FundingArbStrategy {
    pair: PairConfig,
    sizer: PositionSizer,
    notional_tolerance: Decimal,
    market: Arc<dyn MarketData>,
    execution: Arc<dyn Execution>,
    alerts: Arc<dyn AlertSink>,
    position: HedgePosition,
    pending: Option<PendingPair>,
    call_timeout: Duration,
    max_fill_polls: u32,
    max_hold: ChronoDuration,
    stop: Arc<AtomicBool>,
}

impl FundingArbStrategy {
    pub fn new(
        config: &Config,
        market: Arc<dyn MarketData>,
        execution: Arc<dyn Execution>,
        alerts: Arc<dyn AlertSink>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pair: config.pair.clone(),
            sizer: PositionSizer::new(config.sizing.clone()),
            notional_tolerance: config.sizing.notional_tolerance,
            market,
            execution,
            alerts,
            position: HedgePosition::new(),
            pending: None,
            call_timeout: Duration::from_secs(config.execution.call_timeout_secs),
            max_fill_polls: config.execution.max_fill_polls,
            max_hold: ChronoDuration::hours(i64::from(config.execution.max_hold_hours)),
            stop: stop.clone(),
        }
    }

    /// Current belief about live exposure.
    pub fn position(&self) -> &HedgePosition {
        &self.position
    }

    /// Flat with nothing in flight; safe to shut down.
    pub fn is_settled(&self) -> bool {
        self.position.is_flat() && self.pending.is_none()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Evaluate one tick of the state machine.
    pub async fn tick(&mut self) -> Result<()> {
        match self.position.state {
            PositionState::Flat => self.tick_flat().await,
            PositionState::Entering => self.tick_entering().await,
            PositionState::Open => self.tick_open().await,
            PositionState::Exiting => self.tick_exiting().await,
        }
    }

    // ==================== Flat ====================

    async fn tick_flat(&mut self) -> Result<()> {
        if self.stop_requested() {
            return Ok(());
        }

        let snapshot = match self.fetch_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Skipping tick: no market data");
                return Ok(());
            }
        };

        debug!(
            rate = %snapshot.rate,
            threshold = %self.pair.funding_threshold,
            mark = %snapshot.mark_price,
            spot = %snapshot.spot_price,
            "Funding poll"
        );

        if snapshot.rate < self.pair.funding_threshold {
            if snapshot.rate <= -self.pair.funding_threshold {
                // Negative funding would pay a short-spot/long-perp pair;
                // this variant only trades the long-spot direction.
                debug!(rate = %snapshot.rate, "Negative funding ignored");
            }
            return Ok(());
        }

        let available = match self.available_capital().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "Skipping entry: balance query failed");
                return Ok(());
            }
        };

        let quantities = self.sizer.size(
            available,
            self.pair.target_notional_usd,
            snapshot.spot_price,
            snapshot.mark_price,
        );
        if quantities.is_zero() {
            debug!(%available, "Capital floor not met; staying flat");
            return Ok(());
        }

        let spot_intent = OrderIntent {
            side: OrderSide::Buy,
            symbol: self.pair.spot_symbol.clone(),
            quantity: quantities.spot_qty,
            leg: LegKind::Spot,
        };
        let perp_intent = OrderIntent {
            side: OrderSide::Sell,
            symbol: self.pair.perp_symbol.clone(),
            quantity: quantities.perp_qty,
            leg: LegKind::Perp,
        };

        info!(
            rate = %snapshot.rate,
            spot_qty = %quantities.spot_qty,
            perp_qty = %quantities.perp_qty,
            "Funding favorable; opening hedge pair"
        );

        // Both legs go out concurrently to minimize slippage between them;
        // confirmation is still gated on both before any transition to Open.
        let (spot_result, perp_result) =
            tokio::join!(self.submit(&spot_intent), self.submit(&perp_intent));

        let mut submit_errors: Vec<String> = Vec::new();
        let spot_leg = match spot_result {
            Ok(handle) => PendingLeg::submitted(spot_intent, handle),
            Err(e) => {
                submit_errors.push(format!("spot: {}", e));
                PendingLeg::unsubmitted(spot_intent)
            }
        };
        let perp_leg = match perp_result {
            Ok(handle) => PendingLeg::submitted(perp_intent, handle),
            Err(e) => {
                submit_errors.push(format!("perp: {}", e));
                PendingLeg::unsubmitted(perp_intent)
            }
        };

        if spot_leg.failed && perp_leg.failed {
            // Nothing is live; stay flat
            self.emit(
                AlertKind::ExecutionFailure {
                    detail: submit_errors.join("; "),
                },
                AlertSeverity::Error,
                "Entry aborted: both legs rejected at submission",
            );
            return Ok(());
        }

        if !submit_errors.is_empty() {
            self.emit(
                AlertKind::ExecutionFailure {
                    detail: submit_errors.join("; "),
                },
                AlertSeverity::Error,
                "Entry leg rejected at submission; tracking the live leg",
            );
        }

        self.pending = Some(PendingPair {
            spot: Some(spot_leg),
            perp: Some(perp_leg),
            rate: snapshot.rate,
            spot_price: snapshot.spot_price,
            mark_price: snapshot.mark_price,
            polls: 0,
        });
        self.position.state = PositionState::Entering;
        Ok(())
    }

    // ==================== Entering ====================

    async fn tick_entering(&mut self) -> Result<()> {
        let Some(mut pending) = self.pending.take() else {
            warn!("Entering with no pending orders; resetting to flat");
            self.position.flatten();
            return Ok(());
        };

        self.poll_pending(&mut pending).await;
        pending.polls += 1;

        if pending.all_filled() {
            let spot_qty = pending.filled_qty(LegKind::Spot);
            let perp_qty = pending.filled_qty(LegKind::Perp);

            if self.within_tolerance(spot_qty, perp_qty, pending.spot_price, pending.mark_price) {
                self.position.open(spot_qty, perp_qty, pending.rate);
                info!(
                    %spot_qty,
                    %perp_qty,
                    rate = %pending.rate,
                    "Both legs filled; hedge open"
                );
                self.emit(
                    AlertKind::Entered {
                        spot_qty,
                        perp_qty,
                        funding_rate: pending.rate,
                    },
                    AlertSeverity::Info,
                    format!(
                        "Opened hedge: spot {} / perp {} at funding {}",
                        spot_qty, perp_qty, pending.rate
                    ),
                );
            } else {
                // Fills landed outside the delta-neutrality tolerance; an
                // imbalanced pair must not be held as Open
                self.emit(
                    AlertKind::LegMismatch {
                        detail: format!(
                            "fills out of notional tolerance: spot {} @ {}, perp {} @ {}",
                            spot_qty, pending.spot_price, perp_qty, pending.mark_price
                        ),
                    },
                    AlertSeverity::Critical,
                    "Entry fills imbalanced; unwinding both legs",
                );
                let unwind = self.start_unwind(spot_qty, perp_qty, pending.rate).await;
                self.pending = Some(unwind);
                self.position.state = PositionState::Exiting;
            }
            return Ok(());
        }

        if pending.any_failed() && pending.any_filled() {
            // One leg is live, its pair conclusively is not: the single worst
            // outcome. Unwind the stranded leg immediately.
            self.emit(
                AlertKind::LegMismatch {
                    detail: pending.describe(),
                },
                AlertSeverity::Critical,
                "Leg mismatch on entry; unwinding the filled leg",
            );
            let unwind = self
                .start_unwind(
                    pending.filled_qty(LegKind::Spot),
                    pending.filled_qty(LegKind::Perp),
                    pending.rate,
                )
                .await;
            self.pending = Some(unwind);
            self.position.state = PositionState::Exiting;
            return Ok(());
        }

        if pending.all_failed() {
            self.emit(
                AlertKind::ExecutionFailure {
                    detail: pending.describe(),
                },
                AlertSeverity::Error,
                "Entry failed on both legs; no position taken",
            );
            self.position.flatten();
            return Ok(());
        }

        // Some legs still pending
        if pending.polls >= self.max_fill_polls {
            if pending.any_filled() {
                self.emit(
                    AlertKind::LegMismatch {
                        detail: pending.describe(),
                    },
                    AlertSeverity::Critical,
                    "Fill confirmation timed out with one leg filled; unwinding",
                );
                let unwind = self
                    .start_unwind(
                        pending.filled_qty(LegKind::Spot),
                        pending.filled_qty(LegKind::Perp),
                        pending.rate,
                    )
                    .await;
                self.pending = Some(unwind);
                self.position.state = PositionState::Exiting;
            } else {
                self.emit(
                    AlertKind::ExecutionFailure {
                        detail: pending.describe(),
                    },
                    AlertSeverity::Error,
                    "No fills within the confirmation window; abandoning entry",
                );
                self.position.flatten();
            }
            return Ok(());
        }

        debug!(polls = pending.polls, status = %pending.describe(), "Awaiting entry fills");
        self.pending = Some(pending);
        Ok(())
    }

    // ==================== Open ====================

    async fn tick_open(&mut self) -> Result<()> {
        let (rate, exit_reason) = match self.fetch_snapshot().await {
            Ok(snapshot) => {
                let held_past_window = self
                    .position
                    .held_for(Utc::now())
                    .is_some_and(|held| held > self.max_hold);

                let reason = if self.stop_requested() {
                    Some("stop requested")
                } else if snapshot.rate < self.pair.funding_threshold {
                    Some("funding edge decayed")
                } else if held_past_window {
                    Some("funding window passed")
                } else {
                    None
                };
                (snapshot.rate, reason)
            }
            Err(e) => {
                // A shutdown unwind does not wait for market data
                if self.stop_requested() {
                    (self.position.entry_funding_rate, Some("stop requested"))
                } else {
                    warn!(error = %e, "Skipping tick: no market data");
                    return Ok(());
                }
            }
        };

        let Some(reason) = exit_reason else {
            debug!(%rate, "Funding still favorable; holding");
            return Ok(());
        };

        info!(
            reason,
            %rate,
            spot_qty = %self.position.spot_qty,
            perp_qty = %self.position.perp_qty,
            "Closing hedge pair"
        );

        // Close exactly what is open, never a recomputed size
        let unwind = self
            .start_unwind(self.position.spot_qty, self.position.perp_qty, rate)
            .await;
        self.pending = Some(unwind);
        self.position.state = PositionState::Exiting;
        Ok(())
    }

    // ==================== Exiting ====================

    async fn tick_exiting(&mut self) -> Result<()> {
        let Some(mut pending) = self.pending.take() else {
            warn!("Exiting with no pending orders; resetting to flat");
            self.position.flatten();
            return Ok(());
        };

        // An open hedge that fails to close keeps retrying the remaining leg;
        // this path never gives up.
        self.resubmit_failed(&mut pending).await;
        self.poll_pending(&mut pending).await;

        if pending.all_filled() {
            self.position.flatten();
            info!(rate = %pending.rate, "Both unwind legs filled; flat");
            self.emit(
                AlertKind::Exited {
                    funding_rate: pending.rate,
                },
                AlertSeverity::Info,
                format!("Closed hedge at funding {}", pending.rate),
            );
            return Ok(());
        }

        if pending.any_failed() {
            self.emit(
                AlertKind::LegMismatch {
                    detail: pending.describe(),
                },
                AlertSeverity::Critical,
                "Unwind leg not yet closed; retrying next tick",
            );
        } else if !pending.any_unresolved() {
            // Defensive: no fills, no failures, nothing unresolved
            warn!(status = %pending.describe(), "Unwind in inconsistent state");
        }

        self.pending = Some(pending);
        Ok(())
    }

    // ==================== Helpers ====================

    /// Submit unwind legs for whatever quantities are actually held/filled.
    /// A failed submission is recorded for resubmission, not dropped.
    async fn start_unwind(
        &self,
        spot_qty: Decimal,
        perp_qty: Decimal,
        rate: Decimal,
    ) -> PendingPair {
        let spot = if spot_qty > Decimal::ZERO {
            Some(
                self.submit_unwind_leg(OrderIntent {
                    side: OrderSide::Sell,
                    symbol: self.pair.spot_symbol.clone(),
                    quantity: spot_qty,
                    leg: LegKind::Spot,
                })
                .await,
            )
        } else {
            None
        };

        let perp = if perp_qty > Decimal::ZERO {
            Some(
                self.submit_unwind_leg(OrderIntent {
                    side: OrderSide::Buy,
                    symbol: self.pair.perp_symbol.clone(),
                    quantity: perp_qty,
                    leg: LegKind::Perp,
                })
                .await,
            )
        } else {
            None
        };

        PendingPair {
            spot,
            perp,
            rate,
            spot_price: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            polls: 0,
        }
    }

    async fn submit_unwind_leg(&self, intent: OrderIntent) -> PendingLeg {
        match self.submit(&intent).await {
            Ok(handle) => PendingLeg::submitted(intent, handle),
            Err(e) => {
                warn!(
                    error = %e,
                    leg = intent.leg.as_str(),
                    "Unwind submission failed; will retry"
                );
                PendingLeg::unsubmitted(intent)
            }
        }
    }

    async fn resubmit_failed(&self, pending: &mut PendingPair) {
        for slot in [&mut pending.spot, &mut pending.perp] {
            let Some(leg) = slot.as_mut() else { continue };
            if !leg.failed || leg.filled.is_some() {
                continue;
            }
            info!(leg = leg.intent.leg.as_str(), "Resubmitting unwind leg");
            match self.submit(&leg.intent).await {
                Ok(handle) => {
                    leg.handle = Some(handle);
                    leg.failed = false;
                }
                Err(e) => {
                    warn!(error = %e, "Unwind resubmission failed; will retry");
                }
            }
        }
    }

    async fn poll_pending(&self, pending: &mut PendingPair) {
        for slot in [&mut pending.spot, &mut pending.perp] {
            let Some(leg) = slot.as_mut() else { continue };
            if leg.resolved() {
                continue;
            }
            let Some(handle) = leg.handle.as_ref() else {
                continue;
            };

            match self.poll_order(handle).await {
                Ok(FillStatus::Filled(qty)) => {
                    info!(
                        leg = leg.intent.leg.as_str(),
                        order_id = %handle.order_id,
                        %qty,
                        "Leg filled"
                    );
                    leg.filled = Some(qty);
                }
                Ok(FillStatus::Cancelled) => {
                    warn!(
                        leg = leg.intent.leg.as_str(),
                        order_id = %handle.order_id,
                        "Leg cancelled by venue"
                    );
                    leg.failed = true;
                }
                Ok(FillStatus::Pending) => {}
                Err(e) => {
                    // Transport errors stay contained in this tick
                    warn!(
                        error = %e,
                        leg = leg.intent.leg.as_str(),
                        "Fill poll failed"
                    );
                }
            }
        }
    }

    fn within_tolerance(
        &self,
        spot_qty: Decimal,
        perp_qty: Decimal,
        spot_price: Decimal,
        mark_price: Decimal,
    ) -> bool {
        let imbalance = (spot_qty * spot_price - perp_qty * mark_price).abs();
        safe_div(imbalance, self.pair.target_notional_usd) <= self.notional_tolerance
    }

    fn emit(&self, kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) {
        self.alerts.emit(AlertEvent::new(kind, severity, message));
    }

    async fn fetch_snapshot(&self) -> Result<FundingSnapshot, MarketDataError> {
        timeout(self.call_timeout, self.market.snapshot(&self.pair))
            .await
            .unwrap_or(Err(MarketDataError::Timeout))
    }

    async fn available_capital(&self) -> Result<Decimal, ExecutionError> {
        timeout(self.call_timeout, self.execution.available_capital_usd())
            .await
            .unwrap_or(Err(ExecutionError::Timeout))
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<OrderHandle, ExecutionError> {
        timeout(self.call_timeout, self.execution.submit(intent))
            .await
            .unwrap_or(Err(ExecutionError::Timeout))
    }

    async fn poll_order(&self, handle: &OrderHandle) -> Result<FillStatus, ExecutionError> {
        timeout(self.call_timeout, self.execution.poll_fill(handle))
            .await
            .unwrap_or(Err(ExecutionError::Timeout))
    }
}
