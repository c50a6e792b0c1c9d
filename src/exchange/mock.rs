//! Mock market-data and execution ports for paper trading and tests.

use super::ports::{Execution, ExecutionError, MarketData, MarketDataError};
use super::types::*;
use crate::config::PairConfig;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Scriptable market data source.
///
/// Holds one current market state; tests mutate it between ticks to walk the
/// strategy through funding-rate scenarios.
#[derive(Debug)]
pub struct MockMarketData {
    state: RwLock<MockMarketState>,
}

#[derive(Debug)]
struct MockMarketState {
    rate: Decimal,
    mark_price: Decimal,
    spot_price: Decimal,
    fail_next: u32,
}

impl MockMarketData {
    pub fn new(rate: Decimal, mark_price: Decimal, spot_price: Decimal) -> Self {
        Self {
            state: RwLock::new(MockMarketState {
                rate,
                mark_price,
                spot_price,
                fail_next: 0,
            }),
        }
    }

    /// Replace the current market state.
    pub async fn set_market(&self, rate: Decimal, mark_price: Decimal, spot_price: Decimal) {
        let mut state = self.state.write().await;
        state.rate = rate;
        state.mark_price = mark_price;
        state.spot_price = spot_price;
    }

    /// Update only the funding rate.
    pub async fn set_rate(&self, rate: Decimal) {
        self.state.write().await.rate = rate;
    }

    /// Make the next `n` snapshot calls fail with `Unavailable`.
    pub async fn fail_next(&self, n: u32) {
        self.state.write().await.fail_next = n;
    }
}

#[async_trait]
impl MarketData for MockMarketData {
    async fn snapshot(&self, _pair: &PairConfig) -> Result<FundingSnapshot, MarketDataError> {
        let mut state = self.state.write().await;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(MarketDataError::Unavailable("scripted failure".to_string()));
        }

        Ok(FundingSnapshot {
            rate: state.rate,
            mark_price: state.mark_price,
            spot_price: state.spot_price,
            observed_at: Utc::now(),
        })
    }
}

/// How a submitted order should behave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillBehavior {
    /// Fill in full on the first poll
    Immediate,
    /// Report pending for `n` polls, then fill in full
    AfterPolls(u32),
    /// Refuse the submission outright
    RejectSubmit,
    /// Accept the submission but report cancelled on the first poll
    CancelOnPoll,
    /// Accept the submission and stay pending forever
    NeverFill,
}

#[derive(Debug, Clone)]
struct MockOrder {
    intent: OrderIntent,
    behavior: FillBehavior,
    polls_seen: u32,
}

#[derive(Debug, Default)]
struct MockExecState {
    orders: HashMap<String, MockOrder>,
    submitted: Vec<OrderIntent>,
    spot_behavior: Option<FillBehavior>,
    perp_behavior: Option<FillBehavior>,
}

/// Simulated execution venue.
///
/// Default behavior fills every order in full on the first poll, which is
/// what the paper-trading mode wants; tests override per-leg behavior to
/// script rejections, slow fills, and cancellations.
pub struct MockExecution {
    state: RwLock<MockExecState>,
    available_usd: RwLock<Decimal>,
    order_id_counter: AtomicU64,
}

impl MockExecution {
    /// Create a venue with the given free USDT balance.
    pub fn new(available_usd: Decimal) -> Self {
        Self {
            state: RwLock::new(MockExecState::default()),
            available_usd: RwLock::new(available_usd),
            order_id_counter: AtomicU64::new(1),
        }
    }

    /// Paper-trading default: $10k and instant fills.
    pub fn paper() -> Self {
        Self::new(dec!(10000))
    }

    /// Override the balance reported to the sizer.
    pub async fn set_available_usd(&self, available: Decimal) {
        *self.available_usd.write().await = available;
    }

    /// Script the next submissions for one leg. `None` restores the default.
    pub async fn set_behavior(&self, leg: LegKind, behavior: Option<FillBehavior>) {
        let mut state = self.state.write().await;
        match leg {
            LegKind::Spot => state.spot_behavior = behavior,
            LegKind::Perp => state.perp_behavior = behavior,
        }
    }

    /// Every intent accepted or rejected so far, in submission order.
    pub async fn submitted(&self) -> Vec<OrderIntent> {
        self.state.read().await.submitted.clone()
    }

    /// Number of submissions seen so far.
    pub async fn submission_count(&self) -> usize {
        self.state.read().await.submitted.len()
    }

    fn next_order_id(&self) -> String {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl Execution for MockExecution {
    async fn available_capital_usd(&self) -> Result<Decimal, ExecutionError> {
        Ok(*self.available_usd.read().await)
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<OrderHandle, ExecutionError> {
        let mut state = self.state.write().await;
        state.submitted.push(intent.clone());

        let behavior = match intent.leg {
            LegKind::Spot => state.spot_behavior,
            LegKind::Perp => state.perp_behavior,
        }
        .unwrap_or(FillBehavior::Immediate);

        if behavior == FillBehavior::RejectSubmit {
            debug!(leg = intent.leg.as_str(), "Mock rejecting submission");
            return Err(ExecutionError::Rejected("scripted rejection".to_string()));
        }

        let order_id = self.next_order_id();
        state.orders.insert(
            order_id.clone(),
            MockOrder {
                intent: intent.clone(),
                behavior,
                polls_seen: 0,
            },
        );

        info!(
            order_id,
            symbol = %intent.symbol,
            side = intent.side.as_str(),
            leg = intent.leg.as_str(),
            quantity = %intent.quantity,
            "Mock order accepted"
        );

        Ok(OrderHandle {
            leg: intent.leg,
            symbol: intent.symbol.clone(),
            order_id,
        })
    }

    async fn poll_fill(&self, handle: &OrderHandle) -> Result<FillStatus, ExecutionError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&handle.order_id)
            .ok_or_else(|| ExecutionError::Transport("unknown order".to_string()))?;

        order.polls_seen += 1;
        let status = match order.behavior {
            FillBehavior::Immediate => FillStatus::Filled(order.intent.quantity),
            FillBehavior::AfterPolls(n) if order.polls_seen > n => {
                FillStatus::Filled(order.intent.quantity)
            }
            FillBehavior::AfterPolls(_) => FillStatus::Pending,
            FillBehavior::CancelOnPoll => FillStatus::Cancelled,
            FillBehavior::NeverFill => FillStatus::Pending,
            FillBehavior::RejectSubmit => unreachable!("rejected orders are never stored"),
        };

        Ok(status)
    }
}
