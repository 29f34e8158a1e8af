//! Core data types for the grid position engine

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position side for grid levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Short label for logging and events
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Lifecycle status of an individual grid level.
///
/// Status only ever advances: `Pending` -> `Open` -> `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStatus {
    /// Level exists but holds no position
    Pending,
    /// Level is backed by an open position
    Open,
    /// The position at this level was closed; the level is retired
    Closed,
}

impl LevelStatus {
    /// Check whether a transition to `next` is a legal forward step
    pub fn can_advance_to(&self, next: LevelStatus) -> bool {
        matches!(
            (self, next),
            (LevelStatus::Pending, LevelStatus::Open) | (LevelStatus::Open, LevelStatus::Closed)
        )
    }
}

/// Individual grid level tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    /// Level id, unique for the life of a strategy run (survives rebalances)
    pub id: u32,
    /// Price at this level (immutable once created)
    pub price: f64,
    /// Side a fill at this level would open
    pub side: Side,
    /// Notional allocated to this level, fixed at grid-build time
    pub size_notional: f64,
    /// Base-asset size implied by `size_notional` at the level price
    pub size_base: f64,
    /// Whether this level is capital-backed (real) or merely tracked (virtual)
    pub is_real: bool,
    /// Current lifecycle status
    pub status: LevelStatus,
    /// Creation timestamp (ms since epoch)
    pub created_at: i64,
}

impl GridLevel {
    pub fn new(id: u32, price: f64, side: Side, size_notional: f64, created_at: i64) -> Self {
        Self {
            id,
            price,
            side,
            size_notional,
            size_base: size_notional / price,
            is_real: false,
            status: LevelStatus::Pending,
            created_at,
        }
    }

    /// A level is eligible for real/virtual selection until it retires
    pub fn is_selectable(&self) -> bool {
        self.status != LevelStatus::Closed
    }

    /// Distance from the given price, used for real/virtual selection
    pub fn distance_from(&self, price: f64) -> f64 {
        (self.price - price).abs()
    }
}

/// An open (or historical) position created when a grid level fills
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    /// Size in base-asset units
    pub size: f64,
    pub leverage: u32,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Id of the grid level this position belongs to
    pub level_id: u32,
    /// Open timestamp (ms since epoch)
    pub opened_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<f64>,
}

impl Position {
    /// Notional value at entry
    pub fn notional(&self) -> f64 {
        self.entry_price * self.size
    }

    /// PnL if the position were closed at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - price) * self.size,
        }
    }

    /// Whether the candle range touches the stop-loss price
    pub fn stop_hit(&self, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => low <= self.stop_loss,
            Side::Short => high >= self.stop_loss,
        }
    }

    /// Whether the candle range touches the take-profit price
    pub fn take_profit_hit(&self, high: f64, low: f64) -> bool {
        match self.side {
            Side::Long => high >= self.take_profit,
            Side::Short => low <= self.take_profit,
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    OracleClose,
    Panic,
    Rebalance,
    EndOfData,
}

/// A completed trade: the closed position plus exit details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
}

impl ClosedTrade {
    /// Realized PnL of the trade (gross of fees)
    pub fn pnl(&self) -> f64 {
        self.position.realized_pnl.unwrap_or(0.0)
    }
}

/// Structured events produced for the dashboard/logging layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridEvent {
    LevelFilled {
        level_id: u32,
        side: Side,
        fill_price: f64,
        size: f64,
        timestamp: i64,
    },
    LevelClosed {
        level_id: u32,
        exit_price: f64,
        pnl: f64,
        reason: ExitReason,
        timestamp: i64,
    },
    Rebalanced {
        old_center: f64,
        new_center: f64,
        carried_positions: usize,
        timestamp: i64,
    },
    RiskRejected {
        action: String,
        reason: String,
        timestamp: i64,
    },
}

/// Sink for structured events
pub trait EventSink: Send {
    fn emit(&mut self, event: &GridEvent);
}

/// Default sink: forwards events to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &GridEvent) {
        match event {
            GridEvent::RiskRejected { action, reason, .. } => {
                log::warn!("risk rejected {action}: {reason}")
            }
            GridEvent::Rebalanced {
                old_center,
                new_center,
                carried_positions,
                timestamp,
            } => log::info!(
                "rebalanced {old_center:.2} -> {new_center:.2} ({carried_positions} carried) at {}",
                format_timestamp(*timestamp)
            ),
            _ => log::info!("event: {event:?}"),
        }
    }
}

/// Sink that records events into a shared buffer, for tests and reporting
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<GridEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<GridEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &GridEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Render a ms-since-epoch timestamp for logs
pub fn format_timestamp(ts_ms: i64) -> String {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}
