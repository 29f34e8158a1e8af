//! External decision-oracle contract.
//!
//! The oracle is an abstract recommendation source (an AI service or
//! anything else). The engine never trusts it blindly: the call is
//! timeout-bounded, low-confidence advice is discarded, and every failure
//! degrades to a hold for this cycle only.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grid::errors::EngineError;
use crate::signal::SignalSnapshot;

/// Market context handed to the oracle on each consultation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketReport {
    pub symbol: String,
    pub price: f64,
    pub equity: f64,
    pub open_position_count: usize,
    pub signals: SignalSnapshot,
}

/// What the oracle may recommend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OracleAction {
    Hold,
    ClosePosition { position_id: Uuid },
    CloseAll,
    Rebalance,
}

/// Oracle recommendation with its own confidence estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAdvice {
    #[serde(flatten)]
    pub action: OracleAction,
    /// In [0, 1]; advice below the configured threshold is ignored
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_min_confidence() -> f64 {
    0.6
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Abstract recommendation source
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn propose(&self, report: &MarketReport) -> Result<OracleAdvice, EngineError>;
}

/// Consult the oracle with a timeout. Timeout, error, and low confidence all
/// collapse to `Hold` with a warning; there is no in-cycle retry.
pub async fn consult(
    oracle: &dyn DecisionOracle,
    report: &MarketReport,
    settings: &OracleSettings,
) -> OracleAction {
    let deadline = Duration::from_millis(settings.timeout_ms);
    match tokio::time::timeout(deadline, oracle.propose(report)).await {
        Err(_) => {
            warn!(
                "oracle timed out after {}ms for {}, holding",
                settings.timeout_ms, report.symbol
            );
            OracleAction::Hold
        }
        Ok(Err(err)) => {
            warn!("oracle error for {}: {err}, holding", report.symbol);
            OracleAction::Hold
        }
        Ok(Ok(advice)) => {
            if advice.confidence < settings.min_confidence {
                warn!(
                    "oracle advice for {} below confidence threshold ({:.2} < {:.2}), holding",
                    report.symbol, advice.confidence, settings.min_confidence
                );
                OracleAction::Hold
            } else {
                advice.action
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TrendDirection;

    struct FixedOracle {
        advice: OracleAdvice,
        delay_ms: u64,
        fail: bool,
    }

    #[async_trait]
    impl DecisionOracle for FixedOracle {
        async fn propose(&self, _report: &MarketReport) -> Result<OracleAdvice, EngineError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(EngineError::OracleError("unavailable".into()));
            }
            Ok(self.advice.clone())
        }
    }

    fn report() -> MarketReport {
        MarketReport {
            symbol: "BTC".into(),
            price: 50_000.0,
            equity: 10_000.0,
            open_position_count: 1,
            signals: SignalSnapshot {
                trend_direction: TrendDirection::Up,
                trend_strength: 0.5,
                volatility_pct: 1.0,
                volume_anomaly_strength: 0.0,
                velocity_pct: 0.0,
                is_panic: false,
            },
        }
    }

    fn close_all(confidence: f64) -> OracleAdvice {
        OracleAdvice {
            action: OracleAction::CloseAll,
            confidence,
            reasoning: "regime change".into(),
        }
    }

    #[tokio::test]
    async fn test_confident_advice_passes_through() {
        let oracle = FixedOracle {
            advice: close_all(0.9),
            delay_ms: 0,
            fail: false,
        };
        let action = consult(&oracle, &report(), &OracleSettings::default()).await;
        assert_eq!(action, OracleAction::CloseAll);
    }

    #[tokio::test]
    async fn test_low_confidence_degrades_to_hold() {
        let oracle = FixedOracle {
            advice: close_all(0.4),
            delay_ms: 0,
            fail: false,
        };
        let action = consult(&oracle, &report(), &OracleSettings::default()).await;
        assert_eq!(action, OracleAction::Hold);
    }

    #[tokio::test]
    async fn test_error_degrades_to_hold() {
        let oracle = FixedOracle {
            advice: close_all(0.9),
            delay_ms: 0,
            fail: true,
        };
        let action = consult(&oracle, &report(), &OracleSettings::default()).await;
        assert_eq!(action, OracleAction::Hold);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_hold() {
        let oracle = FixedOracle {
            advice: close_all(0.9),
            delay_ms: 10_000,
            fail: false,
        };
        let settings = OracleSettings {
            timeout_ms: 100,
            ..OracleSettings::default()
        };
        let action = consult(&oracle, &report(), &settings).await;
        assert_eq!(action, OracleAction::Hold);
    }
}
