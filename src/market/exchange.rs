//! Exchange order abstraction for live mode - enables mocking for tests

use async_trait::async_trait;

use crate::grid::errors::EngineResult;
use crate::grid::types::Side;

/// Exchange order operations. Live mode only; the backtester simulates fills
/// itself.
#[async_trait]
pub trait ExchangeOrders: Send + Sync {
    /// Place a market order, returning the confirmed fill price
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        size: f64,
        leverage: u32,
    ) -> EngineResult<f64>;

    /// Close an open position with a market order, returning the fill price
    async fn close_position(&self, symbol: &str, side: Side, size: f64) -> EngineResult<f64>;
}

/// Mock exchange for testing the live runner without a venue connection.
pub mod mock {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::grid::errors::EngineError;

    use super::*;

    /// Records orders and fills everything at a settable price
    pub struct MockExchange {
        pub fills: Arc<Mutex<Vec<(String, Side, f64)>>>,
        pub fill_price: Arc<Mutex<f64>>,
        pub should_fail: Arc<Mutex<bool>>,
    }

    impl MockExchange {
        pub fn new(fill_price: f64) -> Self {
            Self {
                fills: Arc::new(Mutex::new(Vec::new())),
                fill_price: Arc::new(Mutex::new(fill_price)),
                should_fail: Arc::new(Mutex::new(false)),
            }
        }

        pub async fn set_fill_price(&self, price: f64) {
            *self.fill_price.lock().await = price;
        }

        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.lock().await = fail;
        }
    }

    #[async_trait]
    impl ExchangeOrders for MockExchange {
        async fn place_market_order(
            &self,
            symbol: &str,
            side: Side,
            size: f64,
            _leverage: u32,
        ) -> EngineResult<f64> {
            if *self.should_fail.lock().await {
                return Err(EngineError::ExternalOrderFailure("mock failure".into()));
            }
            self.fills.lock().await.push((symbol.into(), side, size));
            Ok(*self.fill_price.lock().await)
        }

        async fn close_position(&self, symbol: &str, side: Side, size: f64) -> EngineResult<f64> {
            if *self.should_fail.lock().await {
                return Err(EngineError::ExternalOrderFailure("mock failure".into()));
            }
            self.fills
                .lock()
                .await
                .push((symbol.into(), side.opposite(), size));
            Ok(*self.fill_price.lock().await)
        }
    }
}
