//! External collaborator contracts: candle data and exchange orders

pub mod candles;
pub mod exchange;

pub use candles::{Candle, CandleSource, JsonFileSource};
pub use exchange::ExchangeOrders;
