//! Core data model for the simulated brokerage.

pub mod account;
pub mod bar;
pub mod order;
pub mod position;
pub mod session;

pub use account::Account;
pub use bar::{Bar, Quote, Resolution};
pub use order::{Order, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use position::{Position, PositionSide};
pub use session::{PlaybackState, Session, SessionStatus};
