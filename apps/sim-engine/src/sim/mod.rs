//! The simulation core: clock, admission, matching, and bookkeeping.
//!
//! `controller` composes everything else; the remaining modules are pure or
//! near-pure and independently testable.

pub mod accounts;
pub mod calendar;
pub mod clock;
pub mod controller;
pub mod day_trades;
pub mod matching;
pub mod positions;
pub mod validator;

pub use controller::{
    AccountUpdate, AdvanceReport, AdvanceSpec, OrderRequest, SessionController, SessionSpec,
};
pub use day_trades::{DayTradeTracker, TradeValidation};
pub use matching::{Fill, MatchOutcome};
pub use validator::{ValidationContext, Violation};
