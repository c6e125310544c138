//! OHLCV bar and quote types shared with the bar store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Bar resolution supported by the bar store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// One-minute bars.
    Minute,
    /// One-hour bars.
    Hour,
    /// Daily bars.
    Day,
    /// Weekly bars.
    Week,
    /// Monthly bars.
    Month,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        };
        write!(f, "{s}")
    }
}

/// Aggregated OHLCV data for one symbol over one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Uppercase symbol.
    pub symbol: String,
    /// Window start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
    /// Volume-weighted average price, when the vendor supplied one.
    pub vwap: Option<Decimal>,
    /// Number of trades in the window, when the vendor supplied one.
    pub trade_count: Option<u32>,
}

impl Bar {
    /// High-low range of the bar.
    #[must_use]
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Check whether a price level was touched during this bar.
    #[must_use]
    pub fn price_touched(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }

    /// Structural sanity: `low <= open <= high`, `low <= close <= high`,
    /// `volume >= 0`.
    #[must_use]
    pub fn is_coherent(&self) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// Half-spread applied around the bar close when synthesizing a quote.
const QUOTE_SPREAD_FRACTION: Decimal = dec!(0.0005);

/// Synthetic bid/ask quote derived from a bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Uppercase symbol.
    pub symbol: String,
    /// Quote timestamp (the bar's window start).
    pub timestamp: DateTime<Utc>,
    /// Bid price.
    pub bid_price: Decimal,
    /// Ask price.
    pub ask_price: Decimal,
    /// Synthetic bid size.
    pub bid_size: u32,
    /// Synthetic ask size.
    pub ask_size: u32,
}

impl Quote {
    /// Synthesize a quote from a bar: bid/ask straddle the close by
    /// `0.0005 * (high - low)`.
    #[must_use]
    pub fn from_bar(bar: &Bar) -> Self {
        let half_spread = QUOTE_SPREAD_FRACTION * bar.range();
        Self {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            bid_price: bar.close - half_spread,
            ask_price: bar.close + half_spread,
            bid_size: 100,
            ask_size: 100,
        }
    }
}
