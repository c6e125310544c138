//! End-to-end flows through the session controller over in-memory stores.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sim_engine::error::SimError;
use sim_engine::models::{Bar, OrderSide, OrderStatus, OrderType, TimeInForce};
use sim_engine::sim::{AdvanceSpec, OrderRequest, SessionController, SessionSpec};
use sim_engine::storage::{InMemoryBarStore, InMemorySessionStore};

type Controller = SessionController<InMemoryBarStore, InMemorySessionStore>;

struct Harness {
    bars: Arc<InMemoryBarStore>,
    controller: Arc<Controller>,
}

fn harness() -> Harness {
    let bars = Arc::new(InMemoryBarStore::new());
    let store = Arc::new(InMemorySessionStore::new());
    let controller = Arc::new(SessionController::new(Arc::clone(&bars), store));
    Harness { bars, controller }
}

fn t(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, day, hour, minute, 0).unwrap()
}

fn bar(
    symbol: &str,
    at: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        timestamp: at,
        open,
        high,
        low,
        close,
        volume: Decimal::from(volume),
        vwap: None,
        trade_count: None,
    }
}

fn flat_bar(symbol: &str, at: DateTime<Utc>, price: Decimal) -> Bar {
    bar(symbol, at, price, price, price, price, 1_000_000)
}

fn market(symbol: &str, side: OrderSide, qty: Decimal) -> OrderRequest {
    OrderRequest {
        symbol: symbol.to_string(),
        qty: Some(qty),
        notional: None,
        side,
        order_type: OrderType::Market,
        time_in_force: TimeInForce::Day,
        limit_price: None,
        stop_price: None,
        trail_price: None,
        trail_percent: None,
        extended_hours: false,
        client_order_id: None,
    }
}

fn limit(
    symbol: &str,
    side: OrderSide,
    qty: Decimal,
    price: Decimal,
    tif: TimeInForce,
) -> OrderRequest {
    OrderRequest {
        symbol: symbol.to_string(),
        qty: Some(qty),
        notional: None,
        side,
        order_type: OrderType::Limit,
        time_in_force: tif,
        limit_price: Some(price),
        stop_price: None,
        trail_price: None,
        trail_percent: None,
        extended_hours: false,
        client_order_id: None,
    }
}

async fn session_with_account(
    h: &Harness,
    initial_cash: Decimal,
) -> (String, String) {
    let session = h
        .controller
        .create_session(
            "test-key",
            SessionSpec {
                sim_start: t(3, 14, 30),
                sim_end: Utc.with_ymd_and_hms(2023, 12, 29, 21, 0, 0).unwrap(),
                initial_cash,
            },
        )
        .await
        .unwrap();
    let account = h
        .controller
        .create_account(&session.id, None)
        .await
        .unwrap();
    (session.id, account.id)
}

// A market buy fills at the open with adverse slippage.
#[tokio::test]
async fn market_fill_with_slippage() {
    let h = harness();
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 30),
        dec!(150),
        dec!(152),
        dec!(149),
        dec!(151),
        1_000_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    let order = h
        .controller
        .submit_order(&session_id, &account_id, market("AAPL", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    let fill_price = order.filled_avg_price.unwrap();
    // Slippage pushes toward the high: open 150 + 0.10 * (152 - 149)
    assert_eq!(fill_price, dec!(150.3));
    assert!(fill_price >= dec!(150) && fill_price <= dec!(152));

    let account = h
        .controller
        .get_account(&session_id, &account_id)
        .await
        .unwrap();
    assert_eq!(account.cash, dec!(100000) - dec!(10) * fill_price);

    let position = h
        .controller
        .get_position(&session_id, &account_id, "AAPL")
        .await
        .unwrap();
    assert_eq!(position.qty, dec!(10));
    assert_eq!(position.avg_entry_price, fill_price);

    // equity = cash + long - |short| holds after the fill
    assert_eq!(
        account.equity,
        account.cash + account.long_market_value - account.short_market_value.abs()
    );
}

// A limit order that cannot fill stays working.
#[tokio::test]
async fn limit_not_filled_remains_accepted() {
    let h = harness();
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 30),
        dec!(150),
        dec!(155),
        dec!(148),
        dec!(151),
        1_000_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(10), dec!(145), TimeInForce::Gtc),
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);

    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    assert!(report.filled.is_empty());

    let order = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);
    assert_eq!(order.filled_qty, Decimal::ZERO);

    let account = h
        .controller
        .get_account(&session_id, &account_id)
        .await
        .unwrap();
    assert_eq!(account.cash, dec!(100000));
}

// A sell stop triggers and closes the position.
#[tokio::test]
async fn sell_stop_triggered_closes_position() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 31),
        dec!(149),
        dec!(149.5),
        dec!(147.5),
        dec!(148),
        1_000_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    // Open long 10 @ 150 on the flat bar (no slippage)
    let entry = h
        .controller
        .submit_order(&session_id, &account_id, market("AAPL", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();
    assert_eq!(entry.filled_avg_price, Some(dec!(150)));

    let stop = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            OrderRequest {
                symbol: "AAPL".to_string(),
                qty: Some(dec!(10)),
                notional: None,
                side: OrderSide::Sell,
                order_type: OrderType::Stop,
                time_in_force: TimeInForce::Gtc,
                limit_price: None,
                stop_price: Some(dec!(148)),
                trail_price: None,
                trail_percent: None,
                extended_hours: false,
                client_order_id: None,
            },
        )
        .await
        .unwrap();

    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(report.filled, vec![stop.id.clone()]);

    let stop = h.controller.get_order(&session_id, &stop.id).await.unwrap();
    assert_eq!(stop.status, OrderStatus::Filled);
    let fill_price = stop.filled_avg_price.unwrap();
    // min(open, stop) = 148 with slippage toward the low, inside the bar
    assert_eq!(fill_price, dec!(147.8));
    assert!(fill_price >= dec!(147.5) && fill_price <= dec!(149));

    // Position closed; realized P&L = 10 * (fill - 150)
    assert!(matches!(
        h.controller.get_position(&session_id, &account_id, "AAPL").await,
        Err(SimError::NotFound(_))
    ));
    let session = h.controller.get_session(&session_id).await.unwrap();
    assert_eq!(session.realized_pl, dec!(10) * (fill_price - dec!(150)));
}

// An IOC order fills the participation cap and cancels the rest.
#[tokio::test]
async fn ioc_partial_then_cancel() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(200)));
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 31),
        dec!(200),
        dec!(201),
        dec!(199),
        dec!(200),
        1_000_000,
    ));
    let (session_id, account_id) =
        session_with_account(&h, dec!(3000000000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit(
                "AAPL",
                OrderSide::Buy,
                dec!(10000000),
                dec!(200),
                TimeInForce::Ioc,
            ),
        )
        .await
        .unwrap();

    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();

    let order = h.controller.get_order(&session_id, &order.id).await.unwrap();
    // 1% of 1,000,000 volume
    assert_eq!(order.filled_qty, dec!(10000));
    assert_eq!(order.status, OrderStatus::Canceled);
    assert!(order.filled_avg_price.unwrap() <= dec!(200));
}

// A FOK order is rejected when the volume cap cannot cover it.
#[tokio::test]
async fn fok_rejected_on_volume() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 31),
        dec!(150),
        dec!(152),
        dec!(149),
        dec!(151),
        100_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(2000000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(10000), dec!(150), TimeInForce::Fok),
        )
        .await
        .unwrap();

    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(report.rejected, vec![order.id.clone()]);

    let order = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.filled_qty, Decimal::ZERO);
}

// GTC orders expire at 90 days.
#[tokio::test]
async fn gtc_expires_after_ninety_days() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(10), dec!(100), TimeInForce::Gtc),
        )
        .await
        .unwrap();

    // 2023-04-04 is day 91 after 2023-01-03
    let report = h
        .controller
        .advance_time(
            &session_id,
            AdvanceSpec::To(Utc.with_ymd_and_hms(2023, 4, 4, 14, 30, 0).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(report.expired, vec![order.id.clone()]);

    let order = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert!(order.expired_at.is_some());
}

// Day order expires on the first advance whose date passes submission.
#[tokio::test]
async fn day_order_expires_on_date_rollover() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(10), dec!(100), TimeInForce::Day),
        )
        .await
        .unwrap();

    // Still the same date: stays working
    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::hours(6)))
        .await
        .unwrap();
    let working = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(working.status, OrderStatus::Accepted);

    // Next day: expired
    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::hours(18)))
        .await
        .unwrap();
    assert_eq!(report.expired, vec![order.id]);
}

// The third day trade warns; the fourth is rejected.
#[tokio::test]
async fn pdt_fourth_day_trade_rejected() {
    let h = harness();
    for symbol in ["AAPL", "MSFT", "NVDA", "TSLA"] {
        h.bars.insert(flat_bar(symbol, t(3, 14, 30), dec!(100)));
    }
    let (session_id, account_id) = session_with_account(&h, dec!(20000)).await;

    // Three same-day round trips on distinct symbols
    for symbol in ["AAPL", "MSFT", "NVDA"] {
        h.controller
            .submit_order(&session_id, &account_id, market(symbol, OrderSide::Buy, dec!(10)))
            .await
            .unwrap();
        h.controller
            .submit_order(&session_id, &account_id, market(symbol, OrderSide::Sell, dec!(10)))
            .await
            .unwrap();
    }

    let account = h
        .controller
        .get_account(&session_id, &account_id)
        .await
        .unwrap();
    assert_eq!(account.daytrade_count, 3);
    assert!(!account.pattern_day_trader);

    // Open a fourth position; the opening buy itself is allowed
    h.controller
        .submit_order(&session_id, &account_id, market("TSLA", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();

    // Closing it today would be the fourth day trade under $25k equity
    let err = h
        .controller
        .submit_order(&session_id, &account_id, market("TSLA", OrderSide::Sell, dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::PdtViolation(_)));

    // The rejected order is persisted as rejected
    let orders = h.controller.list_orders(&session_id, &account_id).await.unwrap();
    assert!(orders.iter().any(|o| o.status == OrderStatus::Rejected));
}

#[tokio::test]
async fn insufficient_buying_power_rejects_and_persists() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    let (session_id, account_id) = session_with_account(&h, dec!(1000)).await;

    let err = h
        .controller
        .submit_order(&session_id, &account_id, market("AAPL", OrderSide::Buy, dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::InsufficientFunds(_)));

    let orders = h.controller.list_orders(&session_id, &account_id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Rejected);
}

#[tokio::test]
async fn validation_failure_collects_violations() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    // Limit order without a limit price
    let err = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            OrderRequest {
                symbol: "AAPL".to_string(),
                qty: Some(dec!(10)),
                notional: None,
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                time_in_force: TimeInForce::Day,
                limit_price: None,
                stop_price: None,
                trail_price: None,
                trail_percent: None,
                extended_hours: false,
                client_order_id: None,
            },
        )
        .await
        .unwrap_err();
    let SimError::InvalidArgument { field, .. } = err else {
        panic!("expected InvalidArgument, got {err:?}");
    };
    assert_eq!(field.as_deref(), Some("limit_price"));
}

#[tokio::test]
async fn duplicate_client_order_id_within_a_day_conflicts() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    let mut request = limit("AAPL", OrderSide::Buy, dec!(1), dec!(100), TimeInForce::Gtc);
    request.client_order_id = Some("dup-1".to_string());
    h.controller
        .submit_order(&session_id, &account_id, request.clone())
        .await
        .unwrap();

    let err = h
        .controller
        .submit_order(&session_id, &account_id, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::Conflict(_)));

    // A day later the id is free again
    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::hours(25)))
        .await
        .unwrap();
    h.controller
        .submit_order(&session_id, &account_id, request)
        .await
        .unwrap();
}

#[tokio::test]
async fn advance_by_then_advance_to_now_is_noop() {
    let h = harness();
    let (session_id, _) = session_with_account(&h, dec!(100000)).await;

    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(5)))
        .await
        .unwrap();
    let before = h.controller.get_session(&session_id).await.unwrap();

    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::To(before.sim_now))
        .await
        .unwrap();
    assert_eq!(report.prev, report.now);

    let after = h.controller.get_session(&session_id).await.unwrap();
    assert_eq!(after.sim_now, before.sim_now);
}

#[tokio::test]
async fn sim_now_is_monotonic_and_bounded() {
    let h = harness();
    let (session_id, _) = session_with_account(&h, dec!(100000)).await;
    let session = h.controller.get_session(&session_id).await.unwrap();

    let mut previous = session.sim_now;
    for _ in 0..5 {
        let report = h
            .controller
            .advance_time(&session_id, AdvanceSpec::By(Duration::days(100)))
            .await
            .map(|r| r.now);
        match report {
            Ok(now) => {
                assert!(now >= previous);
                assert!(now >= session.sim_start && now <= session.sim_end);
                previous = now;
            }
            // Advancing past the end is a conflict once the clock is exhausted
            Err(SimError::Conflict(_)) => break,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let backwards = h
        .controller
        .advance_time(&session_id, AdvanceSpec::To(session.sim_start))
        .await;
    assert!(matches!(backwards, Err(SimError::InvalidArgument { .. })));
}

#[tokio::test]
async fn partial_fill_accumulates_across_bars() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(100)));
    // 1% of 200,000 = 2,000 per bar
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 31),
        dec!(100),
        dec!(100),
        dec!(100),
        dec!(100),
        200_000,
    ));
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 32),
        dec!(100),
        dec!(100),
        dec!(100),
        dec!(100),
        200_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(1000000)).await;

    let order = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(3000), dec!(100), TimeInForce::Gtc),
        )
        .await
        .unwrap();

    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    let after_first = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(after_first.status, OrderStatus::PartiallyFilled);
    assert_eq!(after_first.filled_qty, dec!(2000));

    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    let after_second = h.controller.get_order(&session_id, &order.id).await.unwrap();
    assert_eq!(after_second.status, OrderStatus::Filled);
    assert_eq!(after_second.filled_qty, dec!(3000));
    assert!(after_second.filled_qty <= after_second.qty.unwrap());
}

#[tokio::test]
async fn short_sale_and_cover_round_trip() {
    let h = harness();
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(150)));
    h.bars.insert(flat_bar("AAPL", t(3, 14, 31), dec!(140)));
    let (session_id, account_id) = session_with_account(&h, dec!(100000)).await;

    h.controller
        .submit_order(&session_id, &account_id, market("AAPL", OrderSide::Sell, dec!(10)))
        .await
        .unwrap();
    let position = h
        .controller
        .get_position(&session_id, &account_id, "AAPL")
        .await
        .unwrap();
    assert_eq!(position.qty, dec!(-10));
    assert_eq!(position.avg_entry_price, dec!(150));

    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    h.controller
        .submit_order(&session_id, &account_id, market("AAPL", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();

    // Short from 150 covered at 140: +100 realized
    let session = h.controller.get_session(&session_id).await.unwrap();
    assert_eq!(session.realized_pl, dec!(100));
    let account = h
        .controller
        .get_account(&session_id, &account_id)
        .await
        .unwrap();
    assert_eq!(account.cash, dec!(100100));
}

#[tokio::test]
async fn quote_synthesized_from_current_bar() {
    let h = harness();
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 30),
        dec!(150),
        dec!(152),
        dec!(149),
        dec!(151),
        1_000_000,
    ));
    let (session_id, _) = session_with_account(&h, dec!(100000)).await;

    let quote = h.controller.quote(&session_id, "aapl").await.unwrap();
    // close +- 0.0005 * (high - low)
    assert_eq!(quote.bid_price, dec!(150.9985));
    assert_eq!(quote.ask_price, dec!(151.0015));

    assert!(matches!(
        h.controller.quote(&session_id, "MSFT").await,
        Err(SimError::NotFound(_))
    ));
}

#[tokio::test]
async fn orders_match_in_submission_order() {
    let h = harness();
    // Neither limit can fill while the price sits at 200
    h.bars.insert(flat_bar("AAPL", t(3, 14, 30), dec!(200)));
    h.bars.insert(bar(
        "AAPL",
        t(3, 14, 32),
        dec!(100),
        dec!(100),
        dec!(100),
        dec!(100),
        100_000,
    ));
    let (session_id, account_id) = session_with_account(&h, dec!(1000000)).await;

    let first = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(600), dec!(100), TimeInForce::Gtc),
        )
        .await
        .unwrap();
    h.controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    let second = h
        .controller
        .submit_order(
            &session_id,
            &account_id,
            limit("AAPL", OrderSide::Buy, dec!(600), dec!(100), TimeInForce::Gtc),
        )
        .await
        .unwrap();

    let report = h
        .controller
        .advance_time(&session_id, AdvanceSpec::By(Duration::minutes(1)))
        .await
        .unwrap();
    // Both fill (no cross-order volume impact), in deterministic order
    assert_eq!(report.filled, vec![first.id, second.id]);
}
