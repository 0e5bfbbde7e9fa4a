//! Plain-text rendering of a market view.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use market_store::{MarketView, SessionState};
use model::Trade;
use orderbook::DepthLevel;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Width of the depth bar at a ratio of 1.
const BAR_WIDTH: usize = 24;

/// Trades listed under the book.
const TRADES_SHOWN: usize = 15;

fn bar(level: &DepthLevel, max_total: Decimal) -> String {
    let cells = (level.depth_ratio(max_total) * Decimal::from(BAR_WIDTH))
        .round()
        .to_usize()
        .unwrap_or(0);
    "#".repeat(cells.min(BAR_WIDTH))
}

fn status_line(view: &MarketView) -> String {
    let marker = match view.state {
        SessionState::Connected => "LIVE",
        SessionState::Connecting => "CONNECTING",
        SessionState::Reconnecting => "RECONNECTING",
        SessionState::Disconnected => "OFFLINE",
        SessionState::ManuallyDisconnected => "PAUSED",
    };
    let mut line = format!("{} [{}] {}", view.symbol, marker, view.state);
    if !view.book_live {
        line.push_str(" (syncing book)");
    }
    if let Some(error) = &view.last_error {
        let _ = write!(line, " | {error}");
    }
    line
}

/// Quote value of a trade, or `-` when it does not fit a decimal.
fn trade_value(trade: &Trade) -> String {
    trade
        .price
        .checked_mul(trade.amount)
        .map_or_else(|| "-".to_string(), |value| value.round_dp(2).to_string())
}

fn trade_time(trade: &Trade) -> String {
    DateTime::<Utc>::from_timestamp_millis(trade.timestamp_ms)
        .map(|t| t.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Render the book (asks above bids, best prices adjacent), spread and recent trades.
pub fn render(view: &MarketView) -> String {
    let depth = &view.depth;
    let mut out = String::new();

    let _ = writeln!(out, "{}", status_line(view));
    let _ = writeln!(out, "{:>16} {:>16} {:>16}", "PRICE", "AMOUNT", "TOTAL");

    for level in depth.asks.iter().rev() {
        let _ = writeln!(
            out,
            "{:>16} {:>16} {:>16}  ask {}",
            level.price,
            level.amount,
            level.total,
            bar(level, depth.max_total)
        );
    }

    let _ = writeln!(
        out,
        "---- spread {} ({}%) ----",
        depth.spread,
        depth.spread_percent.round_dp(4)
    );

    for level in &depth.bids {
        let _ = writeln!(
            out,
            "{:>16} {:>16} {:>16}  bid {}",
            level.price,
            level.amount,
            level.total,
            bar(level, depth.max_total)
        );
    }

    let _ = writeln!(
        out,
        "\nRecent trades\n  {:<12} {:<4} {:>16} {:>16} {:>16}",
        "TIME", "SIDE", "PRICE", "AMOUNT", "VALUE"
    );
    if view.trades.is_empty() {
        let _ = writeln!(out, "  (none yet)");
    }
    for trade in view.trades.iter().take(TRADES_SHOWN) {
        let side = if trade.is_buyer_aggressor { "BUY " } else { "SELL" };
        let _ = writeln!(
            out,
            "  {} {} {:>16} {:>16} {:>16}",
            trade_time(trade),
            side,
            trade.price,
            trade.amount,
            trade_value(trade)
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook::DepthView;
    use rust_decimal_macros::dec;

    fn view() -> MarketView {
        MarketView {
            symbol: "BTCUSDT".to_string(),
            state: SessionState::Connected,
            is_connected: true,
            last_error: None,
            depth: DepthView {
                bids: vec![
                    DepthLevel {
                        price: dec!(99),
                        amount: dec!(2),
                        total: dec!(2),
                    },
                    DepthLevel {
                        price: dec!(98),
                        amount: dec!(2),
                        total: dec!(4),
                    },
                ],
                asks: vec![DepthLevel {
                    price: dec!(101),
                    amount: dec!(1),
                    total: dec!(1),
                }],
                best_bid: Some(dec!(99)),
                best_ask: Some(dec!(101)),
                spread: dec!(2),
                spread_percent: dec!(2.020202),
                max_total: dec!(4),
            },
            trades: vec![Trade {
                id: 1,
                price: dec!(100),
                amount: dec!(0.5),
                timestamp_ms: 0,
                is_buyer_aggressor: true,
            }],
            book_live: true,
            version: 3,
        }
    }

    #[test]
    fn test_bar_scales_with_total() {
        let level = DepthLevel {
            price: dec!(1),
            amount: dec!(1),
            total: dec!(2),
        };
        assert_eq!(bar(&level, dec!(4)).len(), BAR_WIDTH / 2);
        assert_eq!(bar(&level, dec!(2)).len(), BAR_WIDTH);
        assert!(bar(&level, Decimal::ZERO).is_empty());
    }

    #[test]
    fn test_render_orders_asks_above_bids() {
        let text = render(&view());

        let ask = text.find("ask").unwrap();
        let spread = text.find("spread 2 (2.0202%)").unwrap();
        let bid = text.find("bid").unwrap();
        assert!(ask < spread && spread < bid);
        assert!(text.contains("00:00:00.000 BUY"));
        assert!(text.starts_with("BTCUSDT [LIVE] connected"));
    }

    #[test]
    fn test_trade_value_column() {
        let text = render(&view());
        assert!(text.contains("VALUE"));
        assert!(text.contains(&format!("{:>16} {:>16} {:>16}", "100", "0.5", "50.0")));

        let mut huge = view().trades[0].clone();
        huge.price = Decimal::MAX;
        huge.amount = dec!(2);
        assert_eq!(trade_value(&huge), "-");
    }

    #[test]
    fn test_status_line_shows_error() {
        let mut view = view();
        view.state = SessionState::Reconnecting;
        view.last_error = Some("Connection lost. Reconnecting...".to_string());
        view.book_live = false;

        assert_eq!(
            status_line(&view),
            "BTCUSDT [RECONNECTING] reconnecting (syncing book) | Connection lost. Reconnecting..."
        );
    }

    #[test]
    fn test_render_empty_view() {
        let mut view = view();
        view.depth = DepthView::default();
        view.trades.clear();

        let text = render(&view);

        assert!(text.contains("spread 0 (0%)"));
        assert!(text.contains("(none yet)"));
    }
}
