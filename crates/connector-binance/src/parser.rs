use model::{DepthUpdate, PriceLevelUpdate, Trade};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// Raw Binance `trade` event.
#[derive(Debug, Deserialize)]
pub struct BinanceTradeRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: u64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub qty: Decimal,
    #[serde(rename = "T")]
    pub timestamp_ms: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Raw Binance `aggTrade` event. Same shape as a trade, keyed by aggregate id.
#[derive(Debug, Deserialize)]
pub struct BinanceAggTradeRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub agg_trade_id: u64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub qty: Decimal,
    #[serde(rename = "T")]
    pub timestamp_ms: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Raw Binance depth update event.
#[derive(Debug, Deserialize)]
pub struct BinanceDepthRaw {
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U", default)]
    pub first_update_id: Option<u64>,
    #[serde(rename = "u", default)]
    pub final_update_id: Option<u64>,
    #[serde(rename = "b")]
    pub bids: Vec<(String, String)>,
    #[serde(rename = "a")]
    pub asks: Vec<(String, String)>,
}

/// Combined stream wrapper that holds generic event data.
#[derive(Debug, Deserialize)]
struct CombinedStreamWrapper {
    #[allow(dead_code)]
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Trade(Trade),
    DepthUpdate {
        update: DepthUpdate,
        /// Levels whose price or quantity did not parse as a decimal.
        dropped_levels: usize,
    },
    Unknown,
}

impl From<BinanceTradeRaw> for Trade {
    fn from(raw: BinanceTradeRaw) -> Self {
        Trade {
            id: raw.trade_id,
            price: raw.price,
            amount: raw.qty,
            timestamp_ms: raw.timestamp_ms,
            is_buyer_aggressor: !raw.is_buyer_maker,
        }
    }
}

impl From<BinanceAggTradeRaw> for Trade {
    fn from(raw: BinanceAggTradeRaw) -> Self {
        Trade {
            id: raw.agg_trade_id,
            price: raw.price,
            amount: raw.qty,
            timestamp_ms: raw.timestamp_ms,
            is_buyer_aggressor: !raw.is_buyer_maker,
        }
    }
}

/// Parse string price/qty pairs into Decimal tuples.
///
/// A pair that fails to parse is dropped on its own; the count of dropped
/// pairs is returned alongside the parsed levels.
pub(crate) fn parse_price_levels(
    symbol: &str,
    levels: &[(String, String)],
) -> (Vec<PriceLevelUpdate>, usize) {
    let mut dropped = 0;
    let parsed = levels
        .iter()
        .filter_map(|(price, qty)| {
            match (Decimal::from_str(price), Decimal::from_str(qty)) {
                (Ok(p), Ok(q)) => Some((p, q)),
                _ => {
                    dropped += 1;
                    warn!(symbol = %symbol, price = %price, qty = %qty, "Dropping malformed price level");
                    None
                }
            }
        })
        .collect();
    (parsed, dropped)
}

impl BinanceDepthRaw {
    fn into_parsed(self) -> ParsedMessage {
        let (bids, dropped_bids) = parse_price_levels(&self.symbol, &self.bids);
        let (asks, dropped_asks) = parse_price_levels(&self.symbol, &self.asks);
        ParsedMessage::DepthUpdate {
            update: DepthUpdate {
                bids,
                asks,
                first_update_id: self.first_update_id,
                final_update_id: self.final_update_id,
                event_time_ms: self.event_time,
            },
            dropped_levels: dropped_bids + dropped_asks,
        }
    }
}

/// A trade must carry a positive price and amount.
fn checked_trade(trade: Trade) -> Result<ParsedMessage, serde_json::Error> {
    if trade.price <= Decimal::ZERO || trade.amount <= Decimal::ZERO {
        return Err(serde::de::Error::custom(format!(
            "trade {} has non-positive price {} or amount {}",
            trade.id, trade.price, trade.amount
        )));
    }
    Ok(ParsedMessage::Trade(trade))
}

fn parse_event(event: serde_json::Value) -> Result<ParsedMessage, serde_json::Error> {
    let Some(event_type) = event.get("e").and_then(|v| v.as_str()) else {
        return Ok(ParsedMessage::Unknown);
    };

    match event_type {
        "trade" => {
            let raw: BinanceTradeRaw = serde_json::from_value(event)?;
            checked_trade(raw.into())
        }
        "aggTrade" => {
            let raw: BinanceAggTradeRaw = serde_json::from_value(event)?;
            checked_trade(raw.into())
        }
        "depthUpdate" => {
            let raw: BinanceDepthRaw = serde_json::from_value(event)?;
            Ok(raw.into_parsed())
        }
        _ => Ok(ParsedMessage::Unknown),
    }
}

/// Parse one text frame from a raw or combined stream.
pub fn parse_message(text: &str) -> Result<ParsedMessage, serde_json::Error> {
    // Combined stream format has a "stream" field
    if text.contains("\"stream\"") {
        let wrapper: CombinedStreamWrapper = serde_json::from_str(text)?;
        return parse_event(wrapper.data);
    }

    parse_event(serde_json::from_str(text)?)
}
