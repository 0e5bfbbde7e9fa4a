use std::time::Duration;

use async_trait::async_trait;
use common::FeedEnvironment;
use connector_core::{ConnectorError, FrameStream, StreamTransport};
use futures_util::{stream, SinkExt, StreamExt};
use model::StreamKind;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Timeout for WebSocket connection attempts.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Depth stream update speed.
const DEPTH_SPEED_MS: u32 = 100;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) fn build_stream_url(ws_base_url: &str, symbol: &str, kind: StreamKind) -> String {
    let sym_lower = symbol.to_lowercase();
    let stream = match kind {
        StreamKind::Depth => format!("{}@depth@{}ms", sym_lower, DEPTH_SPEED_MS),
        StreamKind::Trades => format!("{}@aggTrade", sym_lower),
    };
    format!("{}/ws/{}", ws_base_url.trim_end_matches('/'), stream)
}

/// Raw-stream WebSocket subscriptions for one symbol.
///
/// Each call to [`StreamTransport::open`] makes a fresh connection. Ping
/// frames are answered with Pong inside the returned stream; only text frames
/// are yielded.
#[derive(Debug, Clone)]
pub struct BinanceTransport {
    ws_base_url: String,
    symbol: String,
    connect_timeout: Duration,
}

impl BinanceTransport {
    pub fn new(environment: FeedEnvironment, symbol: &str) -> Self {
        Self::with_base_url(environment.ws_base_url(), symbol)
    }

    pub fn with_base_url(ws_base_url: &str, symbol: &str) -> Self {
        Self {
            ws_base_url: ws_base_url.to_string(),
            symbol: symbol.to_string(),
            connect_timeout: CONNECTION_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn stream_url(&self, kind: StreamKind) -> String {
        build_stream_url(&self.ws_base_url, &self.symbol, kind)
    }
}

#[async_trait]
impl StreamTransport for BinanceTransport {
    async fn open(&self, kind: StreamKind) -> Result<FrameStream, ConnectorError> {
        let url = self.stream_url(kind);
        info!(url = %url, stream = %kind, "Connecting to Binance WebSocket");

        let ws = match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => return Err(ConnectorError::WebSocket(e.to_string())),
            Err(_) => return Err(ConnectorError::WebSocket("connection timeout".to_string())),
        };

        info!(stream = %kind, "Connected to Binance WebSocket");
        Ok(text_frames(ws))
    }
}

/// Turn a socket into a stream of text frames, replying to pings along the way.
fn text_frames(ws: WsStream) -> FrameStream {
    let (write, read) = ws.split();

    Box::pin(stream::unfold(Some((write, read)), |state| async move {
        let (mut write, mut read) = state?;
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => return Some((Ok(text), Some((write, read)))),
                Some(Ok(Message::Ping(data))) => {
                    debug!("Received Ping, sending Pong");
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        return Some((Err(ConnectorError::WebSocket(e.to_string())), None));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "WebSocket closed by server");
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Some((Err(ConnectorError::WebSocket(e.to_string())), None));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return None;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_url_production() {
        let transport = BinanceTransport::new(FeedEnvironment::Production, "BTCUSDT");
        assert_eq!(
            transport.stream_url(StreamKind::Depth),
            "wss://stream.binance.com:9443/ws/btcusdt@depth@100ms"
        );
    }

    #[test]
    fn test_trades_url_production() {
        let transport = BinanceTransport::new(FeedEnvironment::Production, "BTCUSDT");
        assert_eq!(
            transport.stream_url(StreamKind::Trades),
            "wss://stream.binance.com:9443/ws/btcusdt@aggTrade"
        );
    }

    #[test]
    fn test_urls_testnet() {
        let transport = BinanceTransport::new(FeedEnvironment::Testnet, "ETHUSDT");
        assert_eq!(
            transport.stream_url(StreamKind::Depth),
            "wss://testnet.binance.vision/ws/ethusdt@depth@100ms"
        );
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let transport = BinanceTransport::with_base_url("ws://localhost:9000/", "BTCUSDT");
        assert_eq!(
            transport.stream_url(StreamKind::Trades),
            "ws://localhost:9000/ws/btcusdt@aggTrade"
        );
    }

    #[tokio::test]
    async fn test_open_unreachable_host_fails() {
        let transport = BinanceTransport::with_base_url("ws://127.0.0.1:1", "BTCUSDT")
            .with_connect_timeout(Duration::from_secs(2));

        let result = transport.open(StreamKind::Depth).await;

        assert!(matches!(result, Err(ConnectorError::WebSocket(_))));
    }
}
