//! WebSocket transport with HTTP endpoint discovery.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::transport::{Connector, Transport, TransportError};

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}

/// Builds the socket URL from a discovered gateway URL.
#[must_use]
pub fn socket_url(gateway_url: &str) -> String {
    format!("{}/?v=10&encoding=json", gateway_url.trim_end_matches('/'))
}

/// Discovers the gateway URL over HTTP, then opens a WebSocket to it.
#[derive(Clone)]
pub struct WsConnector {
    client: reqwest::Client,
    api_base: String,
}

impl WsConnector {
    /// Create a connector that discovers the endpoint under `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    async fn discover(&self) -> Result<String, TransportError> {
        let url = format!("{}/gateway", self.api_base.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Discovery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::Discovery(format!(
                "HTTP {} from {url}",
                resp.status()
            )));
        }

        let info: GatewayInfo = resp
            .json()
            .await
            .map_err(|e| TransportError::Discovery(format!("invalid response: {e}")))?;
        Ok(info.url)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let gateway_url = self.discover().await?;
        let url = socket_url(&gateway_url);
        tracing::info!(%url, "connecting to gateway");

        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(s) => return Some(Ok(s)),
                    Err(_) => {
                        tracing::warn!("dropping non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "gateway closed the connection");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing gateway socket");
        }
    }
}
