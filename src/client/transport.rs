//! Client transport abstraction

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::*;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::ClientError;
use crate::protocol::{codec, InboundMessage, OutboundMessage};

/// An established, bidirectional connection to the hub
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, message: &InboundMessage) -> Result<(), ClientError>;

    /// Next message from the hub; `None` once the connection has closed
    async fn recv(&mut self) -> Option<Result<OutboundMessage, ClientError>>;

    /// Close the connection cleanly
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Opens links to the hub
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: Link + 'static;

    async fn connect(&self) -> Result<Self::Link, ClientError>;
}

/// Connector for the hub's WebSocket endpoint, e.g. `ws://host:5000/hubs/location`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Link = WsLink;

    async fn connect(&self) -> Result<WsLink, ClientError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
        debug!("Connected to {}", self.url);
        Ok(WsLink { stream })
    }
}

pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, message: &InboundMessage) -> Result<(), ClientError> {
        let frame = codec::encode_inbound(message)?;
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<OutboundMessage, ClientError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(codec::decode_outbound(&text).map_err(ClientError::from))
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
