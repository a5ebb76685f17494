//! JSON control messages and binary media frames exchanged with the browser.
//!
//! Inbound:
//!   text   `{"event":"start:stream","streamUrl":"rtmp://…","streamKey":"…"}`
//!   text   `{"event":"stop:stream"}`
//!   binary one media chunk
//! Outbound:
//!   text   `{"event":"stream:ready"}`
//!   text   `{"event":"stream:error","kind":"…","detail":"…"}`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warp::ws::Message;

use crate::domain::value_objects::{ClientEvent, ServerEvent};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Text frame is not valid UTF-8")]
    InvalidText,

    #[error("Malformed control message: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
enum InboundMessage {
    #[serde(rename = "start:stream", rename_all = "camelCase")]
    StartStream {
        stream_url: String,
        stream_key: String,
    },
    #[serde(rename = "stop:stream")]
    StopStream,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event")]
enum OutboundMessage<'a> {
    #[serde(rename = "stream:ready")]
    StreamReady,
    #[serde(rename = "stream:error")]
    StreamError { kind: &'a str, detail: &'a str },
}

/// Translate one WebSocket frame into a session event.
///
/// Ping and pong frames carry no event and yield `None`.
pub fn decode(message: Message) -> Result<Option<ClientEvent>, ProtocolError> {
    if message.is_binary() {
        return Ok(Some(ClientEvent::Chunk(Bytes::from(message.into_bytes()))));
    }

    if message.is_close() {
        return Ok(Some(ClientEvent::Disconnect));
    }

    if message.is_text() {
        let text = message.to_str().map_err(|_| ProtocolError::InvalidText)?;
        let event = match serde_json::from_str::<InboundMessage>(text)? {
            InboundMessage::StartStream {
                stream_url,
                stream_key,
            } => ClientEvent::Configure {
                stream_url,
                stream_key,
            },
            InboundMessage::StopStream => ClientEvent::Stop,
        };
        return Ok(Some(event));
    }

    Ok(None)
}

pub fn encode(event: &ServerEvent) -> Result<Message, serde_json::Error> {
    let outbound = match event {
        ServerEvent::Ready => OutboundMessage::StreamReady,
        ServerEvent::Error { kind, detail } => OutboundMessage::StreamError {
            kind: kind.as_str(),
            detail,
        },
    };

    Ok(Message::text(serde_json::to_string(&outbound)?))
}
