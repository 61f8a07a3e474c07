//! Websocket adapter to the chat gateway.
//!
//! The gateway speaks tagged JSON ops: inbound message events, outbound
//! sends and reactions. Outbound ops arrive over an mpsc channel so the
//! game core never touches the socket directly. Inbound events run in
//! their own reader task; the connection loop keeps draining outbound ops
//! even while a game pass is mid-flight, so the outbox channel always
//! empties.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;

use racecore::game::{GameService, InboundMessage};
use racecore::outbox::{ChatOutbox, Reaction};
use racecore::session::{ChannelId, MessageId, PlayerId};

use crate::store::SqliteStore;

const RECONNECT_DELAY: Duration = Duration::from_millis(500);
const PING_EVERY: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(dead_code)] // Protocol fields are matched by serde; the bot doesn't read every field.
pub enum GatewayEvent {
    Hello {
        #[serde(default)]
        mode: Option<String>,
    },
    Message {
        channel: u64,
        author: u64,
        author_name: String,
        id: u64,
        text: String,
    },
    Pong {},
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayCmd {
    Send { channel: u64, text: String },
    React { message: u64, emoji: String },
    Ping {},
}

/// Outbox half: turns core sends/reactions into gateway ops.
pub struct WsOutbox {
    tx: mpsc::Sender<GatewayCmd>,
    emoji_correct: String,
    emoji_miss: String,
}

impl WsOutbox {
    pub fn new(tx: mpsc::Sender<GatewayCmd>, emoji_correct: String, emoji_miss: String) -> Self {
        Self {
            tx,
            emoji_correct,
            emoji_miss,
        }
    }

    fn emoji(&self, reaction: Reaction) -> String {
        match reaction {
            Reaction::Correct => self.emoji_correct.clone(),
            Reaction::Miss => self.emoji_miss.clone(),
        }
    }
}

#[async_trait]
impl ChatOutbox for WsOutbox {
    async fn send_text(&self, channel: ChannelId, text: &str) -> anyhow::Result<()> {
        self.tx
            .send(GatewayCmd::Send {
                channel: channel.0,
                text: text.to_string(),
            })
            .await
            .map_err(|_| anyhow::anyhow!("gateway writer closed"))
    }

    async fn add_reaction(&self, message: MessageId, reaction: Reaction) -> anyhow::Result<()> {
        self.tx
            .send(GatewayCmd::React {
                message: message.0,
                emoji: self.emoji(reaction),
            })
            .await
            .map_err(|_| anyhow::anyhow!("gateway writer closed"))
    }
}

/// Connect-and-serve loop; reconnects with a short delay on any error.
pub async fn run(
    ws_url: &str,
    svc: Arc<GameService<SqliteStore, WsOutbox>>,
    mut rx: mpsc::Receiver<GatewayCmd>,
) -> anyhow::Result<()> {
    loop {
        if let Err(e) = serve_connection(ws_url, &svc, &mut rx).await {
            warn!(err=%e, "gateway connection lost; retrying");
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn serve_connection(
    ws_url: &str,
    svc: &Arc<GameService<SqliteStore, WsOutbox>>,
    rx: &mut mpsc::Receiver<GatewayCmd>,
) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .with_context(|| format!("connect {ws_url}"))?;
    let (mut sink, mut stream) = ws.split();

    // Reader task: handles inbound in arrival order. Kept off this loop
    // so outbound ops drain even while a handler is blocked on them.
    let svc = svc.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(m) = stream.next().await {
            match m? {
                Message::Text(s) => {
                    let Ok(ev) = serde_json::from_str::<GatewayEvent>(&s) else { continue; };
                    match ev {
                        GatewayEvent::Hello { .. } => {}
                        GatewayEvent::Pong {} => {}
                        GatewayEvent::Message { channel, author, author_name, id, text } => {
                            let msg = InboundMessage {
                                channel: ChannelId(channel),
                                author: PlayerId(author),
                                author_name,
                                message: MessageId(id),
                                text,
                            };
                            if let Err(e) = svc.handle_message(msg).await {
                                warn!(err=%e, "message handling failed");
                            }
                        }
                    }
                }
                Message::Close(_) => anyhow::bail!("gateway sent close"),
                _ => {}
            }
        }
        anyhow::bail!("gateway closed the stream")
    });

    let mut last_ping = tokio::time::Instant::now();
    let res = loop {
        tokio::select! {
            r = &mut reader => {
                break match r {
                    Ok(inner) => inner,
                    Err(e) => Err(anyhow::anyhow!("reader task failed: {e}")),
                };
            }
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break Err(anyhow::anyhow!("outbox channel closed")); };
                let json = serde_json::to_string(&cmd).unwrap_or_default();
                if let Err(e) = sink.send(Message::Text(json)).await {
                    break Err(e.into());
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if last_ping.elapsed() > PING_EVERY {
                    let ping = serde_json::to_string(&GatewayCmd::Ping {}).unwrap_or_default();
                    let _ = sink.send(Message::Text(ping)).await;
                    last_ping = tokio::time::Instant::now();
                }
            }
        }
    };
    reader.abort();
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_the_gateway() {
        let ev: GatewayEvent = serde_json::from_str(
            r#"{"op":"message","channel":7,"author":42,"author_name":"alice","id":9001,"text":"!start"}"#,
        )
        .unwrap();
        match ev {
            GatewayEvent::Message { channel, id, text, .. } => {
                assert_eq!(channel, 7);
                assert_eq!(id, 9001);
                assert_eq!(text, "!start");
            }
            other => panic!("wrong op: {other:?}"),
        }

        let cmd = serde_json::to_string(&GatewayCmd::React {
            message: 9001,
            emoji: "✅".to_string(),
        })
        .unwrap();
        assert!(cmd.contains(r#""op":"react""#));
    }
}
