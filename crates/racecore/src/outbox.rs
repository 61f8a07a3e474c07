use async_trait::async_trait;

use crate::session::{ChannelId, MessageId};

/// Chat platforms cap one message at 2000 characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Correct,
    Miss,
}

/// Outbound capability the core consumes: plain sends and reactions.
/// The transport (websocket gateway, test recorder) lives behind this.
#[async_trait]
pub trait ChatOutbox: Send + Sync {
    async fn send_text(&self, channel: ChannelId, text: &str) -> anyhow::Result<()>;
    async fn add_reaction(&self, message: MessageId, reaction: Reaction) -> anyhow::Result<()>;
}

/// Split `text` into chunks of at most `max_chars` characters, breaking
/// only at line boundaries. A single line longer than the cap is emitted
/// as its own chunk rather than split mid-line.
pub fn split_at_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for line in text.lines() {
        let line_chars = line.chars().count();
        // +1 for the joining newline.
        if !buf.is_empty() && buf_chars + line_chars + 1 > max_chars {
            chunks.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }
        if buf.is_empty() {
            buf.push_str(line);
            buf_chars = line_chars;
        } else {
            buf.push('\n');
            buf.push_str(line);
            buf_chars += line_chars + 1;
        }
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// Send `text`, splitting anything over the platform cap at line
/// boundaries. Every multi-line send in the core goes through here.
pub async fn send_chunked<O>(outbox: &O, channel: ChannelId, text: &str) -> anyhow::Result<()>
where
    O: ChatOutbox + ?Sized,
{
    for chunk in split_at_lines(text, MAX_MESSAGE_CHARS) {
        outbox.send_text(channel, &chunk).await?;
    }
    Ok(())
}
