//! `racecore`: the game core for the typing-race chat bot.
//!
//! One game runs per channel: players race to retype a prompted sentence,
//! the fastest few earn points, and per-sentence best times are persisted.
//! This crate owns the session state machine, the scoring rules, the
//! command router, and the idle-timeout supervisor. The chat platform and
//! the sentence store are external collaborators reached through the
//! [`outbox::ChatOutbox`] and [`repo::SentenceRepository`] seams, so the
//! whole game loop is testable with in-memory fakes.

pub mod game;
pub mod outbox;
pub mod repo;
pub mod router;
pub mod score;
pub mod session;

pub use game::{GameConfig, GameService, InboundMessage};
pub use outbox::{ChatOutbox, Reaction};
pub use repo::SentenceRepository;
pub use session::{ChannelId, Difficulty, MessageId, Phase, PlayerId};
