use crate::session::{Difficulty, Phase};

pub const CMD_START: &str = "!start";
pub const CMD_RANKINGS: &str = "!best";
pub const CMD_HELP: &str = "!help";

/// Where one inbound message goes. Exactly one route per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Start,
    Rankings,
    Help,
    /// All-digit input while awaiting the player count. `None` means the
    /// digit string did not fit in a u64; treated as out of range.
    PlayerCount(Option<u64>),
    Difficulty(Difficulty),
    /// Unrecognized text while awaiting the difficulty.
    RejectDifficulty,
    /// Any text during a round; the session decides what it means.
    Answer,
    Ignore,
}

/// Pure dispatch. Explicit commands win in every phase (case-sensitive
/// prefix match); phase-scoped inputs are only consulted in their phase.
pub fn route(phase: Phase, text: &str) -> Route {
    if text.starts_with(CMD_START) {
        return Route::Start;
    }
    if text.starts_with(CMD_RANKINGS) {
        return Route::Rankings;
    }
    if text.starts_with(CMD_HELP) {
        return Route::Help;
    }

    match phase {
        Phase::AwaitingPlayerCount => {
            if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                Route::PlayerCount(text.parse().ok())
            } else {
                // Chatter while counting heads is not an error.
                Route::Ignore
            }
        }
        Phase::AwaitingDifficulty => match Difficulty::parse(text) {
            Some(d) => Route::Difficulty(d),
            None => Route::RejectDifficulty,
        },
        Phase::RoundActive | Phase::RoundResolving => Route::Answer,
        Phase::Idle | Phase::Ended => Route::Ignore,
    }
}
