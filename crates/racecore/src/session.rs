use std::time::Duration;

use tokio::time::Instant;

pub const MAX_PLAYER_COUNT: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

/// Handle of one inbound chat message; reactions are attached to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Exact phase-scoped literals; anything else is not a difficulty.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    /// Storage tier column: 0 / 1 / 2.
    pub fn tier(self) -> i64 {
        match self {
            Difficulty::Beginner => 0,
            Difficulty::Intermediate => 1,
            Difficulty::Advanced => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingPlayerCount,
    AwaitingDifficulty,
    RoundActive,
    RoundResolving,
    Ended,
}

/// One correct answer waiting for the round's award pass.
#[derive(Debug, Clone)]
pub struct PendingAnswer {
    pub player: PlayerId,
    pub name: String,
    pub message: MessageId,
    pub elapsed: f64,
}

#[derive(Debug, Clone)]
pub struct PlayerScore {
    pub player: PlayerId,
    pub name: String,
    pub points: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("player count must be between 1 and {MAX_PLAYER_COUNT}")]
    CountOutOfRange,
    #[error("input does not belong to the current phase")]
    WrongPhase,
}

/// What one answer attempt did to the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// First exact match; opens the collection window.
    First,
    /// Exact match inside an open collection window.
    Collected,
    /// Exact match after the award pass already ran.
    AlreadyAnswered,
    /// Wrong text during an unresolved round.
    Incorrect,
    /// No prompt is live (between award pass and next announcement).
    NotPlaying,
}

/// All mutable state for one game on one channel.
///
/// A session is always in one of the four live phases; `Idle` and `Ended`
/// are represented by absence from the registry. `epoch` fences the spawned
/// window/announce timers: a timer captured under an older epoch finds the
/// mismatch and does nothing, so restarting a game never leaves an orphaned
/// timer firing against the new session.
#[derive(Debug)]
pub struct GameSession {
    pub channel: ChannelId,
    pub epoch: u64,
    phase: Phase,
    player_count: u64,
    scores: Vec<PlayerScore>,
    difficulty: Option<Difficulty>,
    questions_remaining: u32,
    current_sentence: String,
    round_start: Instant,
    pending: Vec<PendingAnswer>,
    round_finished: bool,
    resolved: bool,
    last_activity: Instant,
}

impl GameSession {
    pub fn new(channel: ChannelId, epoch: u64, now: Instant) -> Self {
        Self {
            channel,
            epoch,
            phase: Phase::AwaitingPlayerCount,
            player_count: 0,
            scores: Vec::new(),
            difficulty: None,
            questions_remaining: 0,
            current_sentence: String::new(),
            round_start: now,
            pending: Vec::new(),
            round_finished: false,
            resolved: false,
            last_activity: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn player_count(&self) -> u64 {
        self.player_count
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    pub fn questions_remaining(&self) -> u32 {
        self.questions_remaining
    }

    pub fn current_sentence(&self) -> &str {
        &self.current_sentence
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Accept the player count. `None` means the digit string overflowed,
    /// which gets the same out-of-range rejection as 0 or > 1_000_000.
    pub fn set_player_count(&mut self, n: Option<u64>, now: Instant) -> Result<u64, SessionError> {
        if self.phase != Phase::AwaitingPlayerCount {
            return Err(SessionError::WrongPhase);
        }
        self.touch(now);
        match n {
            Some(n) if (1..=MAX_PLAYER_COUNT).contains(&n) => {
                self.player_count = n;
                self.phase = Phase::AwaitingDifficulty;
                Ok(n)
            }
            _ => Err(SessionError::CountOutOfRange),
        }
    }

    /// Lock in the difficulty and arm the game. The session sits in
    /// `RoundResolving` (resolved, no pending prompt) until the first
    /// prompt is announced and installed via [`Self::install_round`].
    pub fn choose_difficulty(
        &mut self,
        d: Difficulty,
        questions: u32,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.phase != Phase::AwaitingDifficulty {
            return Err(SessionError::WrongPhase);
        }
        self.difficulty = Some(d);
        self.questions_remaining = questions;
        self.phase = Phase::RoundResolving;
        self.round_finished = true;
        self.resolved = true;
        self.touch(now);
        Ok(())
    }

    /// Publish a new prompt: enters `RoundActive` and starts the clock.
    pub fn install_round(&mut self, sentence: String, now: Instant) {
        self.current_sentence = sentence;
        self.pending.clear();
        self.round_finished = false;
        self.resolved = false;
        self.phase = Phase::RoundActive;
        self.round_start = now;
        self.touch(now);
    }

    /// Process one answer attempt during a round. Every attempt counts as
    /// activity for the idle supervisor, correct or not.
    pub fn submit_answer(
        &mut self,
        player: PlayerId,
        name: &str,
        message: MessageId,
        text: &str,
        now: Instant,
    ) -> AnswerOutcome {
        self.touch(now);
        let is_match = !self.current_sentence.is_empty() && text == self.current_sentence;
        match self.phase {
            Phase::RoundActive if is_match => {
                self.phase = Phase::RoundResolving;
                self.round_finished = true;
                self.push_answer(player, name, message, now);
                AnswerOutcome::First
            }
            Phase::RoundActive => AnswerOutcome::Incorrect,
            Phase::RoundResolving if is_match && !self.resolved => {
                self.push_answer(player, name, message, now);
                AnswerOutcome::Collected
            }
            Phase::RoundResolving if is_match => AnswerOutcome::AlreadyAnswered,
            Phase::RoundResolving if !self.resolved => AnswerOutcome::Incorrect,
            _ => AnswerOutcome::NotPlaying,
        }
    }

    fn push_answer(&mut self, player: PlayerId, name: &str, message: MessageId, now: Instant) {
        let elapsed = now.saturating_duration_since(self.round_start).as_secs_f64();
        self.pending.push(PendingAnswer {
            player,
            name: name.to_string(),
            message,
            elapsed,
        });
    }

    /// Close the round for the award pass: marks it resolved, burns one
    /// question, and drains the pending answers in arrival order. Returns
    /// `None` if the round was already resolved (stale timer).
    pub fn finish_round(&mut self) -> Option<Vec<PendingAnswer>> {
        if self.phase != Phase::RoundResolving || self.resolved {
            return None;
        }
        self.resolved = true;
        self.questions_remaining = self.questions_remaining.saturating_sub(1);
        Some(std::mem::take(&mut self.pending))
    }

    pub fn game_over(&self) -> bool {
        self.questions_remaining == 0
    }

    pub fn credit(&mut self, player: PlayerId, name: &str, points: u32) {
        if let Some(s) = self.scores.iter_mut().find(|s| s.player == player) {
            s.points += points;
        } else {
            self.scores.push(PlayerScore {
                player,
                name: name.to_string(),
                points,
            });
        }
    }

    /// Scoreboard in first-scored order; ranking happens in `score`.
    pub fn scores(&self) -> &[PlayerScore] {
        &self.scores
    }

    pub fn end(&mut self) {
        self.phase = Phase::Ended;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        GameSession::new(ChannelId(1), 1, Instant::now())
    }

    fn in_round(sentence: &str) -> GameSession {
        let now = Instant::now();
        let mut s = session();
        s.set_player_count(Some(3), now).unwrap();
        s.choose_difficulty(Difficulty::Beginner, 10, now).unwrap();
        s.install_round(sentence.to_string(), now);
        s
    }

    #[test]
    fn player_count_bounds() {
        let now = Instant::now();

        let mut s = session();
        assert_eq!(s.set_player_count(Some(1), now), Ok(1));
        assert_eq!(s.phase(), Phase::AwaitingDifficulty);

        let mut s = session();
        assert_eq!(s.set_player_count(Some(1_000_000), now), Ok(1_000_000));

        for bad in [Some(0), Some(1_000_001), None] {
            let mut s = session();
            assert_eq!(
                s.set_player_count(bad, now),
                Err(SessionError::CountOutOfRange)
            );
            assert_eq!(s.phase(), Phase::AwaitingPlayerCount);
        }
    }

    #[test]
    fn difficulty_literals() {
        assert_eq!(Difficulty::parse("beginner"), Some(Difficulty::Beginner));
        assert_eq!(
            Difficulty::parse("intermediate"),
            Some(Difficulty::Intermediate)
        );
        assert_eq!(Difficulty::parse("advanced"), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::parse("Beginner"), None);
        assert_eq!(Difficulty::parse("expert"), None);
        assert_eq!(Difficulty::parse(""), None);
    }

    #[test]
    fn difficulty_only_once() {
        let now = Instant::now();
        let mut s = session();
        s.set_player_count(Some(2), now).unwrap();
        assert!(s.choose_difficulty(Difficulty::Advanced, 10, now).is_ok());
        assert_eq!(
            s.choose_difficulty(Difficulty::Beginner, 10, now),
            Err(SessionError::WrongPhase)
        );
        assert_eq!(s.difficulty(), Some(Difficulty::Advanced));
    }

    #[test]
    fn first_match_opens_window_then_collects() {
        let now = Instant::now();
        let mut s = in_round("hello world");

        assert_eq!(
            s.submit_answer(PlayerId(1), "a", MessageId(1), "hello world", now),
            AnswerOutcome::First
        );
        assert_eq!(s.phase(), Phase::RoundResolving);
        assert_eq!(
            s.submit_answer(PlayerId(2), "b", MessageId(2), "hello world", now),
            AnswerOutcome::Collected
        );
        assert_eq!(
            s.submit_answer(PlayerId(3), "c", MessageId(3), "hello worlds", now),
            AnswerOutcome::Incorrect
        );

        let pending = s.finish_round().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].player, PlayerId(1));
        assert_eq!(s.questions_remaining(), 9);
        // Second award pass is a no-op.
        assert!(s.finish_round().is_none());
    }

    #[test]
    fn match_after_resolution_is_already_answered() {
        let now = Instant::now();
        let mut s = in_round("hello world");
        s.submit_answer(PlayerId(1), "a", MessageId(1), "hello world", now);
        s.finish_round().unwrap();

        assert_eq!(
            s.submit_answer(PlayerId(2), "b", MessageId(2), "hello world", now),
            AnswerOutcome::AlreadyAnswered
        );
        // Wrong text after resolution is not an answer attempt at all.
        assert_eq!(
            s.submit_answer(PlayerId(2), "b", MessageId(3), "nope", now),
            AnswerOutcome::NotPlaying
        );
    }

    #[test]
    fn incorrect_answer_leaves_round_open() {
        let now = Instant::now();
        let mut s = in_round("hello world");
        assert_eq!(
            s.submit_answer(PlayerId(1), "a", MessageId(1), "helo world", now),
            AnswerOutcome::Incorrect
        );
        assert_eq!(s.phase(), Phase::RoundActive);
    }

    #[test]
    fn answer_attempts_refresh_activity() {
        let now = Instant::now();
        let mut s = in_round("hello world");
        let later = now + Duration::from_secs(30);
        s.submit_answer(PlayerId(1), "a", MessageId(1), "wrong", later);
        assert_eq!(s.idle_for(later), Duration::ZERO);
    }

    #[test]
    fn credit_accumulates_in_first_scored_order() {
        let mut s = in_round("x");
        s.credit(PlayerId(2), "b", 3);
        s.credit(PlayerId(1), "a", 5);
        s.credit(PlayerId(2), "b", 5);
        let scores = s.scores();
        assert_eq!(scores[0].player, PlayerId(2));
        assert_eq!(scores[0].points, 8);
        assert_eq!(scores[1].points, 5);
    }
}
