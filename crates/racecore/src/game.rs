use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::outbox::{self, ChatOutbox, Reaction};
use crate::repo::{SentenceRepository, FALLBACK_SENTENCE};
use crate::router::{self, Route};
use crate::score;
use crate::session::{AnswerOutcome, ChannelId, GameSession, MessageId, Phase, PlayerId};

const MSG_ASK_PLAYERS: &str = "how many players? (1-1000000)";
const MSG_COUNT_RANGE: &str = "player count must be between 1 and 1000000. try again.";
const MSG_PICK_DIFFICULTY: &str = "pick a difficulty: beginner / intermediate / advanced";
const MSG_TIMEOUT: &str = "timed out. ending the game.";
const MSG_NO_RECORDS: &str = "no records yet.";
const MSG_RECORDS_DOWN: &str = "records are unavailable right now.";

const HELP_TEXT: &str = "typing race\n\
  !start - start a game on this channel\n\
  !best  - show the fastest records\n\
  !help  - this text\n\
during a game: answer by retyping the prompt exactly.";

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub questions_per_game: u32,
    /// How long after the first correct answer further answers still count.
    pub collect_window: Duration,
    /// Breather before announcing a prompt when more than one player races.
    pub pace_delay: Duration,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    pub ranking_limit: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            questions_per_game: 10,
            collect_window: Duration::from_secs(1),
            pace_delay: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            ranking_limit: 20,
        }
    }
}

/// One inbound chat event, as delivered by the gateway.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: ChannelId,
    pub author: PlayerId,
    pub author_name: String,
    pub message: MessageId,
    pub text: String,
}

/// The game service: session registry plus the two collaborator seams.
///
/// The registry mutex is the unit of mutual exclusion. It is only held
/// across synchronous state changes; outbox sends and store calls happen
/// after it is released, so a slow transport on one channel cannot stall
/// the others or the idle sweep. The collection window and the pacing
/// delay run in spawned tasks that re-lock and re-check `(epoch, phase)`
/// before acting.
pub struct GameService<R, O> {
    cfg: GameConfig,
    sessions: Mutex<HashMap<ChannelId, GameSession>>,
    next_epoch: AtomicU64,
    repo: Arc<R>,
    outbox: Arc<O>,
}

impl<R, O> GameService<R, O>
where
    R: SentenceRepository + 'static,
    O: ChatOutbox + 'static,
{
    pub fn new(cfg: GameConfig, repo: Arc<R>, outbox: Arc<O>) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            sessions: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
            repo,
            outbox,
        })
    }

    /// Handle one inbound message to completion. Messages on one channel
    /// are expected to arrive in order from the gateway loop.
    pub async fn handle_message(self: &Arc<Self>, msg: InboundMessage) -> anyhow::Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let phase = sessions
            .get(&msg.channel)
            .map(|s| s.phase())
            .unwrap_or(Phase::Idle);

        match router::route(phase, &msg.text) {
            Route::Start => {
                // Replaces any prior session outright; the fresh epoch
                // fences that session's pending timers.
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                sessions.insert(msg.channel, GameSession::new(msg.channel, epoch, now));
                drop(sessions);
                info!(channel = msg.channel.0, epoch, "game starting");
                self.outbox.send_text(msg.channel, MSG_ASK_PLAYERS).await?;
            }
            Route::Rankings => {
                drop(sessions);
                self.show_rankings(msg.channel).await?;
            }
            Route::Help => {
                drop(sessions);
                outbox::send_chunked(self.outbox.as_ref(), msg.channel, HELP_TEXT).await?;
            }
            Route::PlayerCount(n) => {
                let Some(session) = sessions.get_mut(&msg.channel) else {
                    return Ok(());
                };
                let accepted = session.set_player_count(n, now).ok();
                drop(sessions);
                match accepted {
                    Some(n) => {
                        self.outbox
                            .send_text(
                                msg.channel,
                                &format!("{n} players. {MSG_PICK_DIFFICULTY}"),
                            )
                            .await?;
                    }
                    None => {
                        self.outbox.send_text(msg.channel, MSG_COUNT_RANGE).await?;
                    }
                }
            }
            Route::Difficulty(d) => {
                let Some(session) = sessions.get_mut(&msg.channel) else {
                    return Ok(());
                };
                if session
                    .choose_difficulty(d, self.cfg.questions_per_game, now)
                    .is_err()
                {
                    return Ok(());
                }
                let epoch = session.epoch;
                let pace = session.player_count() > 1;
                drop(sessions);
                self.outbox
                    .send_text(msg.channel, &format!("{} mode. game on.", d.label()))
                    .await?;
                tokio::spawn(self.clone().next_round(msg.channel, epoch, pace));
            }
            Route::RejectDifficulty => {
                if let Some(session) = sessions.get_mut(&msg.channel) {
                    session.touch(now);
                }
                drop(sessions);
                self.outbox.send_text(msg.channel, MSG_PICK_DIFFICULTY).await?;
            }
            Route::Answer => {
                let Some(session) = sessions.get_mut(&msg.channel) else {
                    return Ok(());
                };
                let epoch = session.epoch;
                let outcome =
                    session.submit_answer(msg.author, &msg.author_name, msg.message, &msg.text, now);
                drop(sessions);
                match outcome {
                    AnswerOutcome::First => {
                        tokio::spawn(self.clone().resolve_round(msg.channel, epoch));
                    }
                    AnswerOutcome::Collected | AnswerOutcome::NotPlaying => {}
                    AnswerOutcome::AlreadyAnswered => {
                        self.outbox
                            .send_text(
                                msg.channel,
                                &format!("{}, this round is already over.", msg.author_name),
                            )
                            .await?;
                    }
                    AnswerOutcome::Incorrect => {
                        self.outbox.add_reaction(msg.message, Reaction::Miss).await?;
                        self.outbox
                            .send_text(
                                msg.channel,
                                &format!("{}, not quite. try again.", msg.author_name),
                            )
                            .await?;
                    }
                }
            }
            Route::Ignore => {}
        }
        Ok(())
    }

    /// Collection window: sleeps, then runs the award pass once. State
    /// changes happen under the registry lock; the announcements are
    /// staged there and sent only after the lock is released. A restarted
    /// or timed-out session fails the epoch check and the timer dies
    /// quietly.
    async fn resolve_round(self: Arc<Self>, channel: ChannelId, epoch: u64) {
        tokio::time::sleep(self.cfg.collect_window).await;

        let (awards, fastest, finale, over, pace) = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(&channel) else {
                return;
            };
            if session.epoch != epoch {
                return;
            }
            let Some(raw) = session.finish_round() else {
                return;
            };

            let player_count = session.player_count();
            let sentence = session.current_sentence().to_string();
            let entries = score::rank_round(raw);

            let mut awards = Vec::with_capacity(entries.len());
            for (rank, e) in entries.iter().enumerate() {
                let pts = score::award_for_rank(rank, player_count);
                if pts > 0 {
                    session.credit(e.player, &e.name, pts);
                }
                let line = if pts > 0 {
                    format!("{}! correct in {:.2}s. +{pts} points.", e.name, e.elapsed)
                } else {
                    format!("{}! correct in {:.2}s. no points left this round.", e.name, e.elapsed)
                };
                awards.push((e.message, line));
            }

            let fastest = entries.first().map(|f| (sentence, f.name.clone(), f.elapsed));

            let over = session.game_over();
            let finale = if over {
                session.end();
                let standings = score::standings(session.scores());
                sessions.remove(&channel);
                let mut text = String::from("game over! final scores:\n");
                for s in &standings {
                    text.push_str(&format!("{}: {} points\n", s.name, s.points));
                }
                Some(text)
            } else {
                None
            };
            (awards, fastest, finale, over, player_count > 1)
        };

        for (message, line) in awards {
            if let Err(err) = self.outbox.add_reaction(message, Reaction::Correct).await {
                warn!(err=%err, "reaction failed");
            }
            if let Err(err) = self.outbox.send_text(channel, &line).await {
                warn!(err=%err, "award notice failed");
            }
        }

        // Fastest entry may set a new all-time best for this sentence.
        if let Some((sentence, name, elapsed)) = fastest {
            match self.repo.insert_if_faster(&sentence, &name, elapsed).await {
                Ok(true) => {
                    let line = format!("new record for this sentence: {elapsed:.2}s ({name})");
                    if let Err(err) = self.outbox.send_text(channel, &line).await {
                        warn!(err=%err, "record notice failed");
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(err=%err, "best-time insert failed"),
            }
        }

        if let Some(text) = finale {
            if let Err(err) = outbox::send_chunked(self.outbox.as_ref(), channel, &text).await {
                warn!(err=%err, "final scores failed");
            }
            info!(channel = channel.0, "game finished");
        }

        if !over {
            self.next_round(channel, epoch, pace).await;
        }
    }

    /// Draw and announce the next prompt. `pace` adds the breather delay
    /// when more than one player is racing.
    async fn next_round(self: Arc<Self>, channel: ChannelId, epoch: u64, pace: bool) {
        let tier = {
            let sessions = self.sessions.lock().await;
            let Some(session) = sessions.get(&channel) else {
                return;
            };
            if session.epoch != epoch {
                return;
            }
            let Some(d) = session.difficulty() else {
                return;
            };
            d
        };

        let sentence = match self.repo.random_sentence(tier).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!(tier = tier.label(), "sentence store empty; using fallback");
                FALLBACK_SENTENCE.to_string()
            }
            Err(err) => {
                warn!(err=%err, "sentence lookup failed; using fallback");
                FALLBACK_SENTENCE.to_string()
            }
        };

        if pace {
            tokio::time::sleep(self.cfg.pace_delay).await;
        }

        // Re-validate after the sleep, start the clock, then announce
        // with the lock released.
        {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(&channel) else {
                return;
            };
            if session.epoch != epoch || session.phase() != Phase::RoundResolving {
                return;
            }
            session.install_round(sentence.clone(), Instant::now());
        }
        if let Err(err) = self
            .outbox
            .send_text(channel, &format!("# prompt: {sentence}"))
            .await
        {
            warn!(err=%err, "prompt send failed");
        }
    }

    async fn show_rankings(&self, channel: ChannelId) -> anyhow::Result<()> {
        let rows = match self.repo.best_times(self.cfg.ranking_limit).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(err=%err, "best-time query failed");
                self.outbox.send_text(channel, MSG_RECORDS_DOWN).await?;
                return Ok(());
            }
        };
        if rows.is_empty() {
            self.outbox.send_text(channel, MSG_NO_RECORDS).await?;
            return Ok(());
        }

        let mut text = String::from("# fastest records\n");
        for r in &rows {
            text.push_str(&format!("- {}\n    best: {:.2}s ({})\n", r.sentence, r.elapsed, r.player));
        }
        outbox::send_chunked(self.outbox.as_ref(), channel, &text).await
    }

    /// Idle-timeout supervisor: one long-lived loop for all sessions.
    /// Bound is "within one poll of the deadline", not exact real time.
    pub async fn supervise(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.cfg.poll_interval).await;
            self.sweep_idle().await;
        }
    }

    /// One supervisor pass. Separate from the loop so tests can drive it.
    pub async fn sweep_idle(&self) {
        let now = Instant::now();
        let expired: Vec<ChannelId> = {
            let mut sessions = self.sessions.lock().await;
            let expired: Vec<ChannelId> = sessions
                .iter()
                .filter(|(_, s)| s.idle_for(now) >= self.cfg.idle_timeout)
                .map(|(c, _)| *c)
                .collect();
            for c in &expired {
                if let Some(mut s) = sessions.remove(c) {
                    s.end();
                }
            }
            expired
        };
        for c in expired {
            info!(channel = c.0, "session idle past deadline; ending game");
            if let Err(err) = self.outbox.send_text(c, MSG_TIMEOUT).await {
                warn!(err=%err, "timeout notice failed");
            }
        }
    }
}
