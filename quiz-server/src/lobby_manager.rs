use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use quiz_core::{
    Advance, Audience, JoinOutcome, LeaveOutcome, Lobby, LobbyCleanup, LobbyEvent, LobbyRules,
    PowerupEffect, RoundPhase, ScoringPolicy, StandardScoring, generate_lobby_code,
};
use quiz_types::{
    AnswerResult, GameType, Identity, LobbyError, LobbyId, LobbySnapshot, LobbyStatus,
    LobbySummary, PlayerId, PowerupKind, ServerMessage, SettingsPatch,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::finalization::{Finalizer, PlayerProfileStore};
use crate::questions::QuestionProvider;
use crate::round_timer::{RoundTimers, TimerKind};
use crate::websocket::connection::{ConnectionId, ConnectionManager};

const LOBBY_CODE_ATTEMPTS: usize = 8;
const START_ATTEMPTS: usize = 3;

/// Tunables for the lobby registry, usually derived from [`Config`].
#[derive(Clone)]
pub struct ManagerOptions {
    pub rules: LobbyRules,
    pub reveal_duration: Duration,
    pub idle_timeout: Duration,
    pub finalize_max_attempts: u32,
    pub finalize_retry_base: Duration,
    pub scoring: Arc<dyn ScoringPolicy>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            rules: LobbyRules::default(),
            reveal_duration: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30 * 60),
            finalize_max_attempts: 3,
            finalize_retry_base: Duration::from_millis(250),
            scoring: Arc::new(StandardScoring::default()),
        }
    }
}

impl ManagerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rules: LobbyRules {
                max_players: config.max_players_per_lobby,
                time_freeze: config.time_freeze(),
                ..LobbyRules::default()
            },
            reveal_duration: config.reveal_duration(),
            idle_timeout: config.lobby_idle_timeout(),
            finalize_max_attempts: config.finalize_max_attempts,
            finalize_retry_base: config.finalize_retry_base(),
            ..Self::default()
        }
    }
}

/// Process-owned lobby registry. Every mutation of a lobby runs under that
/// lobby's mutex, and the events it produces are broadcast before the lock
/// is released so subscribers see them in commit order.
pub struct LobbyManager {
    lobbies: DashMap<LobbyId, Arc<Mutex<Lobby>>>,
    /// Player -> lobby they belong to or asked to join.
    memberships: DashMap<PlayerId, LobbyId>,
    finalizing: DashSet<LobbyId>,
    connections: Arc<ConnectionManager>,
    questions: Arc<dyn QuestionProvider>,
    finalizer: Finalizer,
    scoring: Arc<dyn ScoringPolicy>,
    timers: RoundTimers,
    rules: LobbyRules,
    reveal_duration: Duration,
    cleanup: LobbyCleanup,
    this: Weak<LobbyManager>,
}

impl LobbyManager {
    pub fn new(
        connections: Arc<ConnectionManager>,
        questions: Arc<dyn QuestionProvider>,
        store: Arc<dyn PlayerProfileStore>,
        options: ManagerOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            lobbies: DashMap::new(),
            memberships: DashMap::new(),
            finalizing: DashSet::new(),
            connections,
            questions,
            finalizer: Finalizer::new(
                store,
                options.finalize_max_attempts,
                options.finalize_retry_base,
            ),
            scoring: options.scoring,
            timers: RoundTimers::new(),
            rules: options.rules,
            reveal_duration: options.reveal_duration,
            cleanup: LobbyCleanup::new(options.idle_timeout),
            this: this.clone(),
        })
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    pub fn lobby_of(&self, player_id: &PlayerId) -> Option<LobbyId> {
        self.memberships
            .get(player_id)
            .map(|lobby_id| lobby_id.clone())
    }

    pub fn pending_timer(&self, lobby_id: &LobbyId) -> Option<(u32, TimerKind)> {
        self.timers.pending(lobby_id)
    }

    /// Locks a lobby that is still registered. A lobby removed while the
    /// caller waited for the lock is reported as missing.
    async fn acquire(&self, lobby_id: &LobbyId) -> Result<OwnedMutexGuard<Lobby>, LobbyError> {
        let lobby = self
            .lobbies
            .get(lobby_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LobbyError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;

        let guard = lobby.clone().lock_owned().await;
        let still_registered = self
            .lobbies
            .get(lobby_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &lobby));
        if !still_registered {
            return Err(LobbyError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            });
        }
        Ok(guard)
    }

    fn release_membership(&self, player_id: &PlayerId, lobby_id: &LobbyId) {
        self.memberships
            .remove_if(player_id, |_, current| current == lobby_id);
    }

    pub async fn create_lobby(
        &self,
        host: &Identity,
        game_type: GameType,
        settings: Option<SettingsPatch>,
    ) -> Result<LobbySnapshot, LobbyError> {
        if host.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }

        let mut created = None;
        for _ in 0..LOBBY_CODE_ATTEMPTS {
            let code = {
                let mut rng = rand::rng();
                generate_lobby_code(&mut rng)
            };
            let Entry::Vacant(slot) = self.lobbies.entry(code.clone()) else {
                debug!("Lobby code {} already taken, drawing another", code);
                continue;
            };
            let membership = match self.memberships.entry(host.id) {
                Entry::Occupied(existing) => {
                    return Err(LobbyError::AlreadyInLobby {
                        lobby_id: existing.get().to_string(),
                    });
                }
                Entry::Vacant(membership) => membership,
            };

            let lobby = Lobby::create(
                code.clone(),
                game_type,
                host,
                settings.as_ref(),
                self.rules.clone(),
                Utc::now(),
            )?;
            let snapshot = lobby.snapshot(Some(host.id));
            membership.insert(code.clone());
            slot.insert(Arc::new(Mutex::new(lobby)));
            created = Some(snapshot);
            break;
        }

        let Some(snapshot) = created else {
            warn!("Exhausted lobby code attempts for host {}", host.id);
            return Err(LobbyError::conflict(
                "could not allocate a lobby code, try again",
            ));
        };

        info!(
            lobby_id = %snapshot.id,
            player_id = %host.id,
            "Created {} lobby",
            game_type
        );
        self.connections
            .join_group_for_identity(host.id, &snapshot.id)
            .await;
        self.connections
            .send_to_identity(
                host.id,
                ServerMessage::LobbySnapshot {
                    lobby: snapshot.clone(),
                },
            )
            .await;
        Ok(snapshot)
    }

    pub async fn join_lobby(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
    ) -> Result<JoinOutcome, LobbyError> {
        if identity.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }
        let mut lobby = self.acquire(lobby_id).await?;

        match self.memberships.entry(identity.id) {
            Entry::Occupied(existing) => {
                return Err(LobbyError::AlreadyInLobby {
                    lobby_id: existing.get().to_string(),
                });
            }
            Entry::Vacant(membership) => {
                membership.insert(lobby_id.clone());
            }
        }

        let (outcome, events) = match lobby.request_join(identity, Utc::now()) {
            Ok(result) => result,
            Err(e) => {
                self.release_membership(&identity.id, lobby_id);
                return Err(e);
            }
        };

        self.apply_events(&lobby, events).await;
        match outcome {
            JoinOutcome::Admitted => {
                info!(lobby_id = %lobby_id, player_id = %identity.id, "Player joined lobby");
                self.admit_connections(&lobby, identity.id).await;
            }
            JoinOutcome::Pending => {
                info!(lobby_id = %lobby_id, player_id = %identity.id, "Join request queued");
                self.connections
                    .send_to_identity(
                        identity.id,
                        ServerMessage::JoinPending {
                            lobby_id: lobby_id.clone(),
                        },
                    )
                    .await;
            }
        }
        Ok(outcome)
    }

    pub async fn approve_join(
        &self,
        actor: &Identity,
        lobby_id: &LobbyId,
        player_id: PlayerId,
    ) -> Result<(), LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let events = lobby.approve_join(actor.id, player_id, Utc::now())?;
        self.apply_events(&lobby, events).await;
        self.admit_connections(&lobby, player_id).await;
        Ok(())
    }

    pub async fn deny_join(
        &self,
        actor: &Identity,
        lobby_id: &LobbyId,
        player_id: PlayerId,
    ) -> Result<(), LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let events = lobby.deny_join(actor.id, player_id, Utc::now())?;
        self.apply_events(&lobby, events).await;
        Ok(())
    }

    pub async fn leave_lobby(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
    ) -> Result<LeaveOutcome, LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let (outcome, events) = lobby.leave(identity.id, Utc::now())?;

        self.release_membership(&identity.id, lobby_id);
        self.connections
            .leave_group_for_identity(identity.id, lobby_id)
            .await;
        self.apply_events(&lobby, events).await;

        info!(lobby_id = %lobby_id, player_id = %identity.id, "Left lobby: {:?}", outcome);
        Ok(outcome)
    }

    pub async fn set_ready(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
        ready: bool,
    ) -> Result<(), LobbyError> {
        let should_start = {
            let mut lobby = self.acquire(lobby_id).await?;
            let events = lobby.set_ready(identity.id, ready, Utc::now())?;
            self.apply_events(&lobby, events).await;
            lobby.ready_to_start()
        };

        if should_start {
            self.try_start(lobby_id).await;
        }
        Ok(())
    }

    /// Starts a session once everyone is ready. Questions are drawn without
    /// holding the lobby lock; if the lobby changed meanwhile the draw is
    /// repeated against the new state.
    async fn try_start(&self, lobby_id: &LobbyId) {
        for _ in 0..START_ATTEMPTS {
            let (game_type, settings, observed_at) = match self.acquire(lobby_id).await {
                Ok(lobby) if lobby.ready_to_start() => {
                    (lobby.game_type(), lobby.settings().clone(), lobby.updated_at())
                }
                _ => return,
            };

            let drawn = self
                .questions
                .draw(game_type, &settings, settings.num_questions as usize)
                .await;

            let Ok(mut lobby) = self.acquire(lobby_id).await else {
                return;
            };
            if lobby.updated_at() != observed_at {
                debug!(lobby_id = %lobby_id, "Lobby changed while drawing questions");
                continue;
            }

            let result = drawn.and_then(|questions| {
                lobby.start_session(Uuid::new_v4(), questions, Utc::now())
            });
            match result {
                Ok(events) => {
                    info!(lobby_id = %lobby_id, "Session started");
                    self.apply_events(&lobby, events).await;
                }
                Err(e) => {
                    warn!(lobby_id = %lobby_id, "Could not start session: {}", e);
                    self.connections
                        .send_to_group(lobby_id, ServerMessage::error(&e))
                        .await;
                }
            }
            return;
        }
        warn!(lobby_id = %lobby_id, "Gave up starting session after repeated changes");
    }

    pub async fn update_settings(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
        patch: &SettingsPatch,
    ) -> Result<(), LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let events = lobby.update_settings(identity.id, patch, Utc::now())?;
        self.apply_events(&lobby, events).await;
        Ok(())
    }

    pub async fn send_chat(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
        message: &str,
    ) -> Result<(), LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let events = lobby.send_chat(identity, message, Utc::now())?;
        self.apply_events(&lobby, events).await;
        Ok(())
    }

    pub async fn submit_answer(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
        selected_option: &str,
        active_powerups: &[PowerupKind],
    ) -> Result<AnswerResult, LobbyError> {
        if identity.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }
        let mut lobby = self.acquire(lobby_id).await?;
        let (outcome, events) = lobby.submit_answer(
            identity.id,
            selected_option,
            active_powerups,
            self.scoring.as_ref(),
            Utc::now(),
        )?;

        self.connections
            .send_to_identity(
                identity.id,
                ServerMessage::AnswerAccepted {
                    lobby_id: lobby_id.clone(),
                    result: outcome.result.clone(),
                },
            )
            .await;
        self.apply_events(&lobby, events).await;
        Ok(outcome.result)
    }

    pub async fn activate_powerup(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
        kind: PowerupKind,
    ) -> Result<PowerupEffect, LobbyError> {
        if identity.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }
        let mut lobby = self.acquire(lobby_id).await?;
        let (effect, events) = {
            let mut rng = rand::rng();
            lobby.activate_powerup(identity.id, kind, Utc::now(), &mut rng)?
        };

        if let PowerupEffect::Hint { options } = &effect {
            let round_index = lobby.session().map_or(0, |session| session.current_index());
            self.connections
                .send_to_identity(
                    identity.id,
                    ServerMessage::HintGranted {
                        lobby_id: lobby_id.clone(),
                        round_index,
                        options: options.clone(),
                    },
                )
                .await;
        }
        self.apply_events(&lobby, events).await;
        Ok(effect)
    }

    /// Host-initiated advance past a revealed round.
    pub async fn advance_round(
        &self,
        identity: &Identity,
        lobby_id: &LobbyId,
    ) -> Result<(), LobbyError> {
        let mut lobby = self.acquire(lobby_id).await?;
        let (advance, events) = lobby.advance_round(Some(identity.id), Utc::now())?;
        self.apply_events(&lobby, events).await;
        if advance == Advance::Finished {
            self.spawn_finalize(lobby_id.clone());
        }
        Ok(())
    }

    /// Deadline timer body. A deadline pushed back by a time freeze is
    /// re-armed instead of closing early.
    pub async fn close_round_at_deadline(&self, lobby_id: &LobbyId, round_index: u32) {
        let Ok(mut lobby) = self.acquire(lobby_id).await else {
            return;
        };
        let now = Utc::now();
        if let Some(deadline) = lobby
            .session()
            .filter(|session| session.current_index() == round_index)
            .map(|session| session.round_deadline())
        {
            if deadline > now && lobby.round_phase() == RoundPhase::RoundActive {
                self.schedule_deadline(lobby_id, round_index, deadline, now);
                return;
            }
        }

        let events = lobby.close_round(round_index, now);
        if !events.is_empty() {
            debug!(lobby_id = %lobby_id, round_index, "Round closed at deadline");
        }
        self.apply_events(&lobby, events).await;
    }

    async fn on_reveal_elapsed(&self, lobby_id: &LobbyId, round_index: u32) {
        let Ok(mut lobby) = self.acquire(lobby_id).await else {
            return;
        };
        let still_showing = lobby.round_phase() == RoundPhase::RoundRevealed
            && lobby
                .session()
                .is_some_and(|session| session.current_index() == round_index);
        if !still_showing {
            return;
        }

        match lobby.advance_round(None, Utc::now()) {
            Ok((advance, events)) => {
                self.apply_events(&lobby, events).await;
                if advance == Advance::Finished {
                    self.spawn_finalize(lobby_id.clone());
                }
            }
            Err(e) => warn!(lobby_id = %lobby_id, "Automatic advance failed: {}", e),
        }
    }

    fn spawn_finalize(&self, lobby_id: LobbyId) {
        let Some(manager) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = manager.finalize(&lobby_id, None).await {
                warn!(lobby_id = %lobby_id, "Finalization did not complete: {}", e);
            }
        });
    }

    /// Commits a finished session's results and resets the lobby. The lobby
    /// stays `Finished`, which blocks gameplay mutations, while the profile
    /// store is written without holding its lock. Repeating the call after
    /// success is a no-op.
    pub async fn finalize(
        &self,
        lobby_id: &LobbyId,
        actor: Option<PlayerId>,
    ) -> Result<(), LobbyError> {
        if !self.finalizing.insert(lobby_id.clone()) {
            debug!(lobby_id = %lobby_id, "Finalization already in flight");
            return Ok(());
        }
        let result = self.run_finalization(lobby_id, actor).await;
        self.finalizing.remove(lobby_id);
        result
    }

    async fn run_finalization(
        &self,
        lobby_id: &LobbyId,
        actor: Option<PlayerId>,
    ) -> Result<(), LobbyError> {
        let results = {
            let lobby = self.acquire(lobby_id).await?;
            if let Some(actor) = actor {
                if !lobby.is_member(&actor) {
                    return Err(LobbyError::forbidden("not a member of this lobby"));
                }
            }
            match (lobby.status(), lobby.pending_results()) {
                (LobbyStatus::Finished, Some(results)) => results.clone(),
                (LobbyStatus::Waiting, _) => return Ok(()),
                _ => return Err(LobbyError::conflict("the session has not finished")),
            }
        };

        self.finalizer
            .commit_with_retry(&results)
            .await
            .map_err(|e| LobbyError::Internal {
                reason: format!("failed to save session results: {}", e),
            })?;

        let mut lobby = self.acquire(lobby_id).await?;
        let events = lobby.complete_finalization(results.session_id, Utc::now())?;
        self.apply_events(&lobby, events).await;
        Ok(())
    }

    /// Subscribes a connection to a lobby's broadcast group and sends it a
    /// full snapshot. Only members may subscribe.
    pub async fn join_group(
        &self,
        connection_id: ConnectionId,
        identity: &Identity,
        lobby_id: &LobbyId,
    ) -> Result<(), LobbyError> {
        let lobby = self.acquire(lobby_id).await?;
        if !lobby.is_member(&identity.id) {
            return Err(LobbyError::forbidden("only lobby members can subscribe"));
        }

        self.connections.join_group(connection_id, lobby_id).await;
        let _ = self
            .connections
            .send_to_connection(
                connection_id,
                ServerMessage::LobbySnapshot {
                    lobby: lobby.snapshot(Some(identity.id)),
                },
            )
            .await;
        Ok(())
    }

    pub async fn leave_group(&self, connection_id: ConnectionId, lobby_id: &LobbyId) {
        self.connections.leave_group(connection_id, lobby_id).await;
    }

    /// Snapshot for a viewer. Private lobbies are visible to members only.
    pub async fn snapshot(
        &self,
        lobby_id: &LobbyId,
        viewer: Option<PlayerId>,
    ) -> Result<LobbySnapshot, LobbyError> {
        let lobby = self.acquire(lobby_id).await?;
        let is_member = viewer.is_some_and(|viewer| lobby.is_member(&viewer));
        if !lobby.settings().public_visible && !is_member {
            return Err(LobbyError::forbidden("this lobby is private"));
        }
        Ok(lobby.snapshot(viewer))
    }

    /// Waiting, publicly visible lobbies.
    pub async fn public_lobbies(&self) -> Vec<LobbySummary> {
        let lobbies: Vec<Arc<Mutex<Lobby>>> = self
            .lobbies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut summaries = Vec::new();
        for lobby in lobbies {
            let lobby = lobby.lock().await;
            if lobby.status() == LobbyStatus::Waiting && lobby.settings().public_visible {
                summaries.push(lobby.summary());
            }
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Drops waiting lobbies idle past the configured threshold.
    pub async fn cleanup_idle_lobbies(&self) -> usize {
        let candidates: Vec<LobbyId> = self.lobbies.iter().map(|entry| entry.key().clone()).collect();

        let mut removed = 0;
        for lobby_id in candidates {
            let Ok(lobby) = self.acquire(&lobby_id).await else {
                continue;
            };
            if !self.cleanup.should_reap(&lobby, Utc::now()) {
                continue;
            }

            info!(lobby_id = %lobby_id, "Closing idle lobby");
            let closed = LobbyEvent::LobbyClosed {
                lobby_id: lobby_id.clone(),
                reason: self.cleanup.reason(),
            };
            self.apply_events(&lobby, vec![closed]).await;
            removed += 1;
        }
        removed
    }

    async fn admit_connections(&self, lobby: &Lobby, player_id: PlayerId) {
        self.connections
            .join_group_for_identity(player_id, lobby.id())
            .await;
        self.connections
            .send_to_identity(
                player_id,
                ServerMessage::LobbySnapshot {
                    lobby: lobby.snapshot(Some(player_id)),
                },
            )
            .await;
    }

    /// Single funnel for the events of a committed mutation: registry
    /// bookkeeping, broadcast, then timer arming. Called with the lobby
    /// lock held.
    async fn apply_events(&self, lobby: &Lobby, events: Vec<LobbyEvent>) {
        let lobby_id = lobby.id().clone();
        let now = Utc::now();

        for event in events {
            match &event {
                LobbyEvent::JoinRequestDropped { player_id, .. } => {
                    self.release_membership(player_id, &lobby_id);
                }
                LobbyEvent::RoundStarted {
                    round_index,
                    deadline,
                    ..
                }
                | LobbyEvent::RoundExtended {
                    round_index,
                    deadline,
                    ..
                } => self.schedule_deadline(&lobby_id, *round_index, *deadline, now),
                LobbyEvent::RoundRevealed { reveal, .. } => {
                    self.schedule_reveal_hold(&lobby_id, reveal.round_index)
                }
                _ => {}
            }

            if matches!(event, LobbyEvent::LobbyClosed { .. }) {
                self.close_lobby(&lobby_id, event.into_message()).await;
                continue;
            }

            match event.audience() {
                Audience::Group => {
                    self.connections
                        .send_to_group(&lobby_id, event.into_message())
                        .await
                }
                Audience::Player(player_id) => {
                    self.connections
                        .send_to_identity(player_id, event.into_message())
                        .await;
                }
            }
        }

        if lobby.status() == LobbyStatus::Finished {
            self.timers.cancel(&lobby_id);
        }
    }

    async fn close_lobby(&self, lobby_id: &LobbyId, message: ServerMessage) {
        self.timers.cancel(lobby_id);
        self.lobbies.remove(lobby_id);

        let released: Vec<PlayerId> = self
            .memberships
            .iter()
            .filter(|entry| entry.value() == lobby_id)
            .map(|entry| *entry.key())
            .collect();
        for player_id in &released {
            self.release_membership(player_id, lobby_id);
            self.connections
                .send_to_identity(*player_id, message.clone())
                .await;
        }
        self.connections.dissolve_group(lobby_id).await;
        info!(lobby_id = %lobby_id, "Lobby closed");
    }

    fn schedule_deadline(
        &self,
        lobby_id: &LobbyId,
        round_index: u32,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        let manager = self.this.clone();
        let target = lobby_id.clone();
        self.timers.schedule(
            lobby_id.clone(),
            round_index,
            TimerKind::RoundDeadline,
            delay,
            async move {
                if let Some(manager) = manager.upgrade() {
                    manager.close_round_at_deadline(&target, round_index).await;
                }
            },
        );
    }

    fn schedule_reveal_hold(&self, lobby_id: &LobbyId, round_index: u32) {
        let manager = self.this.clone();
        let target = lobby_id.clone();
        self.timers.schedule(
            lobby_id.clone(),
            round_index,
            TimerKind::RevealHold,
            self.reveal_duration,
            async move {
                if let Some(manager) = manager.upgrade() {
                    manager.on_reveal_elapsed(&target, round_index).await;
                }
            },
        );
    }
}
