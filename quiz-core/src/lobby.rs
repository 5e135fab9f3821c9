use chrono::{DateTime, Utc};
use quiz_types::{
    ChatMessage, GameSettings, GameType, Identity, JoinRequest, LobbyError, LobbyId, LobbyPlayer,
    LobbySnapshot, LobbyStatus, LobbySummary, PlayerId, PowerupKind, PublicQuestion, Question,
    SessionId, SettingsPatch,
};
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;
use std::time::Duration;
use uuid::Uuid;

use crate::events::LobbyEvent;
use crate::finalization::{self, RewardPolicy, SessionResults};
use crate::powerups::{PowerupAllowance, PowerupEffect};
use crate::round::{Advance, RoundPhase, Session, SubmitOutcome};
use crate::scoring::ScoringPolicy;
use crate::settings::validate_settings;

pub const CHAT_HISTORY_LIMIT: usize = 100;
pub const CHAT_MESSAGE_LENGTH: RangeInclusive<usize> = 1..=300;
pub const LOBBY_CODE_LENGTH: usize = 6;
const LOBBY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_lobby_code<R: Rng + ?Sized>(rng: &mut R) -> LobbyId {
    let code: String = (0..LOBBY_CODE_LENGTH)
        .map(|_| LOBBY_CODE_ALPHABET[rng.random_range(0..LOBBY_CODE_ALPHABET.len())] as char)
        .collect();
    LobbyId::new(code)
}

/// Process-wide rules every lobby is created with.
#[derive(Debug, Clone)]
pub struct LobbyRules {
    pub max_players: usize,
    pub allowance: PowerupAllowance,
    pub time_freeze: Duration,
    pub rewards: RewardPolicy,
}

impl Default for LobbyRules {
    fn default() -> Self {
        Self {
            max_players: 8,
            allowance: PowerupAllowance::default(),
            time_freeze: Duration::from_secs(10),
            rewards: RewardPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Admitted,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { round_complete: bool },
    RequestCancelled,
    /// The last member left; the lobby should be dropped.
    Closed,
}

/// The lobby document: membership, settings, chat and the running session.
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    game_type: GameType,
    status: LobbyStatus,
    host: PlayerId,
    players: BTreeMap<PlayerId, LobbyPlayer>,
    settings: GameSettings,
    join_requests: Vec<JoinRequest>,
    chat: VecDeque<ChatMessage>,
    session: Option<Session>,
    results: Option<SessionResults>,
    rules: LobbyRules,
    next_join_order: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Lobby {
    pub fn create(
        id: LobbyId,
        game_type: GameType,
        host: &Identity,
        settings: Option<&SettingsPatch>,
        rules: LobbyRules,
        now: DateTime<Utc>,
    ) -> Result<Self, LobbyError> {
        if host.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }

        let settings = settings
            .map(|patch| patch.apply_to(&GameSettings::default()))
            .unwrap_or_default();
        validate_settings(game_type, &settings)?;

        let mut lobby = Self {
            id,
            game_type,
            status: LobbyStatus::Waiting,
            host: host.id,
            players: BTreeMap::new(),
            settings,
            join_requests: Vec::new(),
            chat: VecDeque::new(),
            session: None,
            results: None,
            rules,
            next_join_order: 0,
            created_at: now,
            updated_at: now,
        };
        lobby.admit(
            host.id,
            host.display_name.clone(),
            host.profile_picture.clone(),
            host.restrictions.chat_ban,
            now,
        );
        lobby.system_message(format!("{} created the lobby", host.display_name), now);
        Ok(lobby)
    }

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    pub fn host(&self) -> PlayerId {
        self.host
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn pending_results(&self) -> Option<&SessionResults> {
        self.results.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn capacity(&self) -> usize {
        self.game_type.format().capacity(self.rules.max_players)
    }

    pub fn is_member(&self, player_id: &PlayerId) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn member(&self, player_id: &PlayerId) -> Option<&LobbyPlayer> {
        self.players.get(player_id)
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_join_request(&self, player_id: &PlayerId) -> bool {
        self.join_requests
            .iter()
            .any(|request| request.player_id == *player_id)
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    pub fn round_phase(&self) -> RoundPhase {
        match (self.status, &self.session) {
            (LobbyStatus::InProgress, Some(session)) => session.phase(),
            (LobbyStatus::Finished, _) => RoundPhase::SessionFinalizing,
            _ => RoundPhase::Idle,
        }
    }

    pub fn ready_to_start(&self) -> bool {
        self.status == LobbyStatus::Waiting
            && self.players.len() >= self.game_type.format().min_players()
            && self.players.values().all(|player| player.ready)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn ensure_host(&self, actor: PlayerId, action: &str) -> Result<(), LobbyError> {
        if actor != self.host {
            return Err(LobbyError::forbidden(format!("only the host can {}", action)));
        }
        Ok(())
    }

    fn ensure_member(&self, player_id: &PlayerId) -> Result<(), LobbyError> {
        if !self.is_member(player_id) {
            return Err(LobbyError::forbidden("not a member of this lobby"));
        }
        Ok(())
    }

    fn admit(
        &mut self,
        player_id: PlayerId,
        display_name: String,
        profile_picture: Option<String>,
        chat_ban: bool,
        now: DateTime<Utc>,
    ) {
        let join_order = self.next_join_order;
        self.next_join_order += 1;
        self.players.insert(
            player_id,
            LobbyPlayer {
                id: player_id,
                display_name,
                profile_picture,
                ready: false,
                chat_ban,
                joined_at: now,
                join_order,
            },
        );
        self.touch(now);
    }

    fn system_message(&mut self, text: String, now: DateTime<Utc>) -> LobbyEvent {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            author: None,
            author_name: ChatMessage::SYSTEM_AUTHOR.to_string(),
            message: text,
            sent_at: now,
        };
        self.push_chat(message.clone());
        LobbyEvent::ChatPosted {
            lobby_id: self.id.clone(),
            message,
        }
    }

    fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push_back(message);
        while self.chat.len() > CHAT_HISTORY_LIMIT {
            self.chat.pop_front();
        }
    }

    fn players_in_join_order(&self) -> Vec<LobbyPlayer> {
        let mut players: Vec<LobbyPlayer> = self.players.values().cloned().collect();
        players.sort_by_key(|player| player.join_order);
        players
    }

    pub fn lobby_updated(&self) -> LobbyEvent {
        LobbyEvent::LobbyUpdated {
            lobby_id: self.id.clone(),
            status: self.status,
            host: self.host,
            players: self.players_in_join_order(),
            join_requests: self.join_requests.clone(),
        }
    }

    /// Admits the caller directly into a public lobby, or queues a join
    /// request for the host of a private one.
    pub fn request_join(
        &mut self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<(JoinOutcome, Vec<LobbyEvent>), LobbyError> {
        if identity.restrictions.game_ban {
            return Err(LobbyError::Banned);
        }
        if self.is_member(&identity.id) {
            return Err(LobbyError::AlreadyInLobby {
                lobby_id: self.id.to_string(),
            });
        }
        if self.status != LobbyStatus::Waiting {
            return Err(LobbyError::conflict("a session is already in progress"));
        }
        if self.players.len() >= self.capacity() {
            return Err(LobbyError::RoomFull);
        }

        if self.settings.public_visible {
            self.admit(
                identity.id,
                identity.display_name.clone(),
                identity.profile_picture.clone(),
                identity.restrictions.chat_ban,
                now,
            );
            let chat = self.system_message(format!("{} joined the lobby", identity.display_name), now);
            return Ok((JoinOutcome::Admitted, vec![self.lobby_updated(), chat]));
        }

        if self.has_join_request(&identity.id) {
            return Err(LobbyError::conflict("a join request is already pending"));
        }

        let request = JoinRequest {
            player_id: identity.id,
            display_name: identity.display_name.clone(),
            profile_picture: identity.profile_picture.clone(),
            chat_ban: identity.restrictions.chat_ban,
            requested_at: now,
        };
        self.join_requests.push(request.clone());
        self.touch(now);

        Ok((
            JoinOutcome::Pending,
            vec![LobbyEvent::JoinRequested {
                lobby_id: self.id.clone(),
                request,
            }],
        ))
    }

    pub fn approve_join(
        &mut self,
        actor: PlayerId,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.ensure_host(actor, "approve join requests")?;
        let position = self
            .join_requests
            .iter()
            .position(|request| request.player_id == player_id)
            .ok_or_else(|| LobbyError::NotFound {
                what: "join request".to_string(),
            })?;
        if self.players.len() >= self.capacity() {
            return Err(LobbyError::RoomFull);
        }

        let request = self.join_requests.remove(position);
        self.admit(
            request.player_id,
            request.display_name.clone(),
            request.profile_picture,
            request.chat_ban,
            now,
        );
        let chat = self.system_message(format!("{} joined the lobby", request.display_name), now);
        Ok(vec![self.lobby_updated(), chat])
    }

    pub fn deny_join(
        &mut self,
        actor: PlayerId,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.ensure_host(actor, "deny join requests")?;
        let position = self
            .join_requests
            .iter()
            .position(|request| request.player_id == player_id)
            .ok_or_else(|| LobbyError::NotFound {
                what: "join request".to_string(),
            })?;
        self.join_requests.remove(position);
        self.touch(now);

        Ok(vec![
            LobbyEvent::JoinRequestDropped {
                lobby_id: self.id.clone(),
                player_id,
            },
            self.lobby_updated(),
        ])
    }

    /// Removes a member, or withdraws a pending join request. Promotes the
    /// earliest-joined remaining member when the host leaves. Members cannot
    /// leave a finished lobby whose results have not been committed.
    pub fn leave(
        &mut self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(LeaveOutcome, Vec<LobbyEvent>), LobbyError> {
        if let Some(position) = self
            .join_requests
            .iter()
            .position(|request| request.player_id == player_id)
        {
            self.join_requests.remove(position);
            self.touch(now);
            return Ok((LeaveOutcome::RequestCancelled, vec![self.lobby_updated()]));
        }

        // Unsaved results live only on this lobby until they are committed
        if self.status == LobbyStatus::Finished
            && self.results.is_some()
            && self.players.contains_key(&player_id)
        {
            return Err(LobbyError::conflict(
                "results are still being saved; leave once they are committed",
            ));
        }
        let Some(departed) = self.players.remove(&player_id) else {
            return Err(LobbyError::NotFound {
                what: "lobby member".to_string(),
            });
        };
        self.touch(now);

        if self.players.is_empty() {
            self.session = None;
            return Ok((
                LeaveOutcome::Closed,
                vec![LobbyEvent::LobbyClosed {
                    lobby_id: self.id.clone(),
                    reason: "every member has left".to_string(),
                }],
            ));
        }

        let mut events = Vec::new();
        events.push(self.system_message(format!("{} left the lobby", departed.display_name), now));

        if departed.id == self.host {
            let next_host = self
                .players
                .values()
                .min_by_key(|player| player.join_order)
                .map(|player| (player.id, player.display_name.clone()));
            if let Some((host_id, host_name)) = next_host {
                self.host = host_id;
                events.push(self.system_message(format!("{} is now the host", host_name), now));
            }
        }

        let round_complete = match (self.status, self.session.as_mut()) {
            (LobbyStatus::InProgress, Some(session)) => session.remove_player(&player_id),
            _ => false,
        };

        events.insert(0, self.lobby_updated());
        if round_complete {
            events.extend(self.reveal_current_round());
        }

        Ok((LeaveOutcome::Left { round_complete }, events))
    }

    pub fn set_ready(
        &mut self,
        player_id: PlayerId,
        ready: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.ensure_member(&player_id)?;
        if self.status != LobbyStatus::Waiting {
            return Err(LobbyError::not_active("readiness can only change while waiting"));
        }
        if let Some(player) = self.players.get_mut(&player_id) {
            player.ready = ready;
        }
        self.touch(now);
        Ok(vec![self.lobby_updated()])
    }

    pub fn update_settings(
        &mut self,
        actor: PlayerId,
        patch: &SettingsPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        self.ensure_host(actor, "change settings")?;
        if self.status != LobbyStatus::Waiting {
            return Err(LobbyError::forbidden("settings can only change while waiting"));
        }

        let settings = patch.apply_to(&self.settings);
        validate_settings(self.game_type, &settings)?;
        self.settings = settings;

        let host = self.host;
        for player in self.players.values_mut() {
            if player.id != host {
                player.ready = false;
            }
        }
        self.touch(now);

        Ok(vec![
            LobbyEvent::SettingsUpdated {
                lobby_id: self.id.clone(),
                settings: self.settings.clone(),
            },
            self.lobby_updated(),
        ])
    }

    pub fn send_chat(
        &mut self,
        identity: &Identity,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        let member = self
            .players
            .get(&identity.id)
            .ok_or_else(|| LobbyError::forbidden("not a member of this lobby"))?;
        if identity.restrictions.chat_ban || member.chat_ban {
            return Err(LobbyError::forbidden("chat is disabled for this player"));
        }

        let text = text.trim();
        if !CHAT_MESSAGE_LENGTH.contains(&text.chars().count()) {
            return Err(LobbyError::invalid_input(format!(
                "chat messages must be between {} and {} characters",
                CHAT_MESSAGE_LENGTH.start(),
                CHAT_MESSAGE_LENGTH.end()
            )));
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            author: Some(identity.id),
            author_name: member.display_name.clone(),
            message: text.to_string(),
            sent_at: now,
        };
        self.push_chat(message.clone());
        self.touch(now);

        Ok(vec![LobbyEvent::ChatPosted {
            lobby_id: self.id.clone(),
            message,
        }])
    }

    /// Starts a session with the drawn questions. Pending join requests are cancelled.
    pub fn start_session(
        &mut self,
        session_id: SessionId,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        if self.status != LobbyStatus::Waiting {
            return Err(LobbyError::conflict("a session is already in progress"));
        }
        if !self.ready_to_start() {
            return Err(LobbyError::conflict("not every member is ready"));
        }

        let session = Session::new(
            session_id,
            self.game_type.format(),
            questions,
            self.players.keys().copied(),
            self.settings.time_per_question,
            &self.rules.allowance,
            now,
        )?;

        let lobby_id = self.id.clone();
        let mut events: Vec<LobbyEvent> = self
            .join_requests
            .drain(..)
            .map(|request| LobbyEvent::JoinRequestDropped {
                lobby_id: lobby_id.clone(),
                player_id: request.player_id,
            })
            .collect();

        for player in self.players.values_mut() {
            player.ready = false;
        }
        self.status = LobbyStatus::InProgress;
        self.touch(now);

        let round_started = LobbyEvent::RoundStarted {
            lobby_id,
            session_id,
            round_index: session.current_index(),
            total_rounds: session.total_rounds(),
            question: PublicQuestion::from(session.current_question()),
            deadline: session.round_deadline(),
        };
        self.session = Some(session);

        events.push(self.lobby_updated());
        events.push(self.system_message("The game has started".to_string(), now));
        events.push(round_started);
        Ok(events)
    }

    fn active_session_mut(&mut self) -> Result<&mut Session, LobbyError> {
        match (self.status, self.session.as_mut()) {
            (LobbyStatus::InProgress, Some(session)) => Ok(session),
            _ => Err(LobbyError::not_active("no session is in progress")),
        }
    }

    /// Records an answer. When it completes the round, the round is revealed
    /// and the reveal event is included.
    pub fn submit_answer(
        &mut self,
        player_id: PlayerId,
        selected_option: &str,
        active_powerups: &[PowerupKind],
        scoring: &dyn ScoringPolicy,
        now: DateTime<Utc>,
    ) -> Result<(SubmitOutcome, Vec<LobbyEvent>), LobbyError> {
        self.ensure_member(&player_id)?;
        let time_freeze = self.rules.time_freeze;
        let session = self.active_session_mut()?;
        let outcome = session.submit_answer(
            player_id,
            selected_option,
            active_powerups,
            scoring,
            time_freeze,
            now,
        )?;
        self.touch(now);

        let lobby_id = self.id.clone();
        let mut events = vec![LobbyEvent::PlayerSubmitted {
            lobby_id: lobby_id.clone(),
            round_index: outcome.result.round_index,
            player_id,
        }];
        if let Some(deadline) = outcome.deadline_extended {
            events.push(LobbyEvent::RoundExtended {
                lobby_id,
                round_index: outcome.result.round_index,
                deadline,
            });
        }
        if outcome.round_complete {
            events.extend(self.reveal_current_round());
        }

        Ok((outcome, events))
    }

    pub fn activate_powerup<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        kind: PowerupKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(PowerupEffect, Vec<LobbyEvent>), LobbyError> {
        self.ensure_member(&player_id)?;
        let time_freeze = self.rules.time_freeze;
        let session = self.active_session_mut()?;
        let round_index = session.current_index();
        let effect = session.activate_powerup(player_id, kind, time_freeze, now, rng)?;
        self.touch(now);

        let events = match &effect {
            PowerupEffect::TimeExtended { deadline } => vec![LobbyEvent::RoundExtended {
                lobby_id: self.id.clone(),
                round_index,
                deadline: *deadline,
            }],
            _ => Vec::new(),
        };
        Ok((effect, events))
    }

    fn reveal_current_round(&mut self) -> Option<LobbyEvent> {
        let reveal = self.session.as_mut()?.close_round()?;
        Some(LobbyEvent::RoundRevealed {
            lobby_id: self.id.clone(),
            reveal,
        })
    }

    /// Closes `round_index` if it is still the open round. Stale or repeated
    /// closures produce no events.
    pub fn close_round(&mut self, round_index: u32, now: DateTime<Utc>) -> Vec<LobbyEvent> {
        if self.status != LobbyStatus::InProgress {
            return Vec::new();
        }
        match &self.session {
            Some(session) if session.current_index() == round_index => {}
            _ => return Vec::new(),
        }
        let events: Vec<LobbyEvent> = self.reveal_current_round().into_iter().collect();
        if !events.is_empty() {
            self.touch(now);
        }
        events
    }

    /// Moves past a revealed round. `actor` is `None` when driven by the
    /// server's reveal timer. Advancing past the last round moves the lobby
    /// to `Finished` and computes the session results.
    pub fn advance_round(
        &mut self,
        actor: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> Result<(Advance, Vec<LobbyEvent>), LobbyError> {
        if let Some(actor) = actor {
            self.ensure_host(actor, "advance rounds")?;
        }
        let session = self.active_session_mut()?;
        let advance = session.advance(now)?;
        let session_id = session.session_id;
        self.touch(now);

        let events = match &advance {
            Advance::NextRound {
                round_index,
                question,
                deadline,
            } => vec![LobbyEvent::RoundStarted {
                lobby_id: self.id.clone(),
                session_id,
                round_index: *round_index,
                total_rounds: self.session.as_ref().map_or(0, |s| s.total_rounds()),
                question: question.clone(),
                deadline: *deadline,
            }],
            Advance::Finished => {
                self.status = LobbyStatus::Finished;
                self.results = self.compute_results(now);
                vec![self.lobby_updated()]
            }
        };
        Ok((advance, events))
    }

    fn compute_results(&self, now: DateTime<Utc>) -> Option<SessionResults> {
        let session = self.session.as_ref()?;
        let names: BTreeMap<PlayerId, String> = self
            .players
            .values()
            .map(|player| (player.id, player.display_name.clone()))
            .collect();
        Some(finalization::summarize(
            &self.id,
            self.game_type,
            self.settings.difficulty,
            session,
            &names,
            &self.rules.rewards,
            now,
        ))
    }

    /// Resets the lobby for another session once results for `session_id`
    /// have been committed.
    pub fn complete_finalization(
        &mut self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        let results = match (self.status, self.results.take()) {
            (LobbyStatus::Finished, Some(results)) if results.session_id == session_id => results,
            (_, results) => {
                self.results = results;
                return Err(LobbyError::conflict("no session is awaiting finalization"));
            }
        };

        self.status = LobbyStatus::Waiting;
        self.session = None;
        for player in self.players.values_mut() {
            player.ready = false;
        }
        self.touch(now);

        Ok(vec![
            LobbyEvent::SessionFinished {
                lobby_id: self.id.clone(),
                session_id,
                results: results.summaries,
            },
            self.lobby_updated(),
            self.system_message("Results saved. Ready up for another round!".to_string(), now),
        ])
    }

    pub fn snapshot(&self, viewer: Option<PlayerId>) -> LobbySnapshot {
        LobbySnapshot {
            id: self.id.clone(),
            game_type: self.game_type,
            status: self.status,
            host: self.host,
            players: self.players_in_join_order(),
            settings: self.settings.clone(),
            join_requests: self.join_requests.clone(),
            chat: self.chat.iter().cloned().collect(),
            game: self.session.as_ref().map(|session| session.view(viewer)),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id.clone(),
            name: self.settings.name.clone(),
            game_type: self.game_type,
            host_name: self
                .players
                .get(&self.host)
                .map(|player| player.display_name.clone())
                .unwrap_or_default(),
            player_count: self.players.len() as u32,
            capacity: self.capacity() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::StandardScoring;
    use quiz_types::{AnswerOutcome, ApprovalState, Restrictions};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn identity(name: &str) -> Identity {
        Identity::new(Uuid::new_v4(), name)
    }

    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question {
                id: format!("q{}", i),
                prompt: format!("Question {}", i),
                options: vec!["Right".to_string(), "Wrong".to_string()],
                answer: "Right".to_string(),
                explanation: None,
                category: "general".to_string(),
                difficulty: 1,
                approval: ApprovalState::Approved,
                community: false,
            })
            .collect()
    }

    fn create_lobby(game_type: GameType, host: &Identity, public: bool) -> Lobby {
        let patch = SettingsPatch {
            num_questions: Some(3),
            public_visible: Some(public),
            ..Default::default()
        };
        Lobby::create(
            LobbyId::new("TEST01"),
            game_type,
            host,
            Some(&patch),
            LobbyRules::default(),
            Utc::now(),
        )
        .unwrap()
    }

    fn start(lobby: &mut Lobby, now: DateTime<Utc>) {
        for id in lobby.member_ids() {
            lobby.set_ready(id, true, now).unwrap();
        }
        lobby.start_session(Uuid::new_v4(), questions(3), now).unwrap();
    }

    #[test]
    fn test_generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let code = generate_lobby_code(&mut rng);
            assert_eq!(code.as_str().len(), LOBBY_CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| LOBBY_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_create_rejects_banned_host_and_bad_settings() {
        let banned = identity("Banned").with_restrictions(Restrictions {
            chat_ban: false,
            game_ban: true,
        });
        let result = Lobby::create(
            LobbyId::new("AAAAAA"),
            GameType::VersusClassic,
            &banned,
            None,
            LobbyRules::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(LobbyError::Banned)));

        let patch = SettingsPatch {
            difficulty: Some(9),
            ..Default::default()
        };
        let result = Lobby::create(
            LobbyId::new("AAAAAA"),
            GameType::VersusClassic,
            &identity("Host"),
            Some(&patch),
            LobbyRules::default(),
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(LobbyError::InvalidSettings { ref field, .. }) if field == "difficulty"
        ));
    }

    #[test]
    fn test_create_narrates_in_chat() {
        let host = identity("Alice");
        let lobby = create_lobby(GameType::VersusClassic, &host, true);
        let chat: Vec<_> = lobby.chat().collect();
        assert_eq!(chat.len(), 1);
        assert!(chat[0].is_system());
        assert_eq!(chat[0].message, "Alice created the lobby");
        assert_eq!(lobby.host(), host.id);
    }

    #[test]
    fn test_public_join_admits_immediately() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);

        let (outcome, events) = lobby.request_join(&guest, Utc::now()).unwrap();
        assert_eq!(outcome, JoinOutcome::Admitted);
        assert!(lobby.is_member(&guest.id));
        assert!(matches!(events[0], LobbyEvent::LobbyUpdated { .. }));

        assert!(matches!(
            lobby.request_join(&guest, Utc::now()),
            Err(LobbyError::AlreadyInLobby { .. })
        ));
    }

    #[test]
    fn test_private_join_needs_host_approval() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::CoopClassic, &host, false);
        let now = Utc::now();

        let (outcome, _) = lobby.request_join(&guest, now).unwrap();
        assert_eq!(outcome, JoinOutcome::Pending);
        assert!(!lobby.is_member(&guest.id));

        assert!(matches!(
            lobby.approve_join(guest.id, guest.id, now),
            Err(LobbyError::Forbidden { .. })
        ));
        lobby.approve_join(host.id, guest.id, now).unwrap();
        assert!(lobby.is_member(&guest.id));
        assert!(!lobby.has_join_request(&guest.id));
    }

    #[test]
    fn test_deny_join_notifies_requester() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::CoopClassic, &host, false);
        let now = Utc::now();

        lobby.request_join(&guest, now).unwrap();
        let events = lobby.deny_join(host.id, guest.id, now).unwrap();
        assert!(matches!(
            events[0],
            LobbyEvent::JoinRequestDropped { player_id, .. } if player_id == guest.id
        ));
        assert!(matches!(
            lobby.deny_join(host.id, guest.id, now),
            Err(LobbyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_solo_lobby_is_full_with_host() {
        let host = identity("Solo");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        assert!(matches!(
            lobby.request_join(&identity("Other"), Utc::now()),
            Err(LobbyError::RoomFull)
        ));
    }

    #[test]
    fn test_host_leaving_promotes_earliest_member() {
        let host = identity("Host");
        let second = identity("Second");
        let third = identity("Third");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();
        lobby.request_join(&second, now).unwrap();
        lobby.request_join(&third, now).unwrap();

        let (outcome, _) = lobby.leave(host.id, now).unwrap();
        assert_eq!(outcome, LeaveOutcome::Left { round_complete: false });
        assert_eq!(lobby.host(), second.id);
        assert!(lobby
            .chat()
            .any(|message| message.message == "Second is now the host"));
    }

    #[test]
    fn test_last_member_leaving_closes_lobby() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let (outcome, events) = lobby.leave(host.id, Utc::now()).unwrap();
        assert_eq!(outcome, LeaveOutcome::Closed);
        assert!(matches!(events[0], LobbyEvent::LobbyClosed { .. }));
    }

    #[test]
    fn test_leave_unknown_player() {
        let mut lobby = create_lobby(GameType::VersusClassic, &identity("Host"), true);
        assert!(matches!(
            lobby.leave(Uuid::new_v4(), Utc::now()),
            Err(LobbyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_settings_update_is_host_only_and_resets_ready() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();
        lobby.request_join(&guest, now).unwrap();
        lobby.set_ready(guest.id, true, now).unwrap();
        lobby.set_ready(host.id, true, now).unwrap();

        let patch = SettingsPatch {
            time_per_question: Some(30),
            ..Default::default()
        };
        assert!(matches!(
            lobby.update_settings(guest.id, &patch, now),
            Err(LobbyError::Forbidden { .. })
        ));

        lobby.update_settings(host.id, &patch, now).unwrap();
        assert_eq!(lobby.settings().time_per_question, 30);
        assert!(!lobby.member(&guest.id).unwrap().ready);
        assert!(lobby.member(&host.id).unwrap().ready);
    }

    #[test]
    fn test_invalid_settings_leave_state_unchanged() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let before = lobby.settings().clone();

        let patch = SettingsPatch {
            name: Some("Renamed lobby".to_string()),
            num_questions: Some(500),
            ..Default::default()
        };
        assert!(matches!(
            lobby.update_settings(host.id, &patch, Utc::now()),
            Err(LobbyError::InvalidSettings { ref field, .. }) if field == "num_questions"
        ));
        assert_eq!(lobby.settings(), &before);
    }

    #[test]
    fn test_chat_rules() {
        let host = identity("Host");
        let muted = identity("Muted").with_restrictions(Restrictions {
            chat_ban: true,
            game_ban: false,
        });
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();
        lobby.request_join(&muted, now).unwrap();

        lobby.send_chat(&host, "  hello  ", now).unwrap();
        assert_eq!(lobby.chat().last().unwrap().message, "hello");

        assert!(matches!(
            lobby.send_chat(&muted, "hi", now),
            Err(LobbyError::Forbidden { .. })
        ));
        assert!(matches!(
            lobby.send_chat(&host, "   ", now),
            Err(LobbyError::InvalidInput { .. })
        ));
        assert!(matches!(
            lobby.send_chat(&identity("Stranger"), "hi", now),
            Err(LobbyError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_chat_history_is_bounded() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();
        for i in 0..(CHAT_HISTORY_LIMIT + 20) {
            lobby.send_chat(&host, &format!("message {}", i), now).unwrap();
        }
        assert_eq!(lobby.chat().count(), CHAT_HISTORY_LIMIT);
    }

    #[test]
    fn test_start_requires_everyone_ready() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();

        // Versus needs two members
        lobby.set_ready(host.id, true, now).unwrap();
        assert!(!lobby.ready_to_start());

        lobby.request_join(&guest, now).unwrap();
        assert!(!lobby.ready_to_start());
        assert!(matches!(
            lobby.start_session(Uuid::new_v4(), questions(3), now),
            Err(LobbyError::Conflict { .. })
        ));

        lobby.set_ready(guest.id, true, now).unwrap();
        assert!(lobby.ready_to_start());
        let events = lobby.start_session(Uuid::new_v4(), questions(3), now).unwrap();
        assert_eq!(lobby.status(), LobbyStatus::InProgress);
        assert_eq!(lobby.round_phase(), RoundPhase::RoundActive);
        assert!(matches!(events.last(), Some(LobbyEvent::RoundStarted { round_index: 0, .. })));
    }

    #[test]
    fn test_start_cancels_pending_join_requests() {
        let host = identity("Host");
        let pending = identity("Pending");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, false);
        let now = Utc::now();

        // Solo lobby is full, so use a coop lobby for the pending request
        let mut coop = create_lobby(GameType::CoopClassic, &host, false);
        let guest = identity("Guest");
        coop.request_join(&guest, now).unwrap();
        coop.approve_join(host.id, guest.id, now).unwrap();
        coop.request_join(&pending, now).unwrap();
        for id in coop.member_ids() {
            coop.set_ready(id, true, now).unwrap();
        }

        let events = coop.start_session(Uuid::new_v4(), questions(3), now).unwrap();
        assert!(events.iter().any(|event| matches!(
            event,
            LobbyEvent::JoinRequestDropped { player_id, .. } if *player_id == pending.id
        )));
        assert!(!coop.has_join_request(&pending.id));

        start(&mut lobby, now);
        assert!(matches!(
            lobby.request_join(&pending, now),
            Err(LobbyError::Conflict { .. })
        ));
    }

    #[test]
    fn test_ready_changes_rejected_mid_session() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        let now = Utc::now();
        start(&mut lobby, now);

        assert!(matches!(
            lobby.set_ready(host.id, false, now),
            Err(LobbyError::NotActive { .. })
        ));
    }

    #[test]
    fn test_full_solo_session_to_finalization() {
        let host = identity("Solo");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        let scoring = StandardScoring::default();
        let now = Utc::now();
        start(&mut lobby, now);

        for round in 0..3 {
            let (outcome, events) = lobby
                .submit_answer(host.id, "right", &[], &scoring, now)
                .unwrap();
            assert_eq!(outcome.result.outcome, AnswerOutcome::Correct);
            assert!(outcome.round_complete);
            assert!(events
                .iter()
                .any(|event| matches!(event, LobbyEvent::RoundRevealed { .. })));

            let (advance, _) = lobby.advance_round(None, now).unwrap();
            if round < 2 {
                assert!(matches!(advance, Advance::NextRound { .. }));
            } else {
                assert_eq!(advance, Advance::Finished);
            }
        }

        assert_eq!(lobby.status(), LobbyStatus::Finished);
        assert_eq!(lobby.round_phase(), RoundPhase::SessionFinalizing);
        let results = lobby.pending_results().unwrap().clone();
        assert_eq!(results.members[0].entry.correct_number, 3);

        // Mutations are refused while finalizing
        assert!(matches!(
            lobby.submit_answer(host.id, "right", &[], &scoring, now),
            Err(LobbyError::NotActive { .. })
        ));
        assert!(matches!(
            lobby.leave(host.id, now),
            Err(LobbyError::Conflict { .. })
        ));
        assert!(lobby.is_member(&host.id));

        assert!(matches!(
            lobby.complete_finalization(Uuid::new_v4(), now),
            Err(LobbyError::Conflict { .. })
        ));
        let events = lobby.complete_finalization(results.session_id, now).unwrap();
        assert!(matches!(events[0], LobbyEvent::SessionFinished { .. }));
        assert_eq!(lobby.status(), LobbyStatus::Waiting);
        assert!(lobby.session().is_none());
        assert!(lobby.pending_results().is_none());

        // A repeated finalization finds nothing to do
        assert!(lobby.complete_finalization(results.session_id, now).is_err());
    }

    #[test]
    fn test_stale_round_closure_is_ignored() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        let now = Utc::now();
        start(&mut lobby, now);

        assert!(lobby.close_round(5, now).is_empty());
        assert_eq!(lobby.close_round(0, now).len(), 1);
        assert!(lobby.close_round(0, now).is_empty());
    }

    #[test]
    fn test_only_host_advances() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let now = Utc::now();
        lobby.request_join(&guest, now).unwrap();
        start(&mut lobby, now);
        lobby.close_round(0, now);

        assert!(matches!(
            lobby.advance_round(Some(guest.id), now),
            Err(LobbyError::Forbidden { .. })
        ));
        assert!(lobby.advance_round(Some(host.id), now).is_ok());
    }

    #[test]
    fn test_leaving_mid_round_can_complete_it() {
        let host = identity("Host");
        let guest = identity("Guest");
        let mut lobby = create_lobby(GameType::VersusClassic, &host, true);
        let scoring = StandardScoring::default();
        let now = Utc::now();
        lobby.request_join(&guest, now).unwrap();
        start(&mut lobby, now);

        lobby
            .submit_answer(host.id, "Right", &[], &scoring, now)
            .unwrap();
        let (outcome, events) = lobby.leave(guest.id, now).unwrap();
        assert_eq!(outcome, LeaveOutcome::Left { round_complete: true });
        assert!(events
            .iter()
            .any(|event| matches!(event, LobbyEvent::RoundRevealed { .. })));
    }

    #[test]
    fn test_time_freeze_emits_extension() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        start(&mut lobby, now);

        let (effect, events) = lobby
            .activate_powerup(host.id, PowerupKind::TimeFreeze, now, &mut rng)
            .unwrap();
        assert!(matches!(effect, PowerupEffect::TimeExtended { .. }));
        assert!(matches!(events[0], LobbyEvent::RoundExtended { .. }));
    }

    #[test]
    fn test_snapshot_never_leaks_unrevealed_answer() {
        let host = identity("Host");
        let mut lobby = create_lobby(GameType::SoloClassic, &host, true);
        let now = Utc::now();
        start(&mut lobby, now);

        let snapshot = lobby.snapshot(Some(host.id));
        let game = snapshot.game.unwrap();
        assert!(game.revealed_answer.is_none());
        assert_eq!(game.question_ids.len(), 3);
        assert_eq!(snapshot.players.len(), 1);
    }
}
