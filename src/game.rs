use std::sync::Arc;

use dashmap::DashMap;
use log::{error, info};
use thiserror::Error;

use crate::{
    app::{
        ArcClientService, ArcGameRepository, ArcMatchRepository, ArcPlayerService,
        ArcRatingService, ServiceError, ServiceResult,
    },
    persistence::games::GameInfo,
    player::PlayerId,
    protocol::{OpponentInfo, ServerMessage},
    rules::{GameState, GridGame, Seat},
};

pub type MatchId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("You are not in an active match for this game")]
    NotInMatch,
    #[error("The match is already completed")]
    MatchAlreadyCompleted,
    #[error("It's not your turn")]
    NotYourTurn,
    #[error("Invalid move: {0}")]
    InvalidMove(String),
}

/// A running match: the rule-level game plus the two sessions playing it.
#[derive(Clone, Debug)]
pub struct Match {
    pub id: MatchId,
    pub info: GameInfo,
    pub players: (PlayerId, PlayerId),
    pub ranked: bool,
    pub game: GridGame,
}

impl Match {
    pub fn seat_of(&self, player_id: PlayerId) -> Option<Seat> {
        if self.players.0 == player_id {
            Some(Seat::One)
        } else if self.players.1 == player_id {
            Some(Seat::Two)
        } else {
            None
        }
    }

    pub fn player_of(&self, seat: Seat) -> PlayerId {
        match seat {
            Seat::One => self.players.0,
            Seat::Two => self.players.1,
        }
    }

    pub fn current_player(&self) -> PlayerId {
        self.player_of(self.game.current)
    }
}

pub trait MatchService {
    /// Creates a match for a freshly formed pair. `player_one` moves first.
    /// Both players are notified once the match row exists.
    fn create_match(
        &self,
        game: &GameInfo,
        player_one: PlayerId,
        player_two: PlayerId,
        ranked: bool,
    ) -> ServiceResult<MatchId>;
    fn try_make_move(&self, player_id: PlayerId, game_name: &str, mv: i64)
    -> ServiceResult<MatchId>;
    /// Rebuilds the in-memory registry from matches left active in the store.
    fn load_active_matches(&self) -> ServiceResult<usize>;
    fn active_match_of(&self, player_id: PlayerId, game_name: &str) -> Option<MatchId>;
}

pub struct MatchServiceImpl {
    client_service: ArcClientService,
    player_service: ArcPlayerService,
    rating_service: ArcRatingService,
    game_repository: ArcGameRepository,
    match_repository: ArcMatchRepository,
    matches: Arc<DashMap<MatchId, Match>>,
    match_by_player: Arc<DashMap<(PlayerId, String), MatchId>>,
}

impl MatchServiceImpl {
    pub fn new(
        client_service: ArcClientService,
        player_service: ArcPlayerService,
        rating_service: ArcRatingService,
        game_repository: ArcGameRepository,
        match_repository: ArcMatchRepository,
    ) -> Self {
        Self {
            client_service,
            player_service,
            rating_service,
            game_repository,
            match_repository,
            matches: Arc::new(DashMap::new()),
            match_by_player: Arc::new(DashMap::new()),
        }
    }

    fn register_match(&self, m: Match) {
        self.match_by_player
            .insert((m.players.0, m.info.name.clone()), m.id);
        self.match_by_player
            .insert((m.players.1, m.info.name.clone()), m.id);
        self.matches.insert(m.id, m);
    }

    fn unregister_match(&self, m: &Match) {
        self.matches.remove(&m.id);
        self.match_by_player
            .remove(&(m.players.0, m.info.name.clone()));
        self.match_by_player
            .remove(&(m.players.1, m.info.name.clone()));
    }

    fn opponent_rating(&self, m: &Match, player_id: PlayerId) -> ServiceResult<Option<f64>> {
        if !m.ranked {
            return Ok(None);
        }
        match self.player_service.account_id_of(player_id)? {
            Some(account_id) => Ok(Some(
                self.rating_service.get_rating(account_id, m.info.id)?,
            )),
            None => Ok(None),
        }
    }

    fn notify_match_found(&self, m: &Match) -> ServiceResult<()> {
        let seats = [(m.players.0, m.players.1, true), (m.players.1, m.players.0, false)];
        for (player, opponent, your_turn) in seats {
            let msg = ServerMessage::MatchFound {
                match_id: m.id,
                game_name: m.info.name.clone(),
                game_display_name: m.info.display_name.clone(),
                ranked: m.ranked,
                opponent: OpponentInfo {
                    player_id: opponent,
                    pseudo: self.player_service.pseudo_of(opponent)?,
                    rating: self.opponent_rating(m, opponent)?,
                },
                your_turn,
                board: m.game.board.clone(),
            };
            self.client_service.try_player_send(player, &msg);
        }
        Ok(())
    }

    /// Writes both rating rows of a finished ranked match. Failures are
    /// logged; a completed match never unwinds.
    fn apply_ratings(&self, m: &Match, winner_id: Option<PlayerId>) {
        if !m.ranked {
            return;
        }
        let accounts = (
            self.player_service.account_id_of(m.players.0),
            self.player_service.account_id_of(m.players.1),
        );
        let (Ok(Some(account_one)), Ok(Some(account_two))) = accounts else {
            error!(
                "Ranked match {} has a session without an account, ratings unchanged",
                m.id
            );
            return;
        };
        let result = match winner_id {
            Some(winner) if winner == m.players.0 => {
                self.rating_service
                    .apply_match_result(m.info.id, account_one, account_two)
            }
            Some(_) => self
                .rating_service
                .apply_match_result(m.info.id, account_two, account_one),
            None => self
                .rating_service
                .apply_match_draw(m.info.id, account_one, account_two),
        };
        if let Err(e) = result {
            error!("Failed to update ratings for match {}: {}", m.id, e);
        }
    }

    fn send_to_both(&self, players: (PlayerId, PlayerId), msg: &ServerMessage) {
        self.client_service.try_player_send(players.0, msg);
        self.client_service.try_player_send(players.1, msg);
    }
}

impl MatchService for MatchServiceImpl {
    fn create_match(
        &self,
        game: &GameInfo,
        player_one: PlayerId,
        player_two: PlayerId,
        ranked: bool,
    ) -> ServiceResult<MatchId> {
        let grid = GridGame::new(game.rules.clone());
        let match_id = self.match_repository.create_match(
            game.id,
            player_one,
            player_two,
            ranked,
            &grid.board,
        )?;
        let m = Match {
            id: match_id,
            info: game.clone(),
            players: (player_one, player_two),
            ranked,
            game: grid,
        };
        info!(
            "Match {} created: {} vs {} ({}, {})",
            match_id,
            player_one,
            player_two,
            game.name,
            if ranked { "ranked" } else { "casual" }
        );
        self.register_match(m.clone());
        if let Err(e) = self.notify_match_found(&m) {
            error!("Failed to notify players of match {}: {}", match_id, e);
        }
        Ok(match_id)
    }

    fn try_make_move(
        &self,
        player_id: PlayerId,
        game_name: &str,
        mv: i64,
    ) -> ServiceResult<MatchId> {
        let key = (player_id, game_name.to_string());
        let Some(match_id) = self.match_by_player.get(&key).map(|entry| *entry.value()) else {
            return Err(MoveError::NotInMatch.into());
        };
        let Some(mut entry) = self.matches.get_mut(&match_id) else {
            return Err(MoveError::NotInMatch.into());
        };
        if entry.game.state != GameState::Ongoing {
            return Err(MoveError::MatchAlreadyCompleted.into());
        }
        let seat = entry.seat_of(player_id).ok_or(MoveError::NotInMatch)?;
        if entry.game.current != seat {
            return Err(MoveError::NotYourTurn.into());
        }
        // A move the store will not take is rolled back and rejected; the
        // players only ever hear about boards the store already has.
        let prior = entry.game.clone();
        entry.game.play(mv).map_err(MoveError::InvalidMove)?;

        let snapshot = entry.clone();
        match snapshot.game.state {
            GameState::Ongoing => {
                let current_turn = snapshot.current_player();
                if let Err(e) = self.match_repository.update_board(
                    match_id,
                    &snapshot.game.board,
                    current_turn,
                ) {
                    error!("Failed to persist board of match {}: {}", match_id, e);
                    entry.game = prior;
                    return ServiceError::internal("Failed to store the move");
                }
                drop(entry);
                self.send_to_both(
                    snapshot.players,
                    &ServerMessage::GameUpdate {
                        match_id,
                        board: snapshot.game.board.clone(),
                        current_turn_id: current_turn,
                    },
                );
            }
            GameState::Won { winner } => {
                let winner_id = snapshot.player_of(winner);
                if let Err(e) = self.match_repository.complete_match(
                    match_id,
                    &snapshot.game.board,
                    Some(winner_id),
                ) {
                    error!("Failed to persist completion of match {}: {}", match_id, e);
                    entry.game = prior;
                    return ServiceError::internal("Failed to store the move");
                }
                self.apply_ratings(&snapshot, Some(winner_id));
                drop(entry);
                self.unregister_match(&snapshot);
                info!("Match {} won by player {}", match_id, winner_id);
                self.send_to_both(
                    snapshot.players,
                    &ServerMessage::GameOver {
                        match_id,
                        winner_id: Some(winner_id),
                        is_draw: false,
                        board: snapshot.game.board.clone(),
                    },
                );
            }
            GameState::Draw => {
                if let Err(e) =
                    self.match_repository
                        .complete_match(match_id, &snapshot.game.board, None)
                {
                    error!("Failed to persist completion of match {}: {}", match_id, e);
                    entry.game = prior;
                    return ServiceError::internal("Failed to store the move");
                }
                self.apply_ratings(&snapshot, None);
                drop(entry);
                self.unregister_match(&snapshot);
                info!("Match {} ended in a draw", match_id);
                self.send_to_both(
                    snapshot.players,
                    &ServerMessage::GameOver {
                        match_id,
                        winner_id: None,
                        is_draw: true,
                        board: snapshot.game.board.clone(),
                    },
                );
            }
        }
        Ok(match_id)
    }

    fn load_active_matches(&self) -> ServiceResult<usize> {
        let records = self.match_repository.get_active_matches()?;
        let mut loaded = 0;
        for record in records {
            let Some(game) = self.game_repository.get_game_by_id(record.game_id)? else {
                error!(
                    "Active match {} references unknown game {}, skipping",
                    record.id, record.game_id
                );
                continue;
            };
            let current = if record.current_turn_id == record.player1_id {
                Seat::One
            } else {
                Seat::Two
            };
            let grid = GridGame::resume(game.rules.clone(), record.board, current);
            let m = Match {
                id: record.id,
                info: game,
                players: (record.player1_id, record.player2_id),
                ranked: record.ranked,
                game: grid,
            };
            self.register_match(m);
            loaded += 1;
        }
        Ok(loaded)
    }

    fn active_match_of(&self, player_id: PlayerId, game_name: &str) -> Option<MatchId> {
        self.match_by_player
            .get(&(player_id, game_name.to_string()))
            .map(|entry| *entry.value())
    }
}
