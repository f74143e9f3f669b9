use std::time::Duration;

use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use crate::{
    app::{
        AppState, ArcClientService, ArcGameRepository, ArcMatchService, ArcPlayerService,
        ArcQueueRepository, ServiceError, ServiceResult,
    },
    persistence::{
        games::{GameId, GameInfo},
        queues::{QueueEntry, QueueId},
    },
    player::PlayerId,
};

const DEFAULT_PAIRING_INTERVAL_MS: u64 = 2000;

#[derive(Clone, Debug)]
pub struct QueueJoin {
    pub queue_id: QueueId,
    pub game: GameInfo,
    pub ranked: bool,
    pub position: u32,
}

pub trait QueueService {
    fn join_queue(
        &self,
        player_id: PlayerId,
        game_name: &str,
        ranked: bool,
    ) -> ServiceResult<QueueJoin>;
    fn leave_queue(&self, player_id: PlayerId, game_name: &str) -> ServiceResult<GameInfo>;
    /// Disconnect hook. Never fails; a purge that cannot reach the store is
    /// logged and dropped.
    fn remove_player(&self, player_id: PlayerId);
    /// Takes the two oldest entries of a queue, deleting them. Entries whose
    /// session is no longer connected are discarded along the way.
    fn take_oldest_pair(
        &self,
        game_id: GameId,
        ranked: bool,
    ) -> ServiceResult<Option<(QueueEntry, QueueEntry)>>;
}

pub struct QueueServiceImpl {
    client_service: ArcClientService,
    player_service: ArcPlayerService,
    match_service: ArcMatchService,
    queue_repository: ArcQueueRepository,
    game_repository: ArcGameRepository,
}

impl QueueServiceImpl {
    pub fn new(
        client_service: ArcClientService,
        player_service: ArcPlayerService,
        match_service: ArcMatchService,
        queue_repository: ArcQueueRepository,
        game_repository: ArcGameRepository,
    ) -> Self {
        Self {
            client_service,
            player_service,
            match_service,
            queue_repository,
            game_repository,
        }
    }

    fn fetch_game(&self, game_name: &str) -> ServiceResult<GameInfo> {
        match self.game_repository.get_game_by_name(game_name)? {
            Some(game) => Ok(game),
            None => ServiceError::not_found("Unknown game"),
        }
    }
}

impl QueueService for QueueServiceImpl {
    fn join_queue(
        &self,
        player_id: PlayerId,
        game_name: &str,
        ranked: bool,
    ) -> ServiceResult<QueueJoin> {
        let game = self.fetch_game(game_name)?;
        if ranked && self.player_service.is_guest(player_id)? {
            return ServiceError::forbidden("Guests cannot join ranked queues");
        }
        if self.queue_repository.get_entry(player_id, game.id)?.is_some() {
            return ServiceError::bad_request("Already queued for this game");
        }
        // At most one active match per (player, game); pairing somebody who is
        // still playing would clobber the match registry.
        if self
            .match_service
            .active_match_of(player_id, &game.name)
            .is_some()
        {
            return ServiceError::not_possible("Still playing a match of this game");
        }
        let queue_id = self.queue_repository.add_entry(player_id, game.id, ranked)?;
        let position = self.queue_repository.bucket_count(game.id, ranked)?;
        info!(
            "Player {} joined the {} {} queue at position {}",
            player_id,
            if ranked { "ranked" } else { "casual" },
            game.name,
            position
        );
        Ok(QueueJoin {
            queue_id,
            game,
            ranked,
            position,
        })
    }

    fn leave_queue(&self, player_id: PlayerId, game_name: &str) -> ServiceResult<GameInfo> {
        let game = self.fetch_game(game_name)?;
        if !self.queue_repository.remove_entry(player_id, game.id)? {
            return ServiceError::not_found("Not queued for this game");
        }
        info!("Player {} left the {} queue", player_id, game.name);
        Ok(game)
    }

    fn remove_player(&self, player_id: PlayerId) {
        match self.queue_repository.remove_entries_for_session(player_id) {
            Ok(0) => {}
            Ok(removed) => info!(
                "Removed {} queue entries for disconnected player {}",
                removed, player_id
            ),
            Err(e) => error!(
                "Failed to purge queue entries for player {}: {}",
                player_id, e
            ),
        }
    }

    fn take_oldest_pair(
        &self,
        game_id: GameId,
        ranked: bool,
    ) -> ServiceResult<Option<(QueueEntry, QueueEntry)>> {
        loop {
            let entries = self.queue_repository.oldest_entries(game_id, ranked, 2)?;
            let mut discarded = false;
            for entry in &entries {
                if !self.client_service.is_player_online(entry.session_id) {
                    self.queue_repository.remove_entry_by_id(entry.id)?;
                    debug!(
                        "Discarded queue entry {} of offline player {}",
                        entry.id, entry.session_id
                    );
                    discarded = true;
                }
            }
            if discarded {
                continue;
            }
            let mut entries = entries.into_iter();
            let (Some(first), Some(second)) = (entries.next(), entries.next()) else {
                return Ok(None);
            };
            self.queue_repository.remove_entry_by_id(first.id)?;
            self.queue_repository.remove_entry_by_id(second.id)?;
            debug!(
                "Paired players {} and {} for game {} ({}), oldest waiting since {}",
                first.session_id,
                second.session_id,
                first.game_id,
                if first.ranked { "ranked" } else { "casual" },
                first.joined_at
            );
            return Ok(Some((first, second)));
        }
    }
}

/// Scans every queue and pairs waiting players until the token is cancelled.
pub async fn run_pairing_loop(app: AppState, cancellation: CancellationToken) {
    let interval_ms = std::env::var("PARLOR_PAIRING_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_PAIRING_INTERVAL_MS);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    info!("Pairing loop ticking every {} ms", interval_ms);
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = pairing_pass(&app) {
            error!("Pairing pass failed: {}", e);
        }
    }
    info!("Pairing loop stopped");
}

/// One pairing sweep over every (game, bucket) queue.
pub fn pairing_pass(app: &AppState) -> ServiceResult<()> {
    for game in app.game_repository.get_games()? {
        for ranked in [false, true] {
            while let Some((first, second)) = app.queue_service.take_oldest_pair(game.id, ranked)?
            {
                // First enqueued becomes player one and moves first.
                if let Err(e) = app.match_service.create_match(
                    &game,
                    first.session_id,
                    second.session_id,
                    ranked,
                ) {
                    error!(
                        "Failed to create match for players {} and {}: {}",
                        first.session_id, second.session_id, e
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        app::construct_app,
        client::MockClientService,
        persistence::{open_memory_pool, seed_default_games},
    };

    fn setup() -> AppState {
        let pool = open_memory_pool();
        seed_default_games(&pool).unwrap();
        let client_service: ArcClientService = Arc::new(Box::new(MockClientService::new()));
        construct_app(pool, client_service)
    }

    fn guest(app: &AppState) -> PlayerId {
        app.player_service
            .try_login_guest(&Uuid::new_v4(), None)
            .unwrap()
            .id
    }

    #[test]
    fn test_join_unknown_game_is_not_found() {
        let app = setup();
        let player = guest(&app);
        assert!(matches!(
            app.queue_service.join_queue(player, "chess", false).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_queue_position_counts_the_bucket() {
        let app = setup();
        let first = guest(&app);
        let second = guest(&app);
        assert_eq!(
            app.queue_service
                .join_queue(first, "tictactoe", false)
                .unwrap()
                .position,
            1
        );
        assert_eq!(
            app.queue_service
                .join_queue(second, "tictactoe", false)
                .unwrap()
                .position,
            2
        );
    }

    #[test]
    fn test_double_join_is_rejected_in_either_bucket() {
        let app = setup();
        app.player_service
            .try_register("alice", "pw", None, None)
            .unwrap();
        let (_, session) = app
            .player_service
            .try_login(&Uuid::new_v4(), "alice", "pw")
            .unwrap();

        app.queue_service
            .join_queue(session.id, "connect4", false)
            .unwrap();
        let same_bucket = app
            .queue_service
            .join_queue(session.id, "connect4", false)
            .unwrap_err();
        let other_bucket = app
            .queue_service
            .join_queue(session.id, "connect4", true)
            .unwrap_err();
        assert!(matches!(same_bucket, ServiceError::BadRequest(_)));
        assert!(matches!(other_bucket, ServiceError::BadRequest(_)));
    }

    #[test]
    fn test_guest_cannot_join_ranked() {
        let app = setup();
        let player = guest(&app);
        assert!(matches!(
            app.queue_service
                .join_queue(player, "tictactoe", true)
                .unwrap_err(),
            ServiceError::Forbidden(_)
        ));
        // Rejected before any entry was created.
        assert_eq!(app.queue_repository.bucket_count(1, true).unwrap(), 0);
    }

    #[test]
    fn test_cannot_queue_while_playing() {
        let app = setup();
        let alice = guest(&app);
        let bob = guest(&app);
        let game = app
            .game_repository
            .get_game_by_name("tictactoe")
            .unwrap()
            .unwrap();
        app.match_service
            .create_match(&game, alice, bob, false)
            .unwrap();

        assert!(matches!(
            app.queue_service
                .join_queue(alice, "tictactoe", false)
                .unwrap_err(),
            ServiceError::NotPossible(_)
        ));
        // The other game is fair game.
        app.queue_service.join_queue(alice, "connect4", false).unwrap();

        // Once the match ends the queue opens up again.
        for (player, cell) in [(alice, 0), (bob, 3), (alice, 1), (bob, 4), (alice, 2)] {
            app.match_service.try_make_move(player, "tictactoe", cell).unwrap();
        }
        app.queue_service.join_queue(alice, "tictactoe", false).unwrap();
    }

    #[test]
    fn test_leave_queue() {
        let app = setup();
        let player = guest(&app);
        app.queue_service.join_queue(player, "tictactoe", false).unwrap();
        app.queue_service.leave_queue(player, "tictactoe").unwrap();
        assert!(matches!(
            app.queue_service.leave_queue(player, "tictactoe").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_take_oldest_pair_is_fifo() {
        let app = setup();
        let first = guest(&app);
        let second = guest(&app);
        let third = guest(&app);
        let game = app
            .queue_service
            .join_queue(first, "tictactoe", false)
            .unwrap()
            .game;
        app.queue_service.join_queue(second, "tictactoe", false).unwrap();
        app.queue_service.join_queue(third, "tictactoe", false).unwrap();

        let (a, b) = app
            .queue_service
            .take_oldest_pair(game.id, false)
            .unwrap()
            .unwrap();
        assert_eq!(a.session_id, first);
        assert_eq!(b.session_id, second);

        // Only the third player remains, so no further pair forms.
        assert!(
            app.queue_service
                .take_oldest_pair(game.id, false)
                .unwrap()
                .is_none()
        );
        assert_eq!(app.queue_repository.bucket_count(game.id, false).unwrap(), 1);
    }

    #[test]
    fn test_take_oldest_pair_discards_offline_entries() {
        let app = setup();
        // A session that was never associated with a connection counts as
        // offline and must not block the queue.
        let offline = app
            .player_repository
            .create_session(None, "Loner", None, true)
            .unwrap();
        let second = guest(&app);
        let third = guest(&app);

        let game = app
            .queue_service
            .join_queue(offline, "tictactoe", false)
            .unwrap()
            .game;
        app.queue_service.join_queue(second, "tictactoe", false).unwrap();
        app.queue_service.join_queue(third, "tictactoe", false).unwrap();

        let (a, b) = app
            .queue_service
            .take_oldest_pair(game.id, false)
            .unwrap()
            .unwrap();
        assert_eq!(a.session_id, second);
        assert_eq!(b.session_id, third);
        assert_eq!(app.queue_repository.bucket_count(game.id, false).unwrap(), 0);
    }

    #[test]
    fn test_remove_player_purges_all_entries() {
        let app = setup();
        let player = guest(&app);
        app.queue_service.join_queue(player, "tictactoe", false).unwrap();
        app.queue_service.join_queue(player, "connect4", false).unwrap();
        app.queue_service.remove_player(player);
        assert_eq!(app.queue_repository.bucket_count(1, false).unwrap(), 0);
        assert_eq!(app.queue_repository.bucket_count(2, false).unwrap(), 0);
    }
}
