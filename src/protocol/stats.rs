use crate::{
    app::ServiceError,
    player::PlayerId,
    protocol::{LeaderboardRow, PlayerStats, ProtocolHandler, ProtocolResult, ServerMessage},
};

const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;

impl ProtocolHandler {
    pub fn handle_get_stats(&self, player_id: PlayerId, game_name: &str) -> ProtocolResult {
        let Some(game) = self.app.game_repository.get_game_by_name(game_name)? else {
            return ServiceError::not_found("Unknown game");
        };
        let Some(account_id) = self.app.player_service.account_id_of(player_id)? else {
            return ServiceError::forbidden("Guests do not have ranked stats");
        };
        let (record, rank) = self.app.rating_service.get_stats(account_id, game.id)?;
        Ok(Some(ServerMessage::StatsResult {
            game_name: game.name,
            stats: PlayerStats::from_record(&record, rank),
        }))
    }

    pub fn handle_get_leaderboard(&self, game_name: &str, limit: Option<u32>) -> ProtocolResult {
        let Some(game) = self.app.game_repository.get_game_by_name(game_name)? else {
            return ServiceError::not_found("Unknown game");
        };
        let entries = self
            .app
            .rating_service
            .get_leaderboard(game.id, limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT))?;
        Ok(Some(ServerMessage::Leaderboard {
            game_name: game.name,
            entries: entries.iter().map(LeaderboardRow::from_entry).collect(),
        }))
    }
}
