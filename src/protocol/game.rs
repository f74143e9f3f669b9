use crate::{
    app::ServiceError,
    player::PlayerId,
    protocol::{GameDescription, MatchSummary, ProtocolHandler, ProtocolResult, ServerMessage},
};

const DEFAULT_HISTORY_LIMIT: u32 = 20;

impl ProtocolHandler {
    pub fn handle_get_games(&self) -> ProtocolResult {
        let games = self.app.game_repository.get_games()?;
        Ok(Some(ServerMessage::GamesList {
            games: games.iter().map(GameDescription::from_game_info).collect(),
        }))
    }

    pub fn handle_make_move(&self, player_id: PlayerId, game_name: &str, mv: i64) -> ProtocolResult {
        let match_id = self
            .app
            .match_service
            .try_make_move(player_id, game_name, mv)?;
        Ok(Some(ServerMessage::MoveReceived { match_id }))
    }

    pub fn handle_get_game_history(
        &self,
        player_id: PlayerId,
        limit: Option<u32>,
    ) -> ProtocolResult {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let records = self
            .app
            .match_repository
            .get_completed_matches_for_player(player_id, limit)?;
        let mut matches = Vec::with_capacity(records.len());
        for record in records {
            let Some(game) = self.app.game_repository.get_game_by_id(record.game_id)? else {
                return ServiceError::internal(format!(
                    "Match {} references unknown game {}",
                    record.id, record.game_id
                ));
            };
            let opponent = if record.player1_id == player_id {
                record.player2_id
            } else {
                record.player1_id
            };
            matches.push(MatchSummary {
                match_id: record.id,
                game_name: game.name,
                opponent_name: self.app.player_service.pseudo_of(opponent)?,
                ranked: record.ranked,
                winner_id: record.winner_id,
                is_draw: record.winner_id.is_none(),
                created_at: record.created_at.timestamp_millis(),
                ended_at: record.ended_at.map(|t| t.timestamp_millis()),
            });
        }
        Ok(Some(ServerMessage::GameHistory { matches }))
    }
}
