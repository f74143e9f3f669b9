use crate::{
    player::PlayerId,
    protocol::{ProtocolHandler, ProtocolResult, ServerMessage},
};

impl ProtocolHandler {
    pub fn handle_join_queue(
        &self,
        player_id: PlayerId,
        game_name: &str,
        ranked: bool,
    ) -> ProtocolResult {
        let join = self
            .app
            .queue_service
            .join_queue(player_id, game_name, ranked)?;
        Ok(Some(ServerMessage::QueueJoined {
            queue_id: join.queue_id,
            game_name: join.game.name,
            ranked: join.ranked,
            queue_position: join.position,
        }))
    }

    pub fn handle_leave_queue(&self, player_id: PlayerId, game_name: &str) -> ProtocolResult {
        let game = self.app.queue_service.leave_queue(player_id, game_name)?;
        Ok(Some(ServerMessage::QueueLeft {
            game_name: game.name,
        }))
    }
}
