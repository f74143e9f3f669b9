use crate::{
    player::PlayerId,
    protocol::{ProtocolHandler, ProtocolResult, ServerMessage},
};

impl ProtocolHandler {
    /// The sender sees their own message come back as a `chat_message` push,
    /// so there is no direct reply.
    pub fn handle_chat_send(
        &self,
        player_id: PlayerId,
        content: &str,
        target_id: Option<PlayerId>,
    ) -> ProtocolResult {
        match target_id {
            Some(target) => self
                .app
                .chat_service
                .send_private(player_id, target, content)?,
            None => self.app.chat_service.send_global(player_id, content)?,
        }
        Ok(None)
    }

    pub fn handle_get_chat_history(&self, limit: Option<usize>) -> ProtocolResult {
        let messages = self.app.chat_service.get_history(limit);
        Ok(Some(ServerMessage::ChatHistory { messages }))
    }
}
