use crate::{
    client::ClientId,
    protocol::{AccountInfo, ProtocolHandler, ProtocolResult, ServerMessage},
};

impl ProtocolHandler {
    pub fn handle_register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> ProtocolResult {
        self.app
            .player_service
            .try_register(username, password, display_name, email)?;
        Ok(Some(ServerMessage::RegisterSuccess))
    }

    pub fn handle_login(&self, id: &ClientId, username: &str, password: &str) -> ProtocolResult {
        let (account, session) = self.app.player_service.try_login(id, username, password)?;
        Ok(Some(ServerMessage::LoginSuccess {
            player_id: session.id,
            account: AccountInfo::from_account(&account),
        }))
    }

    pub fn handle_guest_login(&self, id: &ClientId, pseudo: Option<&str>) -> ProtocolResult {
        let session = self.app.player_service.try_login_guest(id, pseudo)?;
        Ok(Some(ServerMessage::GuestSuccess {
            player_id: session.id,
            pseudo: session.pseudo,
        }))
    }
}
