use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};

use crate::{
    app::{ArcClientService, ArcPlayerService, ServiceError, ServiceResult},
    player::PlayerId,
    protocol::ServerMessage,
};

/// Global messages kept for late joiners. Oldest entries are evicted first.
pub const CHAT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender_id: PlayerId,
    pub sender_name: String,
    pub content: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

pub trait ChatService {
    fn send_global(&self, sender_id: PlayerId, content: &str) -> ServiceResult<()>;
    fn send_private(
        &self,
        sender_id: PlayerId,
        target_id: PlayerId,
        content: &str,
    ) -> ServiceResult<()>;
    /// The most recent global entries, oldest first.
    fn get_history(&self, limit: Option<usize>) -> Vec<ChatEntry>;
}

pub struct ChatServiceImpl {
    client_service: ArcClientService,
    player_service: ArcPlayerService,
    history: Arc<Mutex<VecDeque<ChatEntry>>>,
}

impl ChatServiceImpl {
    pub fn new(client_service: ArcClientService, player_service: ArcPlayerService) -> Self {
        Self {
            client_service,
            player_service,
            history: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn build_entry(&self, sender_id: PlayerId, content: &str) -> ServiceResult<ChatEntry> {
        let sender_name = self.player_service.pseudo_of(sender_id)?;
        Ok(ChatEntry {
            sender_id,
            sender_name,
            content: content.censor(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }
}

impl ChatService for ChatServiceImpl {
    fn send_global(&self, sender_id: PlayerId, content: &str) -> ServiceResult<()> {
        let entry = self.build_entry(sender_id, content)?;
        {
            let mut history = self.history.lock().unwrap();
            history.push_back(entry.clone());
            while history.len() > CHAT_HISTORY_CAPACITY {
                history.pop_front();
            }
        }
        let msg = ServerMessage::ChatMessage {
            sender_id: entry.sender_id,
            sender_name: entry.sender_name,
            content: entry.content,
            timestamp: entry.timestamp,
            private: false,
        };
        self.client_service.try_broadcast_authenticated(&msg);
        Ok(())
    }

    fn send_private(
        &self,
        sender_id: PlayerId,
        target_id: PlayerId,
        content: &str,
    ) -> ServiceResult<()> {
        let entry = self.build_entry(sender_id, content)?;
        if !self.client_service.is_player_online(target_id) {
            return ServiceError::not_found("Player is not online");
        }
        let msg = ServerMessage::ChatMessage {
            sender_id: entry.sender_id,
            sender_name: entry.sender_name,
            content: entry.content,
            timestamp: entry.timestamp,
            private: true,
        };
        self.client_service.try_player_send(target_id, &msg);
        self.client_service.try_player_send(sender_id, &msg);
        Ok(())
    }

    fn get_history(&self, limit: Option<usize>) -> Vec<ChatEntry> {
        let history = self.history.lock().unwrap();
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        app::ArcPlayerRepository,
        client::MockClientService,
        persistence::{open_memory_pool, players::PlayerRepositoryImpl},
        player::PlayerServiceImpl,
    };

    struct Setup {
        mock: MockClientService,
        player_service: ArcPlayerService,
        service: ChatServiceImpl,
    }

    fn setup() -> Setup {
        let pool = open_memory_pool();
        let mock = MockClientService::new();
        let client_service: ArcClientService = Arc::new(Box::new(mock.clone()));
        let player_repository: ArcPlayerRepository =
            Arc::new(Box::new(PlayerRepositoryImpl::new(pool)));
        let player_service: ArcPlayerService = Arc::new(Box::new(PlayerServiceImpl::new(
            client_service.clone(),
            player_repository,
        )));
        let service = ChatServiceImpl::new(client_service, player_service.clone());
        Setup {
            mock,
            player_service,
            service,
        }
    }

    fn guest(setup: &Setup) -> PlayerId {
        setup
            .player_service
            .try_login_guest(&Uuid::new_v4(), None)
            .unwrap()
            .id
    }

    #[test]
    fn test_global_message_reaches_everyone_and_history() {
        let setup = setup();
        let alice = guest(&setup);
        let bob = guest(&setup);

        setup.service.send_global(alice, "hello there").unwrap();

        for player in [alice, bob] {
            let msgs = setup.mock.messages_for(player);
            assert!(matches!(
                &msgs[0],
                ServerMessage::ChatMessage {
                    sender_id,
                    content,
                    private: false,
                    ..
                } if *sender_id == alice && content == "hello there"
            ));
        }
        let history = setup.service.get_history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello there");
        assert_eq!(history[0].sender_name, "Guest1");
    }

    #[test]
    fn test_global_message_is_censored() {
        let setup = setup();
        let alice = guest(&setup);

        setup.service.send_global(alice, "well fuck").unwrap();

        let history = setup.service.get_history(None);
        assert!(!history[0].content.contains("fuck"));
    }

    #[test]
    fn test_private_message_echoes_and_skips_history() {
        let setup = setup();
        let alice = guest(&setup);
        let bob = guest(&setup);
        let carol = guest(&setup);

        setup.service.send_private(alice, bob, "psst").unwrap();

        for player in [alice, bob] {
            let msgs = setup.mock.messages_for(player);
            assert!(matches!(
                &msgs[0],
                ServerMessage::ChatMessage { private: true, content, .. } if content == "psst"
            ));
        }
        assert!(setup.mock.messages_for(carol).is_empty());
        assert!(setup.service.get_history(None).is_empty());
    }

    #[test]
    fn test_private_message_to_offline_target() {
        let setup = setup();
        let alice = guest(&setup);

        let err = setup.service.send_private(alice, 999, "psst").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_history_is_bounded_and_ordered() {
        let setup = setup();
        let alice = guest(&setup);

        for i in 0..(CHAT_HISTORY_CAPACITY + 5) {
            setup
                .service
                .send_global(alice, &format!("message {}", i))
                .unwrap();
        }

        // The five oldest entries fell out of the buffer.
        let all = setup.service.get_history(Some(CHAT_HISTORY_CAPACITY));
        assert_eq!(all.len(), CHAT_HISTORY_CAPACITY);
        assert_eq!(all[0].content, "message 5");
        assert_eq!(all.last().unwrap().content, "message 104");

        let recent = setup.service.get_history(None);
        assert_eq!(recent.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(recent[0].content, "message 55");

        let tail = setup.service.get_history(Some(3));
        assert_eq!(
            tail.iter().map(|e| e.content.as_str()).collect::<Vec<_>>(),
            ["message 102", "message 103", "message 104"]
        );
    }
}
