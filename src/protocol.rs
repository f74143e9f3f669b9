use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    app::{AppState, ServiceError, ServiceResult},
    chat::ChatEntry,
    client::ClientId,
    game::MatchId,
    persistence::{games::GameInfo, queues::QueueId},
    player::{Account, AccountId, PlayerId},
    rating::{LeaderboardEntry, RatingRecord},
    rules::{Board, GameRules},
};

mod auth;
mod chat;
mod game;
mod queue;
mod stats;

/// One line of client input. Requests that act on a player name the session
/// id explicitly; the dispatcher checks it against the connection.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        username: String,
        password: String,
        display_name: Option<String>,
        email: Option<String>,
    },
    Login {
        username: String,
        password: String,
    },
    GuestLogin {
        pseudo: Option<String>,
    },
    JoinQueue {
        player_id: PlayerId,
        game_name: String,
        #[serde(default)]
        ranked: bool,
    },
    LeaveQueue {
        player_id: PlayerId,
        game_name: String,
    },
    GetGames,
    MakeMove {
        player_id: PlayerId,
        game_name: String,
        #[serde(rename = "move")]
        mv: i64,
    },
    GetStats {
        player_id: PlayerId,
        game_name: String,
    },
    GetGameHistory {
        player_id: PlayerId,
        limit: Option<u32>,
    },
    GetLeaderboard {
        game_name: String,
        limit: Option<u32>,
    },
    ChatSend {
        player_id: PlayerId,
        content: String,
        target_id: Option<PlayerId>,
    },
    GetChatHistory {
        limit: Option<usize>,
    },
    Ping,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterSuccess,
    LoginSuccess {
        player_id: PlayerId,
        account: AccountInfo,
    },
    GuestSuccess {
        player_id: PlayerId,
        pseudo: String,
    },
    QueueJoined {
        queue_id: QueueId,
        game_name: String,
        ranked: bool,
        queue_position: u32,
    },
    QueueLeft {
        game_name: String,
    },
    GamesList {
        games: Vec<GameDescription>,
    },
    MoveReceived {
        match_id: MatchId,
    },
    StatsResult {
        game_name: String,
        stats: PlayerStats,
    },
    GameHistory {
        matches: Vec<MatchSummary>,
    },
    Leaderboard {
        game_name: String,
        entries: Vec<LeaderboardRow>,
    },
    ChatHistory {
        messages: Vec<ChatEntry>,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        message: String,
    },

    MatchFound {
        match_id: MatchId,
        game_name: String,
        game_display_name: String,
        ranked: bool,
        opponent: OpponentInfo,
        your_turn: bool,
        board: Board,
    },
    GameUpdate {
        match_id: MatchId,
        board: Board,
        current_turn_id: PlayerId,
    },
    GameOver {
        match_id: MatchId,
        winner_id: Option<PlayerId>,
        is_draw: bool,
        board: Board,
    },
    ChatMessage {
        sender_id: PlayerId,
        sender_name: String,
        content: String,
        timestamp: i64,
        private: bool,
    },
}

/// Account summary sent on login. Never carries the password hash.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccountInfo {
    pub id: AccountId,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: i64,
}

impl AccountInfo {
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            created_at: account.created_at.timestamp_millis(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameDescription {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub rules: GameRules,
}

impl GameDescription {
    pub fn from_game_info(info: &GameInfo) -> Self {
        Self {
            name: info.name.clone(),
            display_name: info.display_name.clone(),
            description: info.description.clone(),
            rules: info.rules.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpponentInfo {
    pub player_id: PlayerId,
    pub pseudo: String,
    /// Absent for casual matches and guest opponents.
    pub rating: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerStats {
    pub rating: f64,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub win_streak: u32,
    pub best_win_streak: u32,
    pub rank: u32,
}

impl PlayerStats {
    pub fn from_record(record: &RatingRecord, rank: u32) -> Self {
        Self {
            rating: record.rating,
            games_played: record.games_played,
            wins: record.wins,
            losses: record.losses,
            draws: record.draws,
            win_streak: record.win_streak,
            best_win_streak: record.best_win_streak,
            rank,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: u32,
    pub display_name: String,
    pub rating: f64,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl LeaderboardRow {
    pub fn from_entry(entry: &LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            display_name: entry.display_name.clone(),
            rating: entry.record.rating,
            games_played: entry.record.games_played,
            wins: entry.record.wins,
            losses: entry.record.losses,
            draws: entry.record.draws,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub game_name: String,
    pub opponent_name: String,
    pub ranked: bool,
    pub winner_id: Option<PlayerId>,
    pub is_draw: bool,
    pub created_at: i64,
    pub ended_at: Option<i64>,
}

pub type ProtocolResult = ServiceResult<Option<ServerMessage>>;

pub struct ProtocolHandler {
    app: AppState,
}

impl ProtocolHandler {
    pub fn new(app: AppState) -> Self {
        Self { app }
    }

    /// Answers one line from the wire. Failures never close the connection;
    /// the client gets an `error` reply instead.
    pub fn handle_message(&self, id: &ClientId, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }
        let msg = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Client {} sent an unparseable message: {}", id, e);
                self.send_to(
                    id,
                    &ServerMessage::Error {
                        message: "Invalid message format".to_string(),
                    },
                );
                return;
            }
        };
        match self.dispatch(id, msg) {
            Ok(Some(reply)) => self.send_to(id, &reply),
            Ok(None) => {}
            Err(e) => {
                debug!("Error answering client {}: {}", id, e);
                self.send_to(
                    id,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    fn dispatch(&self, id: &ClientId, msg: ClientMessage) -> ProtocolResult {
        match msg {
            ClientMessage::Register {
                username,
                password,
                display_name,
                email,
            } => self.handle_register(
                &username,
                &password,
                display_name.as_deref(),
                email.as_deref(),
            ),
            ClientMessage::Login { username, password } => {
                self.handle_login(id, &username, &password)
            }
            ClientMessage::GuestLogin { pseudo } => self.handle_guest_login(id, pseudo.as_deref()),
            ClientMessage::JoinQueue {
                player_id,
                game_name,
                ranked,
            } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_join_queue(player_id, &game_name, ranked)
            }
            ClientMessage::LeaveQueue {
                player_id,
                game_name,
            } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_leave_queue(player_id, &game_name)
            }
            ClientMessage::GetGames => self.handle_get_games(),
            ClientMessage::MakeMove {
                player_id,
                game_name,
                mv,
            } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_make_move(player_id, &game_name, mv)
            }
            ClientMessage::GetStats {
                player_id,
                game_name,
            } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_get_stats(player_id, &game_name)
            }
            ClientMessage::GetGameHistory { player_id, limit } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_get_game_history(player_id, limit)
            }
            ClientMessage::GetLeaderboard { game_name, limit } => {
                self.handle_get_leaderboard(&game_name, limit)
            }
            ClientMessage::ChatSend {
                player_id,
                content,
                target_id,
            } => {
                let player_id = self.authorized_player(id, player_id)?;
                self.handle_chat_send(player_id, &content, target_id)
            }
            ClientMessage::GetChatHistory { limit } => self.handle_get_chat_history(limit),
            ClientMessage::Ping => Ok(Some(ServerMessage::Pong {
                timestamp: Utc::now().timestamp_millis(),
            })),
        }
    }

    fn authorized_player(&self, id: &ClientId, claimed: PlayerId) -> ServiceResult<PlayerId> {
        let Some(player_id) = self.app.client_service.get_associated_player(id) else {
            return ServiceError::unauthorized("Client is not logged in");
        };
        if player_id != claimed {
            return ServiceError::unauthorized("Player id does not match this connection");
        }
        Ok(player_id)
    }

    fn send_to(&self, id: &ClientId, msg: &ServerMessage) {
        self.app.client_service.try_client_send(id, msg);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        app::{ArcClientService, construct_app},
        client::{ClientServiceImpl, MockClientService},
        persistence::{open_memory_pool, seed_default_games},
        rules::GridGame,
    };

    fn mock_handler() -> (MockClientService, ProtocolHandler) {
        let pool = open_memory_pool();
        seed_default_games(&pool).unwrap();
        let mock = MockClientService::new();
        let client_service: ArcClientService = Arc::new(Box::new(mock.clone()));
        let app = construct_app(pool, client_service);
        (mock, ProtocolHandler::new(app))
    }

    /// Handler wired to a real client service, so replies to clients that
    /// are not logged in can be observed on the channel.
    fn channel_handler() -> (
        ClientId,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        ProtocolHandler,
    ) {
        let pool = open_memory_pool();
        seed_default_games(&pool).unwrap();
        let service = ClientServiceImpl::new();
        let client_service: ArcClientService = Arc::new(Box::new(service.clone()));
        let app = construct_app(pool, client_service);
        let client = Uuid::new_v4();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        service.add_client(client, None, tx);
        (client, rx, ProtocolHandler::new(app))
    }

    #[test]
    fn test_requests_parse_from_wire() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"guest_login"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GuestLogin { pseudo: None });

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"make_move","player_id":3,"game_name":"connect4","move":6}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::MakeMove {
                player_id: 3,
                game_name: "connect4".to_string(),
                mv: 6,
            }
        );

        // ranked defaults to false when omitted.
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"join_queue","player_id":1,"game_name":"tictactoe"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinQueue {
                player_id: 1,
                game_name: "tictactoe".to_string(),
                ranked: false,
            }
        );

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"no_such_thing"}"#).is_err());
    }

    #[test]
    fn test_replies_carry_type_tags() {
        let json = serde_json::to_value(&ServerMessage::QueueJoined {
            queue_id: 4,
            game_name: "tictactoe".to_string(),
            ranked: true,
            queue_position: 1,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "queue_joined",
                "queue_id": 4,
                "game_name": "tictactoe",
                "ranked": true,
                "queue_position": 1,
            })
        );

        let json = serde_json::to_value(&ServerMessage::RegisterSuccess).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "register_success" }));
    }

    #[test]
    fn test_board_serializes_as_nested_rows() {
        let mut game = GridGame::new(crate::rules::GameRules::tictactoe());
        game.play(4).unwrap();
        let json = serde_json::to_value(&ServerMessage::GameUpdate {
            match_id: 1,
            board: game.board,
            current_turn_id: 2,
        })
        .unwrap();
        assert_eq!(
            json["board"],
            serde_json::json!([[0, 0, 0], [0, 1, 0], [0, 0, 0]])
        );
    }

    #[test]
    fn test_guest_flow_through_handler() {
        let (mock, handler) = mock_handler();
        let client = Uuid::new_v4();

        handler.handle_message(&client, r#"{"type":"guest_login"}"#);
        let msgs = mock.messages_for(1);
        assert_eq!(
            msgs,
            vec![ServerMessage::GuestSuccess {
                player_id: 1,
                pseudo: "Guest1".to_string(),
            }]
        );

        handler.handle_message(
            &client,
            r#"{"type":"join_queue","player_id":1,"game_name":"tictactoe"}"#,
        );
        let msgs = mock.messages_for(1);
        assert!(matches!(
            msgs.last().unwrap(),
            ServerMessage::QueueJoined { queue_position: 1, ranked: false, .. }
        ));
    }

    #[test]
    fn test_claimed_player_id_must_match_connection() {
        let (mock, handler) = mock_handler();
        let client = Uuid::new_v4();
        handler.handle_message(&client, r#"{"type":"guest_login"}"#);

        handler.handle_message(
            &client,
            r#"{"type":"make_move","player_id":99,"game_name":"tictactoe","move":0}"#,
        );
        let msgs = mock.messages_for(1);
        assert!(matches!(
            msgs.last().unwrap(),
            ServerMessage::Error { message } if message.contains("does not match")
        ));
    }

    #[test]
    fn test_garbage_input_gets_error_reply_and_connection_survives() {
        let (client, mut rx, handler) = channel_handler();

        handler.handle_message(&client, "this is not json");
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"error\""));
        assert!(text.contains("Invalid message format"));

        // The same connection still answers afterwards.
        handler.handle_message(&client, r#"{"type":"ping"}"#);
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"pong\""));
    }

    #[test]
    fn test_requests_requiring_login_are_rejected() {
        let (client, mut rx, handler) = channel_handler();

        handler.handle_message(
            &client,
            r#"{"type":"join_queue","player_id":1,"game_name":"tictactoe"}"#,
        );
        let text = rx.try_recv().unwrap();
        assert!(text.contains("not logged in"));
    }
}
