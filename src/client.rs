use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::any,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::{
    net::TcpStream,
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
};
use tokio_util::{
    codec::{Framed, LinesCodec},
    sync::CancellationToken,
};
use uuid::Uuid;

use crate::{
    app::{AppState, ServiceError, ServiceResult},
    player::PlayerId,
    protocol::{ProtocolHandler, ServerMessage},
    util::OneOneDashMap,
};

pub type ClientId = Uuid;

fn new_client() -> ClientId {
    Uuid::new_v4()
}

enum ClientEvent {
    Text(String),
    Close,
}

/// Player-facing view of the connection layer. Sends are fire-and-forget;
/// a closed or missing connection is logged, never an error.
pub trait ClientService {
    fn associate_player(&self, id: &ClientId, player_id: PlayerId) -> ServiceResult<()>;
    fn get_associated_player(&self, id: &ClientId) -> Option<PlayerId>;
    fn is_player_online(&self, player_id: PlayerId) -> bool;
    fn get_client_addr(&self, id: &ClientId) -> Option<SocketAddr>;
    fn try_client_send(&self, id: &ClientId, msg: &ServerMessage);
    fn try_player_send(&self, player_id: PlayerId, msg: &ServerMessage);
    fn try_broadcast_authenticated(&self, msg: &ServerMessage);
}

#[derive(Clone)]
pub struct ClientServiceImpl {
    client_senders: Arc<DashMap<ClientId, UnboundedSender<String>>>,
    client_addrs: Arc<DashMap<ClientId, SocketAddr>>,
    player_associations: Arc<OneOneDashMap<ClientId, PlayerId>>,
}

impl ClientServiceImpl {
    pub fn new() -> Self {
        Self {
            client_senders: Arc::new(DashMap::new()),
            client_addrs: Arc::new(DashMap::new()),
            player_associations: Arc::new(OneOneDashMap::new()),
        }
    }

    pub(crate) fn add_client(
        &self,
        id: ClientId,
        addr: Option<SocketAddr>,
        sender: UnboundedSender<String>,
    ) {
        self.client_senders.insert(id, sender);
        if let Some(addr) = addr {
            self.client_addrs.insert(id, addr);
        }
    }

    fn remove_client(&self, id: &ClientId) -> Option<PlayerId> {
        self.client_senders.remove(id);
        self.client_addrs.remove(id);
        self.player_associations.remove_by_key(id)
    }

    /// Drives one connection to completion: registers the send channel,
    /// runs the receive loop and send pump, then tears down whatever the
    /// connection left behind.
    async fn handle_client<S, M, E>(
        &self,
        app: AppState,
        socket: S,
        addr: Option<SocketAddr>,
        shutdown: CancellationToken,
        msg_factory: impl Fn(String) -> M + Send + 'static,
        msg_parser: impl Fn(M) -> Option<ClientEvent> + Send + 'static,
    ) where
        S: futures_util::Sink<M>
            + futures_util::Stream<Item = Result<M, E>>
            + Unpin
            + Send
            + 'static,
        M: Send + 'static,
        E: Send + 'static,
    {
        let (sink, stream) = socket.split();
        let client_id = new_client();
        let cancellation_token = shutdown.child_token();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        self.add_client(client_id, addr, tx);
        debug!("Client {} connected", client_id);

        let handler = ProtocolHandler::new(app.clone());
        let token = cancellation_token.clone();
        let receive_task = tokio::spawn(async move {
            handle_receive(client_id, stream, token, handler, msg_parser).await;
        });

        let token = cancellation_token.clone();
        let send_task = tokio::spawn(async move {
            handle_send(sink, rx, token, msg_factory).await;
        });

        let _ = tokio::join!(receive_task, send_task);

        if let Some(player_id) = self.remove_client(&client_id) {
            app.queue_service.remove_player(player_id);
            app.player_service.on_disconnect(player_id);
            info!("Player {} disconnected (client {})", player_id, client_id);
        } else {
            debug!("Client {} disconnected", client_id);
        }
    }

    pub async fn handle_client_tcp(
        &self,
        app: AppState,
        tcp: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let framed = Framed::new(tcp, LinesCodec::new());
        self.handle_client(
            app,
            framed,
            Some(addr),
            shutdown,
            |s| s,
            |s| Some(ClientEvent::Text(s)),
        )
        .await;
    }

    pub async fn handle_client_websocket(
        &self,
        app: AppState,
        ws: WebSocket,
        addr: Option<SocketAddr>,
        shutdown: CancellationToken,
    ) {
        self.handle_client(
            app,
            ws,
            addr,
            shutdown,
            |s| Message::Text(s.into()),
            |m| match m {
                Message::Text(t) => Some(ClientEvent::Text(t.to_string())),
                Message::Close(_) => Some(ClientEvent::Close),
                _ => None,
            },
        )
        .await;
    }
}

async fn handle_receive<M, E>(
    id: ClientId,
    mut stream: impl StreamExt<Item = Result<M, E>> + Unpin + Send + 'static,
    cancellation_token: CancellationToken,
    handler: ProtocolHandler,
    msg_parser: impl Fn(M) -> Option<ClientEvent> + Send + 'static,
) {
    while let Some(Ok(msg)) = select! {
        msg = stream.next() => msg,
        _ = cancellation_token.cancelled() => None,
    } {
        let Some(event) = msg_parser(msg) else {
            debug!("Client {} sent an unsupported frame", id);
            continue;
        };
        match event {
            ClientEvent::Text(text) => handler.handle_message(&id, &text),
            ClientEvent::Close => break,
        }
    }
    debug!("Client {} receive loop ended", id);
    cancellation_token.cancel();
}

async fn handle_send<M>(
    mut sink: impl SinkExt<M> + Unpin + Send + 'static,
    mut rx: UnboundedReceiver<String>,
    cancellation_token: CancellationToken,
    msg_factory: impl Fn(String) -> M + Send + 'static,
) {
    while let Some(text) = select! {
        msg = rx.recv() => msg,
        _ = cancellation_token.cancelled() => None,
    } {
        if sink.send(msg_factory(text)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
    cancellation_token.cancel();
}

impl ClientService for ClientServiceImpl {
    fn associate_player(&self, id: &ClientId, player_id: PlayerId) -> ServiceResult<()> {
        if !self.player_associations.try_insert(*id, player_id) {
            return ServiceError::internal(format!(
                "Failed to associate player {} with client {}",
                player_id, id
            ));
        }
        Ok(())
    }

    fn get_associated_player(&self, id: &ClientId) -> Option<PlayerId> {
        self.player_associations.get_by_key(id)
    }

    fn is_player_online(&self, player_id: PlayerId) -> bool {
        self.player_associations.contains_value(&player_id)
    }

    fn get_client_addr(&self, id: &ClientId) -> Option<SocketAddr> {
        self.client_addrs.get(id).map(|entry| *entry.value())
    }

    fn try_client_send(&self, id: &ClientId, msg: &ServerMessage) {
        let Some(sender) = self.client_senders.get(id) else {
            debug!("Client {} has no active sender", id);
            return;
        };
        match serde_json::to_string(msg) {
            Ok(text) => {
                if sender.send(text).is_err() {
                    debug!("Client {} send channel is closed", id);
                }
            }
            Err(e) => error!("Failed to serialize server message: {}", e),
        }
    }

    fn try_player_send(&self, player_id: PlayerId, msg: &ServerMessage) {
        if let Some(id) = self.player_associations.get_by_value(&player_id) {
            self.try_client_send(&id, msg);
        }
    }

    fn try_broadcast_authenticated(&self, msg: &ServerMessage) {
        for id in self.player_associations.get_keys() {
            self.try_client_send(&id, msg);
        }
    }
}

pub async fn serve_tcp_server(
    app: AppState,
    client_service: ClientServiceImpl,
    cancellation: CancellationToken,
) {
    let tcp_port = std::env::var("PARLOR_TCP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .expect("PARLOR_TCP_PORT must be a valid u16");
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", tcp_port))
        .await
        .expect("Failed to bind TCP listener");
    info!("TCP server listening on port {}", tcp_port);

    loop {
        let accepted = select! {
            res = listener.accept() => res,
            _ = cancellation.cancelled() => break,
        };
        let (socket, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to accept TCP connection: {}", e);
                continue;
            }
        };
        debug!("New TCP connection from {}", addr);
        let service = client_service.clone();
        let app = app.clone();
        let shutdown = cancellation.clone();
        tokio::spawn(async move {
            service.handle_client_tcp(app, socket, addr, shutdown).await;
        });
    }
    info!("TCP server stopped");
}

#[derive(Clone)]
struct WsState {
    app: AppState,
    client_service: ClientServiceImpl,
    shutdown: CancellationToken,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        state
            .client_service
            .handle_client_websocket(state.app, socket, Some(addr), state.shutdown)
            .await;
    })
}

pub async fn serve_ws_server(
    app: AppState,
    client_service: ClientServiceImpl,
    cancellation: CancellationToken,
) {
    let ws_port = std::env::var("PARLOR_WS_PORT")
        .unwrap_or_else(|_| "8081".to_string())
        .parse::<u16>()
        .expect("PARLOR_WS_PORT must be a valid u16");
    let state = WsState {
        app,
        client_service,
        shutdown: cancellation.clone(),
    };
    let router = Router::new()
        .route("/", any(ws_handler))
        .route("/ws", any(ws_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", ws_port))
        .await
        .expect("Failed to bind WebSocket listener");
    info!("WebSocket server listening on port {}", ws_port);

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancellation.clone().cancelled_owned());
    if let Err(e) = serve.await {
        error!("WebSocket server error: {}", e);
    }
    info!("WebSocket server stopped");
}

/// Records everything the services try to send, so tests can assert on the
/// exact notifications a player would have received.
#[cfg(test)]
#[derive(Clone)]
pub struct MockClientService {
    associations: Arc<OneOneDashMap<ClientId, PlayerId>>,
    sent: Arc<std::sync::Mutex<Vec<(PlayerId, ServerMessage)>>>,
}

#[cfg(test)]
impl MockClientService {
    pub fn new() -> Self {
        Self {
            associations: Arc::new(OneOneDashMap::new()),
            sent: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn messages_for(&self, player_id: PlayerId) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == player_id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

#[cfg(test)]
impl ClientService for MockClientService {
    fn associate_player(&self, id: &ClientId, player_id: PlayerId) -> ServiceResult<()> {
        if !self.associations.try_insert(*id, player_id) {
            return ServiceError::internal(format!(
                "Failed to associate player {} with client {}",
                player_id, id
            ));
        }
        Ok(())
    }

    fn get_associated_player(&self, id: &ClientId) -> Option<PlayerId> {
        self.associations.get_by_key(id)
    }

    fn is_player_online(&self, player_id: PlayerId) -> bool {
        self.associations.contains_value(&player_id)
    }

    fn get_client_addr(&self, _id: &ClientId) -> Option<SocketAddr> {
        None
    }

    fn try_client_send(&self, id: &ClientId, msg: &ServerMessage) {
        if let Some(player_id) = self.associations.get_by_key(id) {
            self.sent.lock().unwrap().push((player_id, msg.clone()));
        }
    }

    fn try_player_send(&self, player_id: PlayerId, msg: &ServerMessage) {
        self.sent.lock().unwrap().push((player_id, msg.clone()));
    }

    fn try_broadcast_authenticated(&self, msg: &ServerMessage) {
        for id in self.associations.get_keys() {
            self.try_client_send(&id, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_is_exclusive_per_client() {
        let service = ClientServiceImpl::new();
        let client = new_client();
        service.associate_player(&client, 1).unwrap();

        assert_eq!(service.get_associated_player(&client), Some(1));
        assert!(service.is_player_online(1));
        assert!(service.associate_player(&client, 2).is_err());
        assert!(!service.is_player_online(2));
    }

    #[test]
    fn test_send_reaches_registered_channel() {
        let service = ClientServiceImpl::new();
        let client = new_client();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        service.add_client(client, None, tx);
        service.associate_player(&client, 7).unwrap();

        service.try_player_send(
            7,
            &ServerMessage::QueueLeft {
                game_name: "tictactoe".to_string(),
            },
        );

        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"queue_left\""));
        assert!(text.contains("tictactoe"));
    }

    #[test]
    fn test_remove_client_clears_association() {
        let service = ClientServiceImpl::new();
        let client = new_client();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        service.add_client(client, None, tx);
        service.associate_player(&client, 3).unwrap();

        assert_eq!(service.remove_client(&client), Some(3));
        assert!(!service.is_player_online(3));
        assert_eq!(service.remove_client(&client), None);
    }

    #[test]
    fn test_broadcast_skips_unauthenticated_clients() {
        let service = ClientServiceImpl::new();
        let logged_in = new_client();
        let anonymous = new_client();
        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        service.add_client(logged_in, None, tx1);
        service.add_client(anonymous, None, tx2);
        service.associate_player(&logged_in, 1).unwrap();

        service.try_broadcast_authenticated(&ServerMessage::QueueLeft {
            game_name: "connect4".to_string(),
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
