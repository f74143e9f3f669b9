use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use thiserror::Error;

use crate::{
    chat::{ChatService, ChatServiceImpl},
    client::ClientService,
    game::{MatchService, MatchServiceImpl, MoveError},
    persistence::{
        games::{GameRepository, GameRepositoryImpl},
        matches::{MatchRepository, MatchRepositoryImpl},
        players::{PlayerRepository, PlayerRepositoryImpl},
        queues::{QueueRepository, QueueRepositoryImpl},
        ratings::{RatingRepository, RatingRepositoryImpl},
    },
    player::{PlayerService, PlayerServiceImpl},
    queue::{QueueService, QueueServiceImpl},
    rating::{RatingService, RatingServiceImpl},
};

pub type ArcClientService = Arc<Box<dyn ClientService + Send + Sync + 'static>>;
pub type ArcPlayerService = Arc<Box<dyn PlayerService + Send + Sync + 'static>>;
pub type ArcQueueService = Arc<Box<dyn QueueService + Send + Sync + 'static>>;
pub type ArcMatchService = Arc<Box<dyn MatchService + Send + Sync + 'static>>;
pub type ArcRatingService = Arc<Box<dyn RatingService + Send + Sync + 'static>>;
pub type ArcChatService = Arc<Box<dyn ChatService + Send + Sync + 'static>>;

pub type ArcPlayerRepository = Arc<Box<dyn PlayerRepository + Send + Sync + 'static>>;
pub type ArcGameRepository = Arc<Box<dyn GameRepository + Send + Sync + 'static>>;
pub type ArcQueueRepository = Arc<Box<dyn QueueRepository + Send + Sync + 'static>>;
pub type ArcMatchRepository = Arc<Box<dyn MatchRepository + Send + Sync + 'static>>;
pub type ArcRatingRepository = Arc<Box<dyn RatingRepository + Send + Sync + 'static>>;

#[derive(Clone)]
pub struct AppState {
    pub client_service: ArcClientService,
    pub player_service: ArcPlayerService,
    pub queue_service: ArcQueueService,
    pub match_service: ArcMatchService,
    pub rating_service: ArcRatingService,
    pub chat_service: ArcChatService,

    pub player_repository: ArcPlayerRepository,
    pub game_repository: ArcGameRepository,
    pub queue_repository: ArcQueueRepository,
    pub match_repository: ArcMatchRepository,
    pub rating_repository: ArcRatingRepository,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("operation not possible: {0}")]
    NotPossible(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Move(#[from] MoveError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    ConnectionError(r2d2::Error),
    #[error("query error: {0}")]
    QueryError(rusqlite::Error),
}

impl ServiceError {
    pub fn bad_request<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::BadRequest(msg.into()))
    }

    pub fn unauthorized<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Unauthorized(msg.into()))
    }

    pub fn not_found<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotFound(msg.into()))
    }

    pub fn not_possible<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotPossible(msg.into()))
    }

    pub fn internal<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Internal(msg.into()))
    }

    pub fn forbidden<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Forbidden(msg.into()))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Wires every service and repository around the supplied client service.
/// The caller keeps the concrete connection layer; everything else only sees
/// the trait object.
pub fn construct_app(
    pool: Pool<SqliteConnectionManager>,
    client_service: ArcClientService,
) -> AppState {
    let player_repository: ArcPlayerRepository =
        Arc::new(Box::new(PlayerRepositoryImpl::new(pool.clone())));
    let game_repository: ArcGameRepository =
        Arc::new(Box::new(GameRepositoryImpl::new(pool.clone())));
    let queue_repository: ArcQueueRepository =
        Arc::new(Box::new(QueueRepositoryImpl::new(pool.clone())));
    let match_repository: ArcMatchRepository =
        Arc::new(Box::new(MatchRepositoryImpl::new(pool.clone())));
    let rating_repository: ArcRatingRepository =
        Arc::new(Box::new(RatingRepositoryImpl::new(pool)));

    let player_service: ArcPlayerService = Arc::new(Box::new(PlayerServiceImpl::new(
        client_service.clone(),
        player_repository.clone(),
    )));

    let rating_service: ArcRatingService =
        Arc::new(Box::new(RatingServiceImpl::new(rating_repository.clone())));

    let match_service: ArcMatchService = Arc::new(Box::new(MatchServiceImpl::new(
        client_service.clone(),
        player_service.clone(),
        rating_service.clone(),
        game_repository.clone(),
        match_repository.clone(),
    )));

    let queue_service: ArcQueueService = Arc::new(Box::new(QueueServiceImpl::new(
        client_service.clone(),
        player_service.clone(),
        match_service.clone(),
        queue_repository.clone(),
        game_repository.clone(),
    )));

    let chat_service: ArcChatService = Arc::new(Box::new(ChatServiceImpl::new(
        client_service.clone(),
        player_service.clone(),
    )));

    AppState {
        client_service,
        player_service,
        queue_service,
        match_service,
        rating_service,
        chat_service,

        player_repository,
        game_repository,
        queue_repository,
        match_repository,
        rating_repository,
    }
}
