use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::info;
use rustrict::CensorStr;

use crate::{
    app::{ArcClientService, ArcPlayerRepository, ServiceError, ServiceResult},
    client::ClientId,
    util::validate_email,
};

pub type AccountId = i64;
/// Session id. This is the `player_id` clients see on the wire.
pub type PlayerId = i64;

#[derive(Clone, Debug)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One logged-in presence. Accounts may hold several sessions at once;
/// guests hold exactly one and lose it on disconnect.
#[derive(Clone, Debug)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub account_id: Option<AccountId>,
    pub pseudo: String,
    pub remote_addr: Option<String>,
    pub is_guest: bool,
}

pub trait PlayerService {
    fn try_register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> ServiceResult<AccountId>;
    fn try_login(
        &self,
        id: &ClientId,
        username: &str,
        password: &str,
    ) -> ServiceResult<(Account, PlayerSession)>;
    fn try_login_guest(&self, id: &ClientId, pseudo: Option<&str>)
    -> ServiceResult<PlayerSession>;
    fn get_session(&self, player_id: PlayerId) -> ServiceResult<PlayerSession>;
    fn pseudo_of(&self, player_id: PlayerId) -> ServiceResult<String>;
    fn account_id_of(&self, player_id: PlayerId) -> ServiceResult<Option<AccountId>>;
    fn is_guest(&self, player_id: PlayerId) -> ServiceResult<bool>;
    fn on_disconnect(&self, player_id: PlayerId);
}

pub struct PlayerServiceImpl {
    client_service: ArcClientService,
    player_repository: ArcPlayerRepository,
    account_cache: Arc<moka::sync::Cache<String, Account>>,
    session_cache: Arc<moka::sync::Cache<PlayerId, PlayerSession>>,
    next_guest_id: Arc<Mutex<u32>>,
}

impl PlayerServiceImpl {
    pub fn new(client_service: ArcClientService, player_repository: ArcPlayerRepository) -> Self {
        Self {
            client_service,
            player_repository,
            account_cache: Arc::new(moka::sync::Cache::builder().max_capacity(1000).build()),
            session_cache: Arc::new(moka::sync::Cache::builder().max_capacity(1000).build()),
            next_guest_id: Arc::new(Mutex::new(1)),
        }
    }

    fn increment_guest_id(&self) -> u32 {
        let mut id_lock = self
            .next_guest_id
            .lock()
            .expect("Failed to lock guest ID mutex");
        let guest_id = *id_lock;
        *id_lock += 1;
        guest_id
    }

    fn validate_username(username: &str) -> ServiceResult<()> {
        if username.to_ascii_lowercase().starts_with("guest") {
            return ServiceError::bad_request("Username cannot start with 'Guest'");
        }
        if username.len() < 3 || username.len() > 20 {
            return ServiceError::bad_request("Username must be between 3 and 20 characters");
        }
        if username
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
        {
            return ServiceError::bad_request(
                "Username may only contain letters, digits, '_' and '-'",
            );
        }
        if username.is_inappropriate() {
            return ServiceError::bad_request("Username contains inappropriate content");
        }
        Ok(())
    }

    fn resolve_display_name(username: &str, display_name: Option<&str>) -> ServiceResult<String> {
        let trimmed = display_name.map(str::trim).unwrap_or("");
        if trimmed.is_empty() {
            return Ok(username.to_string());
        }
        if trimmed.len() > 32 {
            return ServiceError::bad_request("Display name must be at most 32 characters");
        }
        if trimmed.is_inappropriate() {
            return ServiceError::bad_request("Display name contains inappropriate content");
        }
        Ok(trimmed.to_string())
    }

    fn fetch_account(&self, username: &str) -> ServiceResult<Account> {
        let username = username.to_string();
        if let Some(account) = self.account_cache.get(&username) {
            return Ok(account);
        }
        match self.player_repository.get_account_by_username(&username)? {
            Some(account) => {
                self.account_cache.insert(username, account.clone());
                Ok(account)
            }
            None => ServiceError::not_found("Account not found"),
        }
    }

    fn remote_addr_of(&self, id: &ClientId) -> Option<String> {
        self.client_service
            .get_client_addr(id)
            .map(|addr| addr.to_string())
    }
}

impl PlayerService for PlayerServiceImpl {
    fn try_register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> ServiceResult<AccountId> {
        Self::validate_username(username)?;
        let display_name = Self::resolve_display_name(username, display_name)?;
        let email = match email {
            Some(raw) => Some(validate_email(raw)?),
            None => None,
        };
        if password.is_empty() {
            return ServiceError::bad_request("Password must not be empty");
        }
        if self
            .player_repository
            .get_account_by_username(username)?
            .is_some()
        {
            return ServiceError::not_possible("Username already taken");
        }
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| ServiceError::Internal(format!("Failed to hash password: {}", e)))?;
        let account_id = self.player_repository.create_account(
            username,
            &password_hash,
            &display_name,
            email.as_deref(),
        )?;
        info!("Registered account {} ({})", username, account_id);
        Ok(account_id)
    }

    fn try_login(
        &self,
        id: &ClientId,
        username: &str,
        password: &str,
    ) -> ServiceResult<(Account, PlayerSession)> {
        if self.client_service.get_associated_player(id).is_some() {
            return ServiceError::not_possible("Connection is already logged in");
        }
        let account = match self.fetch_account(username) {
            Ok(account) => account,
            Err(ServiceError::NotFound(_)) => {
                return ServiceError::unauthorized("Invalid username or password");
            }
            Err(e) => return Err(e),
        };
        let valid = bcrypt::verify(password, &account.password_hash)
            .map_err(|_| ServiceError::BadRequest("Failed to verify password".into()))?;
        if !valid {
            return ServiceError::unauthorized("Invalid username or password");
        }
        let remote_addr = self.remote_addr_of(id);
        let player_id = self.player_repository.create_session(
            Some(account.id),
            &account.display_name,
            remote_addr.as_deref(),
            false,
        )?;
        let session = self.get_session(player_id)?;
        self.client_service.associate_player(id, player_id)?;
        info!(
            "Account {} logged in as player {} from {}",
            account.username,
            player_id,
            session.remote_addr.as_deref().unwrap_or("unknown")
        );
        Ok((account, session))
    }

    fn try_login_guest(
        &self,
        id: &ClientId,
        pseudo: Option<&str>,
    ) -> ServiceResult<PlayerSession> {
        if self.client_service.get_associated_player(id).is_some() {
            return ServiceError::not_possible("Connection is already logged in");
        }
        let pseudo = match pseudo {
            Some(name) => {
                Self::validate_username(name)?;
                name.to_string()
            }
            None => format!("Guest{}", self.increment_guest_id()),
        };
        let remote_addr = self.remote_addr_of(id);
        let player_id =
            self.player_repository
                .create_session(None, &pseudo, remote_addr.as_deref(), true)?;
        let session = self.get_session(player_id)?;
        self.client_service.associate_player(id, player_id)?;
        info!("Guest {} connected as player {}", pseudo, player_id);
        Ok(session)
    }

    fn get_session(&self, player_id: PlayerId) -> ServiceResult<PlayerSession> {
        if let Some(session) = self.session_cache.get(&player_id) {
            return Ok(session);
        }
        match self.player_repository.get_session(player_id)? {
            Some(session) => {
                self.session_cache.insert(player_id, session.clone());
                Ok(session)
            }
            None => ServiceError::not_found("Unknown player"),
        }
    }

    fn pseudo_of(&self, player_id: PlayerId) -> ServiceResult<String> {
        Ok(self.get_session(player_id)?.pseudo)
    }

    fn account_id_of(&self, player_id: PlayerId) -> ServiceResult<Option<AccountId>> {
        Ok(self.get_session(player_id)?.account_id)
    }

    fn is_guest(&self, player_id: PlayerId) -> ServiceResult<bool> {
        Ok(self.get_session(player_id)?.is_guest)
    }

    fn on_disconnect(&self, player_id: PlayerId) {
        self.session_cache.invalidate(&player_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        client::MockClientService,
        persistence::{open_memory_pool, players::PlayerRepositoryImpl},
    };

    fn test_service() -> PlayerServiceImpl {
        let pool = open_memory_pool();
        let client_service: ArcClientService = Arc::new(Box::new(MockClientService::new()));
        PlayerServiceImpl::new(
            client_service,
            Arc::new(Box::new(PlayerRepositoryImpl::new(pool))),
        )
    }

    #[test]
    fn test_register_validates_username() {
        let service = test_service();
        assert!(service.try_register("ab", "pw", None, None).is_err());
        assert!(service.try_register("has space", "pw", None, None).is_err());
        assert!(service.try_register("Guest99", "pw", None, None).is_err());
        assert!(
            service
                .try_register("this_username_is_way_too_long", "pw", None, None)
                .is_err()
        );
        assert!(service.try_register("al-ice_9", "pw", None, None).is_ok());
    }

    #[test]
    fn test_register_rejects_bad_email_and_empty_password() {
        let service = test_service();
        assert!(
            service
                .try_register("alice", "pw", None, Some("not-an-email"))
                .is_err()
        );
        assert!(service.try_register("alice", "", None, None).is_err());
        assert!(
            service
                .try_register("alice", "pw", None, Some("alice@example.com"))
                .is_ok()
        );
    }

    #[test]
    fn test_login_roundtrip() {
        let service = test_service();
        service
            .try_register("alice", "secret", Some("Alice"), None)
            .unwrap();

        let client = Uuid::new_v4();
        let (account, session) = service.try_login(&client, "alice", "secret").unwrap();
        assert_eq!(account.username, "alice");
        assert_eq!(session.pseudo, "Alice");
        assert_eq!(session.account_id, Some(account.id));
        assert!(!session.is_guest);

        let fetched = service.get_session(session.id).unwrap();
        assert_eq!(fetched.pseudo, "Alice");
    }

    #[test]
    fn test_login_failures_are_uniform() {
        let service = test_service();
        service.try_register("alice", "secret", None, None).unwrap();

        let wrong = service
            .try_login(&Uuid::new_v4(), "alice", "nope")
            .unwrap_err();
        let unknown = service
            .try_login(&Uuid::new_v4(), "nobody", "nope")
            .unwrap_err();
        assert!(matches!(wrong, ServiceError::Unauthorized(_)));
        assert!(matches!(unknown, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let service = test_service();
        service.try_register("alice", "first", None, None).unwrap();
        assert!(service.try_register("alice", "second", None, None).is_err());

        // The original credentials still work.
        assert!(
            service
                .try_login(&Uuid::new_v4(), "alice", "first")
                .is_ok()
        );
    }

    #[test]
    fn test_guest_pseudo_counter() {
        let service = test_service();
        let first = service.try_login_guest(&Uuid::new_v4(), None).unwrap();
        let second = service.try_login_guest(&Uuid::new_v4(), None).unwrap();
        assert_eq!(first.pseudo, "Guest1");
        assert_eq!(second.pseudo, "Guest2");
        assert!(first.is_guest);
        assert_eq!(first.account_id, None);
    }

    #[test]
    fn test_guest_explicit_pseudo_is_validated() {
        let service = test_service();
        assert!(
            service
                .try_login_guest(&Uuid::new_v4(), Some("Guest5"))
                .is_err()
        );
        let session = service
            .try_login_guest(&Uuid::new_v4(), Some("Wanderer"))
            .unwrap();
        assert_eq!(session.pseudo, "Wanderer");
    }

    #[test]
    fn test_connection_cannot_log_in_twice() {
        let service = test_service();
        let client = Uuid::new_v4();
        service.try_login_guest(&client, None).unwrap();
        let err = service.try_login_guest(&client, None).unwrap_err();
        assert!(matches!(err, ServiceError::NotPossible(_)));
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let service = test_service();
        assert!(matches!(
            service.get_session(404).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
