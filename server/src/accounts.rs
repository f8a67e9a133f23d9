use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::messages::{
    AccountId, AccountState, Credentials, HandshakeRequest, HandshakeResponse, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use thiserror::Error;

/// Points every new account starts with.
pub const STARTING_POINTS: u64 = 10_000;

const TOKEN_LENGTH: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeRejection {
    #[error("client version {client} does not match server version {server}")]
    VersionMismatch { client: String, server: String },

    #[error("invalid credentials for account {}", .0.raw())]
    InvalidCredentials(AccountId),
}

impl HandshakeRejection {
    /// The response telling the client it was refused.
    pub fn response(&self) -> HandshakeResponse {
        HandshakeResponse {
            server_version: PROTOCOL_VERSION.to_string(),
            new_credentials: None,
            account_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Account {
    token: String,
    state: AccountState,
}

/// Every account the server knows about, shared by all connections.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: HashMap<AccountId, Account>,
    last_id: u64,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn create_account<R: Rng + ?Sized>(&mut self, rng: &mut R) -> (Credentials, AccountState) {
        self.last_id += 1;
        let id = AccountId::new(self.last_id);
        let token: String = rng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        info!("Creating account {}", id.raw());

        let state = AccountState {
            points: STARTING_POINTS,
        };
        self.accounts.insert(
            id,
            Account {
                token: token.clone(),
                state: state.clone(),
            },
        );

        (Credentials { id, token }, state)
    }

    pub fn login(&self, credentials: &Credentials) -> Option<AccountState> {
        self.accounts
            .get(&credentials.id)
            .filter(|account| account.token == credentials.token)
            .map(|account| account.state.clone())
    }

    /// Checks the client version, then logs into the requested account or
    /// creates a new one.
    pub fn handshake<R: Rng + ?Sized>(
        &mut self,
        request: &HandshakeRequest,
        rng: &mut R,
    ) -> Result<HandshakeResponse, HandshakeRejection> {
        if request.client_version != PROTOCOL_VERSION {
            return Err(HandshakeRejection::VersionMismatch {
                client: request.client_version.clone(),
                server: PROTOCOL_VERSION.to_string(),
            });
        }

        let (new_credentials, state) = match &request.credentials {
            Some(credentials) => {
                let state = self
                    .login(credentials)
                    .ok_or(HandshakeRejection::InvalidCredentials(credentials.id))?;
                info!("Account {} logged in", credentials.id.raw());
                (None, state)
            }
            None => {
                let (credentials, state) = self.create_account(rng);
                (Some(credentials), state)
            }
        };

        Ok(HandshakeResponse {
            server_version: PROTOCOL_VERSION.to_string(),
            new_credentials,
            account_data: Some(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request(credentials: Option<Credentials>) -> HandshakeRequest {
        HandshakeRequest {
            client_version: PROTOCOL_VERSION.to_string(),
            credentials,
        }
    }

    #[test]
    fn test_new_client_gets_an_account() {
        let mut registry = AccountRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);

        let response = registry.handshake(&request(None), &mut rng).unwrap();
        let credentials = response.new_credentials.unwrap();

        assert_eq!(credentials.id, AccountId::new(1));
        assert_eq!(credentials.token.len(), TOKEN_LENGTH);
        assert_eq!(
            response.account_data,
            Some(AccountState {
                points: STARTING_POINTS
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_returning_client_logs_in() {
        let mut registry = AccountRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (credentials, _) = registry.create_account(&mut rng);

        let response = registry
            .handshake(&request(Some(credentials)), &mut rng)
            .unwrap();

        assert_eq!(response.new_credentials, None);
        assert!(response.account_data.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_wrong_token_is_refused() {
        let mut registry = AccountRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (credentials, _) = registry.create_account(&mut rng);
        let forged = Credentials {
            id: credentials.id,
            token: "guess".to_string(),
        };

        assert_eq!(
            registry.handshake(&request(Some(forged)), &mut rng),
            Err(HandshakeRejection::InvalidCredentials(credentials.id))
        );
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let mut registry = AccountRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let outdated = HandshakeRequest {
            client_version: "0.0.0-old".to_string(),
            credentials: None,
        };

        let rejection = registry.handshake(&outdated, &mut rng).unwrap_err();
        assert!(matches!(rejection, HandshakeRejection::VersionMismatch { .. }));
        assert_eq!(rejection.response().account_data, None);
        assert!(registry.is_empty());
    }
}
