use anyhow::bail;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// The identity store the game service delegates to. Real deployments back
/// this with persistent storage and password hashing; the server only ever
/// sees the three operations below.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Checks credentials and issues an auth token. The token stays valid
    /// until logout or server restart.
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<String>;

    /// Resolves a token back to its username, if the token is known.
    async fn validate_token(&self, token: &str) -> Option<String>;

    /// Creates an account.
    async fn register(&self, username: &str, password: &str) -> anyhow::Result<()>;
}

/// A process-local [`Authenticator`] for tests and standalone servers.
#[derive(Default)]
pub struct InMemoryAuthenticator {
    users: RwLock<FxHashMap<String, String>>,
    /// token -> username
    tokens: RwLock<FxHashMap<String, String>>,
}

impl InMemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.users
            .write()
            .insert(username.to_owned(), password.to_owned());
        self
    }
}

#[async_trait]
impl Authenticator for InMemoryAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<String> {
        match self.users.read().get(username) {
            Some(stored) if stored == password => {}
            Some(_) => bail!("invalid password for '{username}'"),
            None => bail!("unknown user '{username}'"),
        }

        let token = Uuid::new_v4().to_string();
        self.tokens
            .write()
            .insert(token.clone(), username.to_owned());

        Ok(token)
    }

    async fn validate_token(&self, token: &str) -> Option<String> {
        self.tokens.read().get(token).cloned()
    }

    async fn register(&self, username: &str, password: &str) -> anyhow::Result<()> {
        let mut users = self.users.write();

        if users.contains_key(username) {
            bail!("user '{username}' already exists");
        }

        users.insert(username.to_owned(), password.to_owned());
        Ok(())
    }
}
