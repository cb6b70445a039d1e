use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{LivehubError, Result};
use crate::config::Config;
use crate::hub::{HubClient, WebSubHubClient};
use crate::platform::{PlatformClient, YoutubeClient};
use crate::pubsub::PubSub;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub pubsub: Arc<PubSub<SqliteStore>>,
}

impl AppContext {
    /// Opens the database at `db_path`, falling back to `[database] path`
    /// and then the platform data directory.
    pub fn new(config: &Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path.or_else(|| config.database.path.clone()) {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::with_store(config, store)
    }

    pub fn in_memory(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::with_store(config, store)
    }

    fn with_store(config: &Config, store: Arc<SqliteStore>) -> Result<Self> {
        let platform: Arc<dyn PlatformClient + Send + Sync> =
            Arc::new(YoutubeClient::new(&config.youtube)?);
        let hub: Arc<dyn HubClient + Send + Sync> =
            Arc::new(WebSubHubClient::new(&config.hub, &config.server)?);
        let pubsub = Arc::new(PubSub::new(store.clone(), platform, hub, config));

        Ok(Self { store, pubsub })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| LivehubError::Config("Could not find data directory".into()))?;
        let livehub_dir = data_dir.join("livehub");
        std::fs::create_dir_all(&livehub_dir)?;
        Ok(livehub_dir.join("livehub.db"))
    }
}
