//! Early-access registrations kept in `registration.json`.

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::model::RegisteredUser;
use crate::snapshot::{SnapshotStore, StoreError, REGISTRATION_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
}

#[derive(Debug)]
pub struct Registry {
    store: SnapshotStore,
    /// Serialises read-modify-write appends within this process.
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// A missing file means nobody has registered yet.
    pub async fn all(&self) -> Result<Vec<RegisteredUser>, StoreError> {
        match self.store.read_all(REGISTRATION_FILE).await {
            Err(StoreError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn is_registered(&self, source_id: &str) -> Result<bool, StoreError> {
        Ok(self.all().await?.iter().any(|u| u.user_id == source_id))
    }

    /// Appends `user` unless its id is already on file.
    #[instrument(skip_all, fields(user_id = %user.user_id))]
    pub async fn register(&self, user: RegisteredUser) -> Result<Registration, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.is_registered(&user.user_id).await? {
            return Ok(Registration::AlreadyRegistered);
        }
        self.store.append(REGISTRATION_FILE, user).await?;
        info!("registered");
        Ok(Registration::Registered)
    }
}
