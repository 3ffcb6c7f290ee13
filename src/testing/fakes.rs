//! In-memory stand-ins for the Sysdig APIs.
//!
//! They follow the HTTP clients' contract: reads of missing entities fail
//! with [`ProviderError::NotFound`] and deletes of missing entities succeed.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::{GroupMapping, GroupMappingApi, NotificationChannel, NotificationChannelApi};
use crate::error::ProviderError;

struct Store<T> {
    next_id: i64,
    entries: BTreeMap<i64, T>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Store<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn lock<T>(mutex: &Mutex<Store<T>>) -> MutexGuard<'_, Store<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Notification channels held in memory.
#[derive(Default)]
pub struct InMemoryNotificationChannels {
    team_id: i64,
    store: Mutex<Store<NotificationChannel>>,
}

impl InMemoryNotificationChannels {
    /// A store whose current user works in team `team_id`.
    pub fn with_team(team_id: i64) -> Self {
        Self {
            team_id,
            ..Default::default()
        }
    }

    pub fn get(&self, id: i64) -> Option<NotificationChannel> {
        lock(&self.store).entries.get(&id).cloned()
    }

    /// Drop a channel behind the provider's back.
    pub fn remove(&self, id: i64) -> Option<NotificationChannel> {
        lock(&self.store).entries.remove(&id)
    }

    /// Change a stored channel behind the provider's back.
    pub fn edit(&self, id: i64, f: impl FnOnce(&mut NotificationChannel)) {
        if let Some(channel) = lock(&self.store).entries.get_mut(&id) {
            f(channel);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.store).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationChannelApi for InMemoryNotificationChannels {
    async fn current_team_id(&self) -> Result<i64, ProviderError> {
        Ok(self.team_id)
    }

    async fn create_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError> {
        let mut store = lock(&self.store);
        let id = store.allocate();
        let mut created = channel.clone();
        created.id = Some(id);
        created.version = Some(1);
        store.entries.insert(id, created.clone());
        Ok(created)
    }

    async fn get_notification_channel(&self, id: i64) -> Result<NotificationChannel, ProviderError> {
        self.get(id)
            .ok_or_else(|| ProviderError::NotFound(format!("notification channel {}", id)))
    }

    async fn update_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError> {
        let id = channel.id.ok_or_else(|| {
            ProviderError::InvalidRequest("notification channel update requires an id".to_string())
        })?;
        let mut store = lock(&self.store);
        let current = store
            .entries
            .get(&id)
            .ok_or_else(|| ProviderError::NotFound(format!("notification channel {}", id)))?;
        if channel.version != current.version {
            return Err(ProviderError::Api {
                status: 409,
                message: format!(
                    "version mismatch: sent {:?}, stored {:?}",
                    channel.version, current.version
                ),
            });
        }
        let mut updated = channel.clone();
        updated.version = current.version.map(|v| v + 1);
        store.entries.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_notification_channel(&self, id: i64) -> Result<(), ProviderError> {
        lock(&self.store).entries.remove(&id);
        Ok(())
    }
}

/// Group mappings held in memory.
#[derive(Default)]
pub struct InMemoryGroupMappings {
    store: Mutex<Store<GroupMapping>>,
}

impl InMemoryGroupMappings {
    pub fn get(&self, id: i64) -> Option<GroupMapping> {
        lock(&self.store).entries.get(&id).cloned()
    }

    /// Drop a mapping behind the provider's back.
    pub fn remove(&self, id: i64) -> Option<GroupMapping> {
        lock(&self.store).entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.store).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GroupMappingApi for InMemoryGroupMappings {
    async fn create_group_mapping(&self, mapping: &GroupMapping) -> Result<GroupMapping, ProviderError> {
        let mut store = lock(&self.store);
        let id = store.allocate();
        let mut created = mapping.clone();
        created.id = Some(id);
        store.entries.insert(id, created.clone());
        Ok(created)
    }

    async fn update_group_mapping(
        &self,
        mapping: &GroupMapping,
        id: i64,
    ) -> Result<GroupMapping, ProviderError> {
        let mut store = lock(&self.store);
        if !store.entries.contains_key(&id) {
            return Err(ProviderError::Api {
                status: 404,
                message: format!("group mapping {} not found", id),
            });
        }
        let mut updated = mapping.clone();
        updated.id = Some(id);
        store.entries.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_group_mapping(&self, id: i64) -> Result<(), ProviderError> {
        lock(&self.store).entries.remove(&id);
        Ok(())
    }

    async fn get_group_mapping(&self, id: i64) -> Result<GroupMapping, ProviderError> {
        self.get(id)
            .ok_or_else(|| ProviderError::NotFound(format!("group mapping {}", id)))
    }
}
