//! In-memory registry of users and groups.
//!
//! Groups are keyed by lowercased name, users by UUID. The registry
//! owns the holders; resolution borrows them through [`GroupLookup`].
//! Holder creation injects the shared resolver configuration and event
//! sink, so every holder managed by one registry behaves uniformly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stratum_config::ResolverConfig;
use stratum_core::{EventSink, GroupLookup, PermissionHolder};
use stratum_types::{RegistryError, RegistryResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory holder registry.
pub struct MemoryRegistry {
    config: ResolverConfig,
    events: Arc<dyn EventSink>,
    users: RwLock<HashMap<Uuid, Arc<PermissionHolder>>>,
    groups: RwLock<HashMap<String, Arc<PermissionHolder>>>,
}

impl MemoryRegistry {
    pub fn new(config: ResolverConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            events,
            users: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// Create a group. Names are case-insensitive; creating a group
    /// whose lowercased name already exists is a conflict.
    pub async fn create_group(&self, name: &str) -> RegistryResult<Arc<PermissionHolder>> {
        let key = name.to_lowercase();
        let mut groups = self.groups.write().await;

        if groups.contains_key(&key) {
            return Err(RegistryError::Conflict);
        }

        let group = Arc::new(PermissionHolder::group(
            &key,
            self.config,
            Arc::clone(&self.events),
        ));
        groups.insert(key, Arc::clone(&group));
        Ok(group)
    }

    pub async fn get_group(&self, name: &str) -> Option<Arc<PermissionHolder>> {
        self.groups.read().await.get(&name.to_lowercase()).cloned()
    }

    /// Remove a group from the registry.
    ///
    /// Holders referencing the group are left untouched: their
    /// membership nodes simply stop resolving, which the walker
    /// tolerates by design.
    pub async fn delete_group(&self, name: &str) -> RegistryResult<()> {
        self.groups
            .write()
            .await
            .remove(&name.to_lowercase())
            .map(|_| ())
            .ok_or(RegistryError::NotFound)
    }

    pub async fn list_groups(&self) -> Vec<Arc<PermissionHolder>> {
        self.groups.read().await.values().cloned().collect()
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn create_user(&self, id: Uuid) -> RegistryResult<Arc<PermissionHolder>> {
        let mut users = self.users.write().await;

        if users.contains_key(&id) {
            return Err(RegistryError::Conflict);
        }

        let user = Arc::new(PermissionHolder::user(
            id,
            self.config,
            Arc::clone(&self.events),
        ));
        users.insert(id, Arc::clone(&user));
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Option<Arc<PermissionHolder>> {
        self.users.read().await.get(&id).cloned()
    }

    pub async fn delete_user(&self, id: Uuid) -> RegistryResult<()> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RegistryError::NotFound)
    }

    /// Run the expiry auditor over every registered holder. Returns
    /// whether any holder had expired nodes removed.
    pub async fn audit_all(&self) -> bool {
        let holders: Vec<Arc<PermissionHolder>> = {
            let users = self.users.read().await;
            let groups = self.groups.read().await;
            users.values().chain(groups.values()).cloned().collect()
        };

        let mut work = false;
        for holder in holders {
            work |= holder.audit_temporary_permissions().await;
        }
        work
    }
}

#[async_trait]
impl GroupLookup for MemoryRegistry {
    async fn lookup(&self, name: &str) -> Option<Arc<PermissionHolder>> {
        self.get_group(name).await
    }
}

#[cfg(test)]
mod tests {
    use stratum_core::{Node, NullEventSink, Tristate};

    use super::*;

    fn registry() -> MemoryRegistry {
        MemoryRegistry::new(ResolverConfig::default(), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn group_names_are_case_insensitive() {
        let registry = registry();
        registry.create_group("Admin").await.unwrap();

        assert!(registry.get_group("admin").await.is_some());
        assert!(registry.get_group("ADMIN").await.is_some());
        assert_eq!(
            registry.create_group("ADMIN").await.unwrap_err(),
            RegistryError::Conflict
        );
    }

    #[tokio::test]
    async fn delete_group_leaves_references_dangling() {
        let registry = registry();
        let admin = registry.create_group("admin").await.unwrap();
        admin
            .set_permission(Node::builder("admin.perm").build().unwrap())
            .await
            .unwrap();

        let user = registry.create_user(Uuid::new_v4()).await.unwrap();
        user.set_permission(Node::builder("group.admin").build().unwrap())
            .await
            .unwrap();

        let probe = Node::builder("admin.perm").build().unwrap();
        assert_eq!(
            user.inherits_permission(&registry, &probe).await,
            Tristate::True
        );

        registry.delete_group("admin").await.unwrap();

        // The membership node remains but no longer resolves.
        assert_eq!(
            user.has_permission(&Node::builder("group.admin").build().unwrap(), false)
                .await,
            Tristate::True
        );
        assert_eq!(
            user.inherits_permission(&registry, &probe).await,
            Tristate::Undefined
        );

        assert_eq!(
            registry.delete_group("admin").await.unwrap_err(),
            RegistryError::NotFound
        );
    }

    #[tokio::test]
    async fn users_are_keyed_by_uuid() {
        let registry = registry();
        let id = Uuid::new_v4();

        let user = registry.create_user(id).await.unwrap();
        assert_eq!(user.object_name(), id.to_string());

        assert_eq!(
            registry.create_user(id).await.unwrap_err(),
            RegistryError::Conflict
        );
        assert!(registry.get_user(id).await.is_some());

        registry.delete_user(id).await.unwrap();
        assert!(registry.get_user(id).await.is_none());
    }

    #[tokio::test]
    async fn audit_all_sweeps_every_holder() {
        let registry = registry();
        let group = registry.create_group("g").await.unwrap();
        let user = registry.create_user(Uuid::new_v4()).await.unwrap();

        let expired = Node::builder("stale").expiry(1).build().unwrap();
        group
            .set_nodes(std::collections::HashSet::from([expired.clone()]))
            .await;
        user.set_nodes(std::collections::HashSet::from([expired]))
            .await;

        // set_nodes already audited both holders.
        assert!(!registry.audit_all().await);
        assert!(group.nodes().await.is_empty());
        assert!(user.nodes().await.is_empty());
    }
}
