//! Notification store.
//!
//! The dispatcher persists one notification record per recipient through the
//! [`NotificationStore`] trait and reads the user directory through it. The
//! relational store lives in the API; [`MemoryNotificationStore`] backs tests
//! and single-process deployments.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Notification categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A pet was listed
    NewPet,
    /// The user's adoption request changed status
    AdoptionStatus,
    /// A new adoption request awaits an administrator
    NewRequest,
}

impl NotificationType {
    /// Type as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewPet => "NEW_PET",
            NotificationType::AdoptionStatus => "ADOPTION_STATUS",
            NotificationType::NewRequest => "NEW_REQUEST",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Store-assigned ID
    pub id: i64,
    /// Recipient domain user ID
    pub user_id: i64,
    /// Notification type
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Human-readable message
    pub message: String,
    /// Whether the user has read it
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A notification to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// Recipient domain user ID
    pub user_id: i64,
    /// Notification type
    pub kind: NotificationType,
    /// Human-readable message
    pub message: String,
}

impl NewNotification {
    /// Create a new unread notification.
    pub fn new(user_id: i64, kind: NotificationType, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
        }
    }
}

/// A user as seen by the notification service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Domain user ID
    pub id: i64,
    /// Identity provider user ID
    pub identity_user_id: String,
    /// Display name
    pub display_name: String,
    /// Role names (e.g., "Admin", "User")
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    /// Create a profile.
    pub fn new(id: i64, identity_user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            identity_user_id: identity_user_id.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Check if the user has a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Persistence and user directory used by the dispatcher.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification and return the stored record.
    async fn create_notification(&self, notification: NewNotification) -> StoreResult<Notification>;

    /// List every user.
    async fn list_all_users(&self) -> StoreResult<Vec<UserProfile>>;

    /// List users holding a role.
    async fn list_users_by_role(&self, role: &str) -> StoreResult<Vec<UserProfile>>;
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    notifications: Vec<Notification>,
    users: Vec<UserProfile>,
}

/// In-memory notification store.
#[derive(Default)]
pub struct MemoryNotificationStore {
    state: RwLock<StoreState>,
    failing_users: RwLock<HashSet<i64>>,
    directory_unavailable: AtomicBool,
}

impl std::fmt::Debug for MemoryNotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNotificationStore").finish_non_exhaustive()
    }
}

impl MemoryNotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a user directory.
    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                users: users.into_iter().collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Add a user to the directory.
    pub async fn add_user(&self, user: UserProfile) {
        self.state.write().await.users.push(user);
    }

    /// Make creating notifications for a user fail.
    pub async fn fail_creates_for(&self, user_id: i64) {
        self.failing_users.write().await.insert(user_id);
    }

    /// Make user directory lookups fail or succeed.
    pub fn set_directory_available(&self, available: bool) {
        self.directory_unavailable.store(!available, Ordering::SeqCst);
    }

    /// All stored notifications, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    /// Notifications for one user, newest first.
    pub async fn notifications_for_user(&self, user_id: i64) -> Vec<Notification> {
        let state = self.state.read().await;
        let mut result: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result
    }

    /// Unread notifications for one user, newest first.
    pub async fn unread_for_user(&self, user_id: i64) -> Vec<Notification> {
        let mut result = self.notifications_for_user(user_id).await;
        result.retain(|n| !n.is_read);
        result
    }

    /// Mark one of a user's notifications as read.
    ///
    /// Returns `NotFound` when the notification does not exist or belongs to
    /// another user.
    pub async fn mark_as_read(&self, notification_id: i64, user_id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
            .ok_or(StoreError::NotFound(notification_id))?;
        notification.is_read = true;
        Ok(())
    }

    /// Mark all of a user's notifications as read. Returns how many changed.
    pub async fn mark_all_as_read(&self, user_id: i64) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            notification.is_read = true;
            changed += 1;
        }
        changed
    }

    fn ensure_directory(&self) -> StoreResult<()> {
        if self.directory_unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Persistence("User directory unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        if self.failing_users.read().await.contains(&notification.user_id) {
            return Err(StoreError::Persistence(format!(
                "Insert rejected for user {}",
                notification.user_id
            )));
        }

        let mut state = self.state.write().await;
        state.next_id += 1;
        let stored = Notification {
            id: state.next_id,
            user_id: notification.user_id,
            kind: notification.kind,
            message: notification.message,
            is_read: false,
            created_at: Utc::now(),
        };
        state.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_all_users(&self) -> StoreResult<Vec<UserProfile>> {
        self.ensure_directory()?;
        Ok(self.state.read().await.users.clone())
    }

    async fn list_users_by_role(&self, role: &str) -> StoreResult<Vec<UserProfile>> {
        self.ensure_directory()?;
        Ok(self
            .state
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.has_role(role))
            .cloned()
            .collect())
    }
}
