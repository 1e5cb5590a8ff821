use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AuthenticatedUser, FlashMessage};
use crate::security::tokens::generate_token;

/// Server-side state behind the `portal_session` cookie.
#[derive(Debug, Clone)]
pub struct PortalSession {
    pub user: AuthenticatedUser,
    pub csrf_token: String,
    pub flashes: Vec<FlashMessage>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Thread-safe session store with sliding expiry and periodic cleanup.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, PortalSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Creates a session for a freshly authenticated user.
    /// Returns the session id to put in the cookie.
    pub fn create(&self, user: AuthenticatedUser) -> String {
        let session_id = generate_token();
        let now = Utc::now();
        let user_id = user.user_id;

        self.sessions.insert(
            session_id.clone(),
            PortalSession {
                user,
                csrf_token: generate_token(),
                flashes: Vec::new(),
                created_at: now,
                last_seen: now,
                expires_at: now + self.ttl,
            },
        );

        info!(user_id = %user_id, "portal_session_created");
        session_id
    }

    /// Resolves a session id to its user and extends the expiry.
    pub fn authenticate(&self, session_id: &str) -> Option<AuthenticatedUser> {
        let now = Utc::now();
        let expired = match self.sessions.get_mut(session_id) {
            Some(mut entry) if entry.expires_at > now => {
                entry.last_seen = now;
                entry.expires_at = now + self.ttl;
                return Some(entry.user.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            if let Some((_, session)) = self.sessions.remove(session_id) {
                info!(user_id = %session.user.user_id, "portal_session_expired_on_access");
            }
        } else {
            debug!("portal_session_unknown");
        }
        None
    }

    pub fn csrf_token(&self, session_id: &str) -> Option<String> {
        self.sessions.get(session_id).map(|s| s.csrf_token.clone())
    }

    pub fn push_flash(&self, session_id: &str, flash: FlashMessage) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.flashes.push(flash);
        }
    }

    /// Returns pending flashes and clears them.
    pub fn take_flashes(&self, session_id: &str) -> Vec<FlashMessage> {
        self.sessions
            .get_mut(session_id)
            .map(|mut entry| std::mem::take(&mut entry.flashes))
            .unwrap_or_default()
    }

    /// Refreshes the cached user after a profile or role change.
    pub fn refresh_user(&self, user: &AuthenticatedUser) {
        for mut entry in self.sessions.iter_mut() {
            if entry.user.user_id == user.user_id {
                entry.user = user.clone();
            }
        }
    }

    pub fn destroy(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            info!(user_id = %session.user.user_id, "portal_session_destroyed");
        }
    }

    /// Invalidate all sessions for a specific user, e.g. after deactivation
    /// or a password reset. Returns the count of removed sessions.
    pub fn invalidate_user_sessions(&self, user_id: &Uuid) -> usize {
        let mut removed_count = 0;
        self.sessions.retain(|_, session| {
            if session.user.user_id == *user_id {
                removed_count += 1;
                false
            } else {
                true
            }
        });

        if removed_count > 0 {
            info!(user_id = %user_id, removed_count = removed_count, "portal_sessions_invalidated");
        }
        removed_count
    }

    /// Removes expired sessions; returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired_count = 0;
        self.sessions.retain(|_, session| {
            if session.expires_at <= now {
                expired_count += 1;
                false
            } else {
                true
            }
        });

        if expired_count > 0 {
            info!(
                expired_count = expired_count,
                active_sessions = self.sessions.len(),
                "portal_session_cleanup_completed"
            );
        }
        expired_count
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start background cleanup task to remove expired sessions
    pub fn start_cleanup_task(self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.cleanup_expired();
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn expire_now(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use pretty_assertions::assert_eq;

    fn user(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "pat@example.com".to_string(),
            full_name: "Pat".to_string(),
            role,
        }
    }

    #[test]
    fn test_create_and_authenticate() {
        let store = SessionStore::new(Duration::minutes(30));
        let u = user(UserRole::Employee);
        let id = store.create(u.clone());

        let resolved = store.authenticate(&id).unwrap();
        assert_eq!(resolved.user_id, u.user_id);
        assert_eq!(store.csrf_token(&id).unwrap().len(), 64);
        assert!(store.authenticate("unknown").is_none());
    }

    #[test]
    fn test_expired_session_is_removed_on_access() {
        let store = SessionStore::new(Duration::minutes(30));
        let id = store.create(user(UserRole::Client));
        store.expire_now(&id);

        assert!(store.authenticate(&id).is_none());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_flashes_are_one_shot() {
        let store = SessionStore::new(Duration::minutes(30));
        let id = store.create(user(UserRole::Admin));
        store.push_flash(&id, FlashMessage::success("Saved"));
        store.push_flash(&id, FlashMessage::error("But one failed"));

        let flashes = store.take_flashes(&id);
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].message, "Saved");
        assert!(store.take_flashes(&id).is_empty());
    }

    #[test]
    fn test_invalidate_user_sessions() {
        let store = SessionStore::new(Duration::minutes(30));
        let u = user(UserRole::Employee);
        store.create(u.clone());
        store.create(u.clone());
        let other = store.create(user(UserRole::Client));

        assert_eq!(store.invalidate_user_sessions(&u.user_id), 2);
        assert!(store.authenticate(&other).is_some());
    }

    #[test]
    fn test_cleanup_expired() {
        let store = SessionStore::new(Duration::minutes(30));
        let stale = store.create(user(UserRole::Client));
        let fresh = store.create(user(UserRole::Client));
        store.expire_now(&stale);

        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.authenticate(&fresh).is_some());
    }

    #[test]
    fn test_refresh_user_updates_cached_identity() {
        let store = SessionStore::new(Duration::minutes(30));
        let mut u = user(UserRole::Employee);
        let id = store.create(u.clone());
        u.full_name = "Pat Jones".to_string();
        store.refresh_user(&u);
        assert_eq!(store.authenticate(&id).unwrap().full_name, "Pat Jones");
    }

    #[test]
    fn test_cleanup_task_sweeps_expired_sessions() {
        let store = SessionStore::new(Duration::minutes(30));
        let expired = store.create(user(UserRole::Client));
        let live = store.create(user(UserRole::Admin));
        store.expire_now(&expired);

        tokio_test::block_on(async {
            let handle = store.clone().start_cleanup_task(std::time::Duration::from_millis(5));
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            handle.abort();
        });

        assert_eq!(store.active_count(), 1);
        assert!(store.authenticate(&live).is_some());
    }
}
