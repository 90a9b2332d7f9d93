use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::DebugError;
use crate::session::{DebugSession, SessionBindings, SessionKey, SessionMap};
use crate::subscriber::DebugSubscriber;

#[derive(Clone, Default)]
pub struct DebugSessionRegistry {
    sessions: Arc<SessionMap>,
    subscribers: Arc<Mutex<Vec<Arc<dyn DebugSubscriber>>>>,
}

impl fmt::Debug for DebugSessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSessionRegistry")
            .field("sessions", &self.keys())
            .finish_non_exhaustive()
    }
}

impl DebugSessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn DebugSubscriber>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Returns the session bound to `key`, creating one in `INIT` when
    /// absent. `bind` runs only on creation, under the registry lock, and
    /// must not call back into the registry.
    pub fn get_or_create<F>(&self, key: impl Into<SessionKey>, bind: F) -> Arc<DebugSession>
    where
        F: FnOnce() -> SessionBindings,
    {
        let key = key.into();
        let mut sessions = self.lock_sessions();
        if let Some(existing) = sessions.get(&key) {
            return Arc::clone(existing);
        }

        let session = Arc::new(DebugSession::with_registry(
            key.clone(),
            bind(),
            Some(Arc::downgrade(&self.sessions)),
        ));
        for subscriber in self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            session.subscribe(Arc::clone(subscriber));
        }
        sessions.insert(key.clone(), Arc::clone(&session));
        debug!(target: "pldbg", session = %key, live = sessions.len(), "session_created");
        session
    }

    pub fn get(&self, key: &SessionKey) -> Result<Arc<DebugSession>, DebugError> {
        self.lock_sessions()
            .get(key)
            .cloned()
            .ok_or_else(|| DebugError::SessionNotFound(key.clone()))
    }

    pub fn remove(&self, key: &SessionKey) -> Option<Arc<DebugSession>> {
        let removed = self.lock_sessions().remove(key);
        if removed.is_some() {
            debug!(target: "pldbg", session = %key, "session_removed");
        }
        removed
    }

    pub async fn close_surface(&self, key: &SessionKey) -> Result<(), DebugError> {
        let Some(session) = self.lock_sessions().get(key).cloned() else {
            return Ok(());
        };

        let result = session.exit().await.map(|_| ());
        if let Err(error) = &result {
            warn!(target: "pldbg", session = %key, error = %error, "close_surface_exit_failed");
        }

        let mut sessions = self.lock_sessions();
        if sessions
            .get(key)
            .is_some_and(|registered| Arc::ptr_eq(registered, &session))
        {
            sessions.remove(key);
        }
        result
    }

    #[must_use]
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.lock_sessions().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_sessions().is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self.lock_sessions().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Arc<DebugSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::DebugSessionRegistry;
    use crate::error::DebugError;
    use crate::session::tests::{bindings_for, RecordingSubscriber, BLOCK};
    use crate::session::SessionKey;
    use crate::status::{DebugLocation, DebugStatus};
    use crate::target::PlSchema;

    #[test]
    fn get_or_create_binds_once_per_key() {
        let registry = DebugSessionRegistry::new();
        let binds = AtomicUsize::new(0);
        let bind = || {
            binds.fetch_add(1, Ordering::Relaxed);
            bindings_for(PlSchema::anonymous(BLOCK)).0
        };

        let first = registry.get_or_create("page-1", bind);
        let second = registry.get_or_create("page-1", || {
            binds.fetch_add(1, Ordering::Relaxed);
            bindings_for(PlSchema::anonymous(BLOCK)).0
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(binds.load(Ordering::Relaxed), 1);
        assert_eq!(first.status(), DebugStatus::Init);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_key_is_session_not_found() {
        let registry = DebugSessionRegistry::new();
        let err = registry
            .get(&SessionKey::from("nowhere"))
            .expect_err("no session registered");
        assert!(matches!(err, DebugError::SessionNotFound(key) if key.as_str() == "nowhere"));
    }

    #[tokio::test]
    async fn exit_detaches_session_from_registry() {
        let registry = DebugSessionRegistry::new();
        let (bindings, gateway, _surface, _parser) = bindings_for(PlSchema::anonymous(BLOCK));
        gateway.paused_at(2);
        let session = registry.get_or_create("page-1", || bindings);

        session.start().await.expect("start");
        session.exit().await.expect("exit");

        assert!(registry.is_empty());
        assert!(registry.get(&SessionKey::from("page-1")).is_err());

        let fresh = registry.get_or_create("page-1", || bindings_for(PlSchema::anonymous(BLOCK)).0);
        assert!(!Arc::ptr_eq(&fresh, &session));
        assert_eq!(fresh.status(), DebugStatus::Init);
    }

    #[tokio::test]
    async fn superseded_session_does_not_detach_its_replacement() {
        let registry = DebugSessionRegistry::new();
        let key = SessionKey::from("page-1");
        let old =
            registry.get_or_create(key.clone(), || bindings_for(PlSchema::anonymous(BLOCK)).0);
        registry.remove(&key).expect("removed");
        let replacement =
            registry.get_or_create(key.clone(), || bindings_for(PlSchema::anonymous(BLOCK)).0);

        old.exit().await.expect("exit old");

        let registered = registry.get(&key).expect("replacement still registered");
        assert!(Arc::ptr_eq(&registered, &replacement));
    }

    #[tokio::test]
    async fn close_surface_ends_live_run_and_removes_session() {
        let registry = DebugSessionRegistry::new();
        let (bindings, gateway, _surface, _parser) = bindings_for(PlSchema::anonymous(BLOCK));
        gateway.paused_at(3);
        let session = registry.get_or_create("page-1", || bindings);
        session.start().await.expect("start");

        registry
            .close_surface(&SessionKey::from("page-1"))
            .await
            .expect("close surface");

        assert_eq!(gateway.exit_calls.load(Ordering::Relaxed), 1);
        assert_eq!(session.status(), DebugStatus::Terminated);
        assert!(registry.is_empty());
        registry
            .close_surface(&SessionKey::from("page-1"))
            .await
            .expect("closing an unknown surface is a no-op");
    }

    #[tokio::test]
    async fn registry_subscribers_follow_every_session_independently() {
        let registry = DebugSessionRegistry::new();
        let events = Arc::new(RecordingSubscriber::default());
        registry.subscribe(Arc::clone(&events) as _);

        let (first_bindings, first_gateway, _, _) = bindings_for(PlSchema::anonymous(BLOCK));
        let (second_bindings, _, _, _) = bindings_for(PlSchema::anonymous(BLOCK));
        first_gateway.paused_at(2);
        let first = registry.get_or_create("page-1", || first_bindings);
        let second = registry.get_or_create("page-2", || second_bindings);

        first.start().await.expect("start first");

        assert_eq!(first.status(), DebugStatus::Paused);
        assert_eq!(first.current_location(), Some(DebugLocation::at_line(2)));
        assert_eq!(second.status(), DebugStatus::Init);
        assert_eq!(second.current_location(), None);
        assert_eq!(
            events.statuses(),
            vec![DebugStatus::Starting, DebugStatus::Paused]
        );
        assert_eq!(
            registry.keys(),
            vec![SessionKey::from("page-1"), SessionKey::from("page-2")]
        );
    }

    #[tokio::test]
    async fn exiting_one_session_leaves_the_other_paused() {
        let registry = DebugSessionRegistry::new();
        let (first_bindings, first_gateway, _, _) = bindings_for(PlSchema::anonymous(BLOCK));
        let (second_bindings, second_gateway, _, _) = bindings_for(PlSchema::anonymous(BLOCK));
        first_gateway.paused_at(2);
        second_gateway.paused_at(3);
        let first = registry.get_or_create("page-1", || first_bindings);
        let second = registry.get_or_create("page-2", || second_bindings);
        first.add_breakpoint(2);
        second.add_breakpoint(3);

        first.start().await.expect("start first");
        second.start().await.expect("start second");
        assert_eq!(first.status(), DebugStatus::Paused);
        assert_eq!(second.status(), DebugStatus::Paused);

        first.exit().await.expect("exit first");

        assert_eq!(first.status(), DebugStatus::Terminated);
        assert!(first.breakpoints().is_empty());
        assert_eq!(second.status(), DebugStatus::Paused);
        assert_eq!(second.current_location(), Some(DebugLocation::at_line(3)));
        assert_eq!(second.breakpoints().list(), vec![3]);
        assert_eq!(registry.keys(), vec![SessionKey::from("page-2")]);
        assert_eq!(second_gateway.exit_calls.load(Ordering::Relaxed), 0);
    }
}
