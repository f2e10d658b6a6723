use super::traits::SessionStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// max pending sign-ins before we start evicting old ones
const MAX_PENDING_FLOWS: usize = 1000;

/// how long a sign-in may sit between redirect and callback
const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(600);

/// Everything needed to finish an authorization code flow once the browser comes back.
#[derive(Clone, Debug)]
pub struct PendingFlow {
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub code_verifier: String,
    pub nonce: String,
    pub created_at: Instant,
}

/// In-memory session store (doesn't persist across restarts)
#[derive(Clone)]
pub struct MemorySessionStore {
    pending: Arc<RwLock<HashMap<String, PendingFlow>>>,
    /// track insertion order for eviction
    insertion_order: Arc<RwLock<VecDeque<String>>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_FLOW_TTL, MAX_PENDING_FLOWS)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            pending: Arc::default(),
            insertion_order: Arc::default(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// boot out anything older than the ttl
    pub async fn cleanup_expired(&self) {
        let mut pending = self.pending.write().await;
        let mut order = self.insertion_order.write().await;
        let ttl = self.ttl;

        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, flow)| flow.created_at.elapsed() >= ttl)
            .map(|(state, _)| state.clone())
            .collect();

        for state in &expired {
            pending.remove(state);
        }
        order.retain(|state| !expired.contains(state));

        if !expired.is_empty() {
            tracing::debug!("cleaned up {} expired sign-in sessions", expired.len());
        }
    }

    /// current count of pending sign-ins (for monitoring)
    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, state: String, flow: PendingFlow) {
        self.cleanup_expired().await;

        let mut pending = self.pending.write().await;
        let mut order = self.insertion_order.write().await;

        while pending.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                pending.remove(&oldest);
                tracing::debug!("evicted oldest sign-in session due to capacity limit");
            } else {
                break;
            }
        }

        if pending.insert(state.clone(), flow).is_some() {
            order.retain(|s| s != &state);
        }
        order.push_back(state);
    }

    async fn take(&self, state: &str) -> Option<PendingFlow> {
        let mut pending = self.pending.write().await;
        let mut order = self.insertion_order.write().await;

        order.retain(|s| s != state);

        let flow = pending.remove(state)?;
        if flow.created_at.elapsed() >= self.ttl {
            tracing::debug!("sign-in session expired before callback");
            return None;
        }
        Some(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> PendingFlow {
        PendingFlow {
            redirect_url: "http://localhost:8000/callback".into(),
            scopes: vec!["User.Read".into()],
            code_verifier: "verifier".into(),
            nonce: "nonce".into(),
            created_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemorySessionStore::new();
        store.insert("xyz123".into(), flow()).await;

        assert!(store.take("xyz123").await.is_some());
        assert!(store.take("xyz123").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_state() {
        let store = MemorySessionStore::new();
        store.insert("xyz123".into(), flow()).await;
        assert!(store.take("abc").await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = MemorySessionStore::with_limits(DEFAULT_FLOW_TTL, 2);
        store.insert("one".into(), flow()).await;
        store.insert("two".into(), flow()).await;
        store.insert("three".into(), flow()).await;

        assert_eq!(store.len().await, 2);
        assert!(store.take("one").await.is_none());
        assert!(store.take("two").await.is_some());
        assert!(store.take("three").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_flow_is_dropped() {
        let store = MemorySessionStore::with_limits(Duration::ZERO, 10);
        store.insert("old".into(), flow()).await;
        assert!(store.take("old").await.is_none());
    }
}
