//! Storage for [Presentation] records.
//!
//! The store is the only shared mutable state in the core. Records are
//! owned by the store; callers get snapshots and commit changes back with
//! [PresentationStore::store] or, for state transitions that may race,
//! [PresentationStore::swap].

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::core::identifiers::{RequestId, ResponseCode, TransactionId};
use crate::core::presentation::{Presentation, StateTag};

#[async_trait]
pub trait PresentationStore: Debug {
    /// Upsert by [TransactionId], maintaining the secondary indexes
    /// atomically with the primary record.
    async fn store(&self, presentation: Presentation);

    async fn load_by_transaction_id(&self, id: &TransactionId) -> Option<Presentation>;

    async fn load_by_request_id(&self, id: &RequestId) -> Option<Presentation>;

    /// Replace the record iff its current state tag is `expected`.
    ///
    /// Returns `false` when the record is absent or another caller won the
    /// transition first. This is the primitive that serialises concurrent
    /// handlers touching the same presentation.
    async fn swap(&self, expected: StateTag, new: Presentation) -> bool;

    /// Live records initiated at or before `before`, for the timeout sweep.
    async fn load_stale(&self, before: DateTime<Utc>) -> Vec<Presentation>;
}

/// A local in-memory store. Suitable for a single-process deployment; the
/// trait exists so a distributed deployment can substitute its own.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Maps>>,
}

#[derive(Debug, Default)]
struct Maps {
    presentations: HashMap<TransactionId, Presentation>,
    by_request_id: HashMap<RequestId, TransactionId>,
    by_response_code: HashMap<ResponseCode, TransactionId>,
}

impl Maps {
    fn insert(&mut self, presentation: Presentation) {
        if let Some(request_id) = presentation.request_id() {
            self.by_request_id
                .insert(request_id.clone(), presentation.id().clone());
        }
        if let Presentation::Submitted(submitted) = &presentation {
            if let Some(code) = &submitted.response_code {
                self.by_response_code
                    .insert(code.clone(), presentation.id().clone());
            }
        }
        if let Presentation::Consumed(_) = &presentation {
            let id = presentation.id();
            self.by_response_code.retain(|_, tid| tid != id);
        }
        self.presentations
            .insert(presentation.id().clone(), presentation);
    }
}

#[async_trait]
impl PresentationStore for MemoryStore {
    async fn store(&self, presentation: Presentation) {
        self.inner.lock().await.insert(presentation);
    }

    async fn load_by_transaction_id(&self, id: &TransactionId) -> Option<Presentation> {
        self.inner.lock().await.presentations.get(id).cloned()
    }

    async fn load_by_request_id(&self, id: &RequestId) -> Option<Presentation> {
        let maps = self.inner.lock().await;
        let transaction_id = maps.by_request_id.get(id)?;
        maps.presentations.get(transaction_id).cloned()
    }

    async fn swap(&self, expected: StateTag, new: Presentation) -> bool {
        let mut maps = self.inner.lock().await;
        match maps.presentations.get(new.id()) {
            Some(current) if current.state() == expected => {
                maps.insert(new);
                true
            }
            _ => false,
        }
    }

    async fn load_stale(&self, before: DateTime<Utc>) -> Vec<Presentation> {
        self.inner
            .lock()
            .await
            .presentations
            .values()
            .filter(|p| !p.is_terminal())
            .filter(|p| p.initiated_at().is_some_and(|at| at <= before))
            .cloned()
            .collect()
    }
}
