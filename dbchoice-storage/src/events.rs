//! Change notification for single-row store writes.

use async_trait::async_trait;
use dbchoice_core::{ChoiceId, ChoiceRecord, DbChoiceResult, StoreError};
use std::fmt;
use std::sync::{Arc, RwLock};

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A committed single-row write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceChange {
    pub kind: ChangeKind,
    pub group_name: String,
    pub record_id: ChoiceId,
    pub value: String,
}

impl ChoiceChange {
    pub fn new(kind: ChangeKind, record: &ChoiceRecord) -> Self {
        Self {
            kind,
            group_name: record.group_name.clone(),
            record_id: record.id,
            value: record.value.clone(),
        }
    }
}

/// Receives store change notifications.
///
/// Listeners run after the write has committed and cannot fail it.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_change(&self, change: &ChoiceChange);
}

/// Fan-out of change notifications to subscribed listeners.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> DbChoiceResult<()> {
        self.listeners
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(listener);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver `change` to every listener in subscription order.
    pub async fn notify(&self, change: ChoiceChange) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => {
                tracing::warn!(
                    group_name = %change.group_name,
                    "listener registry poisoned, dropping change notification"
                );
                return;
            }
        };

        for listener in listeners {
            listener.on_change(&change).await;
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
