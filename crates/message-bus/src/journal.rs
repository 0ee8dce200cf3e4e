//! Journal extension point for durable delivery.
//!
//! The bus records every published message in its journal (if one is
//! configured) before fanning it out. A real deployment would back this with
//! an external log; the in-memory journal is an audit trail for tests and
//! diagnostics.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::Serialize;

use crate::envelope::Message;
use crate::error::{BusError, Result};

/// Sink the bus delegates durable recording to.
pub trait MessageJournal<M>: Send + Sync {
    /// Records a message published on `topic`.
    fn append(&self, topic: &str, message: &M) -> Result<()>;
}

/// One recorded publication.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry<M> {
    /// Position in the journal, starting at 1.
    pub sequence: u64,
    /// Topic the message was published on.
    pub topic: String,
    /// When the publication was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The published message.
    pub message: M,
}

/// In-memory journal.
#[derive(Clone)]
pub struct InMemoryJournal<M> {
    entries: Arc<RwLock<Vec<JournalEntry<M>>>>,
}

impl<M> Default for InMemoryJournal<M> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<M: Message> InMemoryJournal<M> {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all entries in publication order.
    pub fn entries(&self) -> Vec<JournalEntry<M>> {
        self.read().clone()
    }

    /// Returns the entries belonging to one workflow, in publication order.
    pub fn for_correlation(&self, correlation_id: CorrelationId) -> Vec<JournalEntry<M>> {
        self.read()
            .iter()
            .filter(|e| e.message.correlation_id() == correlation_id)
            .cloned()
            .collect()
    }

    /// Counts entries whose message has the given kind.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.read()
            .iter()
            .filter(|e| e.message.kind() == kind)
            .count()
    }

    /// Returns the number of recorded publications.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Serializes the journal as JSON lines, one entry per line.
    pub fn export_json_lines(&self) -> Result<String>
    where
        M: Serialize,
    {
        let mut out = String::new();
        for entry in self.read().iter() {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<JournalEntry<M>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl<M: Message> MessageJournal<M> for InMemoryJournal<M> {
    fn append(&self, topic: &str, message: &M) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BusError::Journal("journal lock poisoned".to_string()))?;
        let sequence = entries.len() as u64 + 1;
        entries.push(JournalEntry {
            sequence,
            topic: topic.to_string(),
            recorded_at: Utc::now(),
            message: message.clone(),
        });
        Ok(())
    }
}
