//! Target catalog transport

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::document::{Document, DocumentKind};
use crate::core::events::EventKind;
use crate::core::identity::EntityId;

/// Errors reported by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Target rejected {kind} document: {reason}")]
    Rejected { kind: DocumentKind, reason: String },

    #[error("Target unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Channel a document is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentity {
    pub id: EntityId,
    pub name: String,
}

impl ChannelIdentity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    ImportUpdateCompleted,
    DeleteCompleted,
}

/// Notification sent after a handler finished successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub kind: CompletionKind,
    pub event: EventKind,
    pub resources_included: bool,
}

/// Question asked to the target about association descriptions still present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntityQuery {
    pub link_type: String,
    pub parent_codes: Vec<String>,
    pub target_codes: Vec<String>,
}

/// Delivery of documents to the target catalog
pub trait Transport {
    /// Import one document; the document is either fully accepted or rejected
    fn import(&mut self, channel: &ChannelIdentity, document: &Document) -> Result<(), TransportError>;

    /// Association descriptions currently stored in the target for the query
    fn link_entity_associations(
        &mut self,
        _channel: &ChannelIdentity,
        _query: &LinkEntityQuery,
    ) -> Result<Vec<String>, TransportError> {
        Ok(Vec::new())
    }

    fn notify(&mut self, channel: &ChannelIdentity, completion: &Completion) -> Result<(), TransportError>;
}

/// Keeps every document in memory, optionally rejecting one kind
#[derive(Debug, Default)]
pub struct RecordingTransport {
    documents: Vec<Document>,
    notifications: Vec<Completion>,
    queries: Vec<LinkEntityQuery>,
    associations: Vec<String>,
    reject: Option<DocumentKind>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every document of `kind`
    pub fn rejecting(kind: DocumentKind) -> Self {
        Self {
            reject: Some(kind),
            ..Self::default()
        }
    }

    /// Answer link-entity queries with these descriptions
    pub fn with_associations(mut self, descriptions: &[&str]) -> Self {
        self.associations = descriptions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn of_kind(&self, kind: DocumentKind) -> Vec<&Document> {
        self.documents.iter().filter(|d| d.kind() == kind).collect()
    }

    pub fn kinds(&self) -> Vec<DocumentKind> {
        self.documents.iter().map(Document::kind).collect()
    }

    pub fn notifications(&self) -> &[Completion] {
        &self.notifications
    }

    pub fn queries(&self) -> &[LinkEntityQuery] {
        &self.queries
    }
}

impl Transport for RecordingTransport {
    fn import(&mut self, _channel: &ChannelIdentity, document: &Document) -> Result<(), TransportError> {
        if self.reject == Some(document.kind()) {
            return Err(TransportError::Rejected {
                kind: document.kind(),
                reason: "rejected by recording transport".to_string(),
            });
        }
        self.documents.push(document.clone());
        Ok(())
    }

    fn link_entity_associations(
        &mut self,
        _channel: &ChannelIdentity,
        query: &LinkEntityQuery,
    ) -> Result<Vec<String>, TransportError> {
        self.queries.push(query.clone());
        Ok(self.associations.clone())
    }

    fn notify(&mut self, _channel: &ChannelIdentity, completion: &Completion) -> Result<(), TransportError> {
        self.notifications.push(completion.clone());
        Ok(())
    }
}

/// A document written by the outbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub elements: usize,
    pub summary: String,
}

/// Writes each document as a JSON file into a directory
#[derive(Debug)]
pub struct OutboxTransport {
    dir: PathBuf,
    written: Vec<OutboxEntry>,
    sequence: usize,
}

impl OutboxTransport {
    /// Use `dir` as the outbox, creating it if needed
    pub fn new(dir: &Path) -> Result<Self, TransportError> {
        std::fs::create_dir_all(dir).map_err(|source| TransportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: Vec::new(),
            sequence: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[OutboxEntry] {
        &self.written
    }

    fn next_path(&mut self, label: &str) -> PathBuf {
        self.sequence += 1;
        let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
        self.dir
            .join(format!("{}-{}-{}.json", stamp, self.sequence, label))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json).map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    channel: &'a ChannelIdentity,
    #[serde(flatten)]
    body: &'a T,
}

impl Transport for OutboxTransport {
    fn import(&mut self, channel: &ChannelIdentity, document: &Document) -> Result<(), TransportError> {
        let kind = document.kind();
        let path = self.next_path(kind.as_str());
        self.write_json(&path, &Envelope { channel, body: document })?;
        tracing::debug!(path = %path.display(), kind = %kind, "document written");
        self.written.push(OutboxEntry {
            path,
            kind,
            elements: document.element_count(),
            summary: document.summary(),
        });
        Ok(())
    }

    fn notify(&mut self, channel: &ChannelIdentity, completion: &Completion) -> Result<(), TransportError> {
        let path = self.next_path("completion");
        self.write_json(&path, &Envelope { channel, body: completion })
    }
}
