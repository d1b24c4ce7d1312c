//! Session store.
//!
//! Tracks one entry per session key in `sessions.json` and the ordered
//! message transcript per session in `sessions/<session_id>.jsonl`.
//! Transcripts are append-only; messages are provider-agnostic
//! [`ChatMessage`]s including tool_use/tool_result blocks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use valet_domain::chat::ChatMessage;
use valet_domain::error::{Error, Result};
use valet_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single tracked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_key: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub summarized: bool,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    state_dir: Option<PathBuf>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    /// session_id → ordered transcript. Persistent stores lazily hydrate
    /// this cache from the JSONL files.
    transcripts: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let index_path = dir.join("sessions.json");
        let sessions: HashMap<String, SessionEntry> = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(sessions = sessions.len(), "session store loaded");

        Ok(Self {
            state_dir: Some(dir),
            sessions: RwLock::new(sessions),
            transcripts: RwLock::new(HashMap::new()),
        })
    }

    /// In-memory store for tests.
    pub fn ephemeral() -> Self {
        Self {
            state_dir: None,
            sessions: RwLock::new(HashMap::new()),
            transcripts: RwLock::new(HashMap::new()),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Resolve or create a session for the given key. Returns `(entry, is_new)`.
    pub fn resolve_or_create(
        &self,
        session_key: &str,
        user_id: &str,
        channel: &str,
    ) -> (SessionEntry, bool) {
        {
            let sessions = self.sessions.read();
            if let Some(entry) = sessions.get(session_key) {
                return (entry.clone(), false);
            }
        }

        let now = Utc::now();
        let session_id = uuid::Uuid::new_v4().to_string();
        let entry = SessionEntry {
            session_key: session_key.to_owned(),
            session_id: session_id.clone(),
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            created_at: now,
            updated_at: now,
            label: None,
            summarized: false,
            input_tokens: 0,
            output_tokens: 0,
        };

        self.sessions
            .write()
            .insert(session_key.to_owned(), entry.clone());

        TraceEvent::SessionResolved {
            session_key: session_key.to_owned(),
            session_id,
            is_new: true,
        }
        .emit();

        (entry, true)
    }

    pub fn get(&self, session_key: &str) -> Option<SessionEntry> {
        self.sessions.read().get(session_key).cloned()
    }

    pub fn get_by_id(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions
            .read()
            .values()
            .find(|e| e.session_id == session_id)
            .cloned()
    }

    /// Delete a session and its transcript. Returns true when it existed.
    pub fn delete(&self, session_key: &str) -> bool {
        let removed = self.sessions.write().remove(session_key);
        if let Some(entry) = &removed {
            self.transcripts.write().remove(&entry.session_id);
            if let Some(dir) = &self.state_dir {
                let _ = std::fs::remove_file(dir.join(format!("{}.jsonl", entry.session_id)));
            }
        }
        removed.is_some()
    }

    pub fn set_label(&self, session_key: &str, label: impl Into<String>) {
        if let Some(entry) = self.sessions.write().get_mut(session_key) {
            entry.label = Some(label.into());
        }
    }

    pub fn list(&self) -> Vec<SessionEntry> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn record_usage(&self, session_key: &str, input_tokens: u64, output_tokens: u64) {
        if let Some(entry) = self.sessions.write().get_mut(session_key) {
            entry.input_tokens += input_tokens;
            entry.output_tokens += output_tokens;
            entry.updated_at = Utc::now();
        }
    }

    pub fn mark_summarized(&self, session_key: &str) {
        if let Some(entry) = self.sessions.write().get_mut(session_key) {
            entry.summarized = true;
        }
    }

    /// Sessions idle for longer than `idle` that have not been summarized.
    pub fn stale_unsummarized(&self, idle: Duration) -> Vec<SessionEntry> {
        let cutoff = Utc::now() - idle;
        self.sessions
            .read()
            .values()
            .filter(|e| !e.summarized && e.updated_at < cutoff)
            .cloned()
            .collect()
    }

    // ── Transcripts ────────────────────────────────────────────────

    /// Append one message to the session transcript.
    pub fn append_message(&self, session_id: &str, message: &ChatMessage) -> Result<()> {
        {
            let mut cache = self.transcripts.write();
            let transcript = match cache.get_mut(session_id) {
                Some(t) => t,
                None => {
                    let loaded = self.load_transcript(session_id)?;
                    cache.entry(session_id.to_owned()).or_insert(loaded)
                }
            };
            transcript.push(message.clone());
        }

        if let Some(dir) = &self.state_dir {
            let path = dir.join(format!("{session_id}.jsonl"));
            let json = serde_json::to_string(message)?;
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(Error::Io)?;
            writeln!(f, "{}", json).map_err(Error::Io)?;
        }

        if let Some(entry) = self
            .sessions
            .write()
            .values_mut()
            .find(|e| e.session_id == session_id)
        {
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Ordered transcript for a session.
    pub fn messages(&self, session_id: &str) -> Vec<ChatMessage> {
        {
            let cache = self.transcripts.read();
            if let Some(t) = cache.get(session_id) {
                return t.clone();
            }
        }
        let loaded = self.load_transcript(session_id).unwrap_or_default();
        self.transcripts
            .write()
            .insert(session_id.to_owned(), loaded.clone());
        loaded
    }

    fn load_transcript(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let Some(dir) = &self.state_dir else {
            return Ok(Vec::new());
        };
        let path = dir.join(format!("{session_id}.jsonl"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut out = Vec::new();
        for line in raw.lines() {
            match serde_json::from_str::<ChatMessage>(line) {
                Ok(m) => out.push(m),
                Err(e) => tracing::warn!(session_id, error = %e, "skipping bad transcript line"),
            }
        }
        Ok(out)
    }

    /// Persist the session index to disk.
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)
            .map_err(|e| Error::Storage(format!("serializing sessions: {e}")))?;
        std::fs::write(dir.join("sessions.json"), json).map_err(Error::Io)?;
        Ok(())
    }
}
