//! Long-term memory: an append-only Sled log behind `/memory store` and `/memory recall`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::{ChatModule, CommandContext, CommandError};

const MAX_RECALL: usize = 10;
const MIN_TERM_LEN: usize = 3;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("memory storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("memory serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("nothing to remember")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub date_stored: String,
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Deserialize)]
struct StoreBody {
    memory: String,
    #[serde(default)]
    context: Option<String>,
}

pub struct MemoryModule {
    db: sled::Db,
}

impl MemoryModule {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, MemoryError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Append a memory. `body` is `{"memory": ..., "context": ...}` or free text.
    pub fn store(&self, body: &str) -> Result<MemoryRecord, MemoryError> {
        let (memory, context) = match serde_json::from_str::<StoreBody>(body.trim()) {
            Ok(parsed) => (parsed.memory, parsed.context),
            Err(_) => (unwrap_braces(body).to_string(), None),
        };
        let memory = memory.trim().to_string();
        if memory.is_empty() {
            return Err(MemoryError::Empty);
        }
        let record = MemoryRecord {
            date_stored: chrono::Utc::now().to_rfc3339(),
            memory,
            context: context.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        };
        let key = self.db.generate_id()?.to_be_bytes();
        self.db.insert(key, serde_json::to_vec(&record)?)?;
        self.db.flush()?;
        tracing::info!(len = record.memory.len(), "memory stored");
        Ok(record)
    }

    /// Best matches for `query` by shared words, newest first among equals.
    pub fn recall(&self, query: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let terms = terms(unwrap_braces(query));
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored = Vec::new();
        for (seq, entry) in self.db.iter().enumerate() {
            let (_, value) = entry?;
            let record: MemoryRecord = serde_json::from_slice(&value)?;
            let mut haystack = terms_of(&record.memory);
            if let Some(ctx) = &record.context {
                haystack.extend(terms_of(ctx));
            }
            let score = terms.iter().filter(|t| haystack.contains(*t)).count();
            if score > 0 {
                scored.push((score, seq, record));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(scored.into_iter().take(MAX_RECALL).map(|(_, _, r)| r).collect())
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

impl ChatModule for MemoryModule {
    fn id(&self) -> &str {
        "memory"
    }

    fn prompt(&self) -> &str {
        MEMORY_PROMPT
    }

    fn execute(&self, _ctx: &CommandContext<'_>, args: &str, body: &str) -> Result<String, CommandError> {
        match args.trim() {
            "store" => {
                self.store(body)?;
                Ok("Memory stored.".to_string())
            }
            "recall" => {
                let found = self.recall(body)?;
                if found.is_empty() {
                    return Ok("No memories found.".to_string());
                }
                serde_json::to_string_pretty(&found).map_err(|e| CommandError::Memory(e.into()))
            }
            other => Err(CommandError::NotImplemented(format!("/memory {}", other))),
        }
    }
}

fn unwrap_braces(text: &str) -> &str {
    let t = text.trim();
    t.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(t)
        .trim()
}

fn terms_of(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn terms(text: &str) -> Vec<String> {
    let mut v: Vec<String> = terms_of(text).into_iter().collect();
    v.sort();
    v
}

const MEMORY_PROMPT: &str = r#"Long-term memory. Store a fact with useful context:

/memory store {
    "memory": "I bought cookies yesterday",
    "context": "The user was discussing what they'd eaten"
}

Recall by describing related concepts:

/memory recall {
    When did I buy cookies?
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleRegistry;

    fn open() -> (tempfile::TempDir, MemoryModule) {
        let dir = tempfile::tempdir().unwrap();
        let module = MemoryModule::open_path(dir.path().join("memory")).unwrap();
        (dir, module)
    }

    #[test]
    fn stores_json_and_free_text() {
        let (_dir, mem) = open();
        let rec = mem
            .store(r#"{"memory": "I bought cookies yesterday", "context": "snacks"}"#)
            .unwrap();
        assert_eq!(rec.memory, "I bought cookies yesterday");
        assert_eq!(rec.context.as_deref(), Some("snacks"));

        let rec = mem.store("{ The dog is called Rex }").unwrap();
        assert_eq!(rec.memory, "The dog is called Rex");
        assert!(rec.context.is_none());
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn empty_memory_is_rejected() {
        let (_dir, mem) = open();
        assert!(matches!(mem.store("{   }"), Err(MemoryError::Empty)));
        assert!(mem.is_empty());
    }

    #[test]
    fn recall_ranks_by_overlap_then_recency() {
        let (_dir, mem) = open();
        mem.store("{ bought cookies at the market }").unwrap();
        mem.store("{ the market was closed }").unwrap();
        mem.store("{ unrelated note about rust }").unwrap();

        let found = mem.recall("{ When did I buy cookies at the market? }").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].memory, "bought cookies at the market");
        assert_eq!(found[1].memory, "the market was closed");

        assert!(mem.recall("{ a }").unwrap().is_empty());
    }

    #[test]
    fn command_surface() {
        let (_dir, mem) = open();
        let registry = ModuleRegistry::new();
        let ctx = CommandContext { registry: &registry };
        assert_eq!(mem.execute(&ctx, "store", "{ cats purr }").unwrap(), "Memory stored.");
        assert!(mem.execute(&ctx, "recall", "{ cats }").unwrap().contains("cats purr"));
        assert_eq!(mem.execute(&ctx, "recall", "{ dogs }").unwrap(), "No memories found.");
        assert!(matches!(mem.execute(&ctx, "forget", ""), Err(CommandError::NotImplemented(_))));
    }
}
