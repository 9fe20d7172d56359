//! Tamper-evident ledger of completed and voided sales.
//!
//! Each entry hashes its predecessor's hash together with its own sequence
//! number, kind and canonical sale JSON, so editing any stored entry breaks
//! every hash after it.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{Database, DbError, LedgerEntry, LedgerEntryKind};
use crate::models::Sale;

/// `prev_hash` of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of walking the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Intact {
        entries: usize,
        head: Option<String>,
    },
    Broken {
        seq: i64,
        reason: String,
    },
}

impl Verification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Verification::Intact { .. })
    }
}

/// Compute SHA-256 hash of data.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of one entry, chained on `prev_hash`.
pub fn entry_hash(prev_hash: &str, seq: i64, kind: LedgerEntryKind, payload: &str) -> String {
    let data = format!("{}|{}|{}|{}", prev_hash, seq, kind.as_str(), payload);
    hash_data(data.as_bytes())
}

/// Ledger manager.
pub struct Ledger<'a> {
    db: &'a Database,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append a snapshot of `sale`. Run inside the caller's transaction.
    pub fn append(&self, kind: LedgerEntryKind, sale: &Sale) -> LedgerResult<LedgerEntry> {
        let payload = sale.to_canonical_json()?;
        let (seq, prev_hash) = match self.db.last_ledger_entry()? {
            Some(last) => (last.seq + 1, last.entry_hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let entry = LedgerEntry {
            seq,
            kind,
            sale_id: sale.id.clone(),
            entry_hash: entry_hash(&prev_hash, seq, kind, &payload),
            payload,
            prev_hash,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.db.insert_ledger_entry(&entry)?;

        info!(seq, kind = kind.as_str(), sale_id = %sale.id, "ledger entry appended");
        Ok(entry)
    }

    /// Latest entry, whose hash commits to the whole chain.
    pub fn head(&self) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.db.last_ledger_entry()?)
    }

    /// Recompute every hash and report the first entry that does not fit.
    pub fn verify(&self) -> LedgerResult<Verification> {
        let rows = self.db.list_ledger_entries_by_row()?;
        let count = rows.len();
        let mut expected_prev = GENESIS_HASH.to_string();

        for (index, (seq, decoded)) in rows.into_iter().enumerate() {
            let entry = match decoded {
                Ok(entry) => entry,
                Err(e) => {
                    let reason = format!("undecodable entry: {}", e);
                    warn!(seq, %reason, "ledger verification failed");
                    return Ok(Verification::Broken { seq, reason });
                }
            };
            let expected_seq = index as i64 + 1;
            let broken = if entry.seq != expected_seq {
                Some(format!("expected sequence {}", expected_seq))
            } else if entry.prev_hash != expected_prev {
                Some("previous hash does not match".to_string())
            } else if entry_hash(&entry.prev_hash, entry.seq, entry.kind, &entry.payload)
                != entry.entry_hash
            {
                Some("entry hash does not match contents".to_string())
            } else {
                match serde_json::from_str::<Sale>(&entry.payload) {
                    Ok(sale) if sale.id == entry.sale_id => None,
                    Ok(_) => Some("payload belongs to another sale".to_string()),
                    Err(e) => Some(format!("unreadable payload: {}", e)),
                }
            };

            if let Some(reason) = broken {
                warn!(seq = entry.seq, %reason, "ledger verification failed");
                return Ok(Verification::Broken {
                    seq: entry.seq,
                    reason,
                });
            }
            expected_prev = entry.entry_hash;
        }

        debug!(entries = count, "ledger verified");
        let head = (count > 0).then_some(expected_prev);
        Ok(Verification::Intact {
            entries: count,
            head,
        })
    }
}
