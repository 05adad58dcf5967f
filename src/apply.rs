//! Human approval of pending suggestions.
//!
//! Approving a suggestion never touches live enforcement configuration. It
//! flips the suggestion's status, appends an immutable entry to the applied
//! log, and hands the operator the actions to merge by hand.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{read_json_list, write_json_atomic, FileLock, PendingStore, StoreError};
use crate::suggestion::Action;

/// Fixed note stored with every applied-log entry.
pub const APPLY_NOTE: &str = "Operator approved stricter safety. Manually tighten the indicated \
thresholds in the live guardian configuration, then record the change in the custody log.";

/// Instruction returned to the operator on approval.
pub const APPLY_INSTRUCTIONS: &str =
    "Tighten the indicated thresholds in the live guardian configuration, then custody-log the change.";

/// Immutable record of one approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedLogEntry {
    /// Approval time in epoch seconds.
    pub applied_at: i64,
    /// Position of the suggestion in the pending store.
    pub pending_index: usize,
    /// Category label.
    pub pattern: String,
    /// Actions the operator is asked to merge.
    pub actions: Vec<Action>,
    /// Operator instructions.
    pub note: String,
}

/// Result of [`apply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    /// Category label.
    pub pattern: String,
    /// Approval time recorded for the suggestion.
    pub applied_at: i64,
    /// Actions to merge into live configuration by hand.
    pub actions_to_merge: Vec<Action>,
    /// What the operator must do next.
    pub instruction_text: String,
    /// False when the suggestion had already been approved.
    pub newly_applied: bool,
}

/// Approve the suggestion at `index`.
///
/// The index is checked against an unlocked read first, so a request past
/// the end creates nothing. Otherwise locks the pending store, then the
/// applied log, and checks the index again under the lock. A pending
/// suggestion is flipped to `applied_pending_manual_merge` and one log entry
/// is appended.
/// Re-approving is a no-op that returns the same actions; if an earlier run
/// stopped between the two writes, the missing log entry is appended then.
///
/// # Errors
///
/// Returns [`StoreError::IndexOutOfRange`] for an empty store or an index
/// past the end, with nothing written, and other [`StoreError`]s on I/O or
/// malformed files.
pub fn apply(
    pending: &PendingStore,
    applied_log: &Path,
    index: usize,
    now: i64,
) -> Result<ApplyOutcome, StoreError> {
    // Out-of-range requests leave no trace, not even a lock file.
    let len = pending.list()?.len();
    if index >= len {
        return Err(StoreError::IndexOutOfRange { index, len });
    }

    let _pending_lock = FileLock::acquire(pending.path())?;
    let mut items = pending.list()?;
    let len = items.len();
    let suggestion = items
        .get_mut(index)
        .ok_or(StoreError::IndexOutOfRange { index, len })?;

    let _log_lock = FileLock::acquire(applied_log)?;
    let mut log: Vec<AppliedLogEntry> = read_json_list(applied_log)?;

    let newly_applied = suggestion.mark_applied(now);
    let applied_at = suggestion.applied_at().unwrap_or(now);
    let pattern = suggestion.pattern().to_owned();
    let actions = suggestion.actions().to_vec();

    if newly_applied {
        write_json_atomic(pending.path(), &items)?;
    }

    let logged = log
        .iter()
        .any(|entry| entry.pending_index == index && entry.applied_at == applied_at);
    if !logged {
        if !newly_applied {
            warn!(index, "approved suggestion had no applied-log entry, appending it");
        }
        log.push(AppliedLogEntry {
            applied_at,
            pending_index: index,
            pattern: pattern.clone(),
            actions: actions.clone(),
            note: APPLY_NOTE.to_owned(),
        });
        write_json_atomic(applied_log, &log)?;
    }

    info!(
        index,
        pattern = %pattern,
        actions = actions.len(),
        newly_applied,
        "suggestion approved for manual merge"
    );

    Ok(ApplyOutcome {
        pattern,
        applied_at,
        actions_to_merge: actions,
        instruction_text: APPLY_INSTRUCTIONS.to_owned(),
        newly_applied,
    })
}

/// Read the applied log in append order.
///
/// # Errors
///
/// Returns [`StoreError`] if the log is unreadable or malformed.
pub fn read_applied_log(path: &Path) -> Result<Vec<AppliedLogEntry>, StoreError> {
    read_json_list(path)
}
