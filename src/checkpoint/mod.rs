pub mod manager;

pub use manager::{CheckpointError, CheckpointManager, RestoreResult};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Every checkpoint id starts with this
pub const CHECKPOINT_PREFIX: &str = "gitguard-backup-";

/// Checkpoint branches live here, visible to plain `git branch`
pub const BRANCH_NAMESPACE: &str = "refs/heads/";

/// Captured uncommitted state lives outside refs/heads so it never shows up as a branch
pub const SNAPSHOT_NAMESPACE: &str = "refs/gitguard/snapshots/";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A named restore point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    /// Fully qualified ref pointing at `commit`
    pub reference: String,
    pub commit: String,
    /// Branch HEAD was attached to; `None` when detached or unknown
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Present when the working tree was dirty at creation
    pub snapshot: Option<WorkingTreeSnapshot>,
}

/// Uncommitted state captured alongside a checkpoint
///
/// `commit` has HEAD as first parent and the index commit as second parent;
/// its tree is the full working tree, untracked files included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingTreeSnapshot {
    pub reference: String,
    pub commit: String,
    /// Paths that were unmerged at capture; the index commit holds their
    /// working tree content instead of the conflict stages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flattened_conflicts: Vec<String>,
}

impl Checkpoint {
    /// Creation order, with the same-second sequence number breaking ties
    pub fn cmp_creation(&self, other: &Self) -> Ordering {
        let seq = |c: &Checkpoint| parse_id(&c.id).map(|(_, s)| s).unwrap_or(0);
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| seq(self).cmp(&seq(other)))
    }
}

/// `gitguard-backup-<timestamp>` or, for `seq > 0`, `gitguard-backup-<timestamp>-<seq>`
pub fn format_id(at: DateTime<Utc>, seq: u32) -> String {
    let base = format!("{}{}", CHECKPOINT_PREFIX, at.format(TIMESTAMP_FORMAT));
    if seq == 0 { base } else { format!("{}-{}", base, seq) }
}

/// Recover creation time and sequence number from an id
pub fn parse_id(id: &str) -> Option<(DateTime<Utc>, u32)> {
    let rest = id.strip_prefix(CHECKPOINT_PREFIX)?;
    let (stamp, seq) = match rest.split_once('-') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (rest, 0),
    };
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), seq))
}

pub fn branch_ref(id: &str) -> String {
    format!("{}{}", BRANCH_NAMESPACE, id)
}

pub fn snapshot_ref(id: &str) -> String {
    format!("{}{}", SNAPSHOT_NAMESPACE, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_format_id() {
        assert_eq!(format_id(at(), 0), "gitguard-backup-20240309_140507");
        assert_eq!(format_id(at(), 2), "gitguard-backup-20240309_140507-2");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("gitguard-backup-20240309_140507"), Some((at(), 0)));
        assert_eq!(parse_id("gitguard-backup-20240309_140507-12"), Some((at(), 12)));
        assert_eq!(parse_id("gitguard-backup-garbage"), None);
        assert_eq!(parse_id("gitguard-backup-20240309_140507-x"), None);
        assert_eq!(parse_id("feature/login"), None);
    }

    #[test]
    fn test_creation_order_uses_numeric_sequence() {
        let make = |seq| Checkpoint {
            id: format_id(at(), seq),
            reference: branch_ref(&format_id(at(), seq)),
            commit: "abc".to_string(),
            branch: None,
            created_at: at(),
            snapshot: None,
        };

        // Lexically "-10" sorts before "-2"; creation order must not
        assert_eq!(make(10).cmp_creation(&make(2)), Ordering::Greater);
        assert_eq!(make(0).cmp_creation(&make(1)), Ordering::Less);
    }

    #[test]
    fn test_ref_names() {
        assert_eq!(branch_ref("gitguard-backup-x"), "refs/heads/gitguard-backup-x");
        assert_eq!(snapshot_ref("gitguard-backup-x"), "refs/gitguard/snapshots/gitguard-backup-x");
    }
}
