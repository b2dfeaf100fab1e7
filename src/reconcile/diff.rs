//! Pure desired-vs-actual diff over notification keys. Sweeps build the
//! desired rows, fetch the persisted ones, and hand both here; no I/O.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Notification, NotificationKey};

/// What to do with unread rows whose key is no longer desired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    /// Keep the row but flip it read. Used where history should stay visible.
    MarkRead,
    /// Remove the row outright.
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub struct DiffPolicy {
    /// Flip a matching read row back to unread instead of inserting a fresh
    /// one. Overdue reminders want this so a dismissed task resurfaces.
    pub resurrect: bool,
    pub stale: StaleAction,
}

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub create: Vec<Notification>,
    /// Ids of read rows to flip back to unread.
    pub resurrect: Vec<String>,
    /// Ids of unread rows to mark read.
    pub mark_read: Vec<String>,
    /// Ids of unread rows to remove.
    pub delete: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.resurrect.is_empty()
            && self.mark_read.is_empty()
            && self.delete.is_empty()
    }
}

/// Diff `desired` against `actual`, keyed by (user, kind, target).
///
/// A desired key already covered by an unread row is left alone. Read rows
/// only ever block creation when `policy.resurrect` says to reuse them.
/// Unread rows whose key nobody wants any more get the stale treatment; read
/// rows are history and are never touched here.
pub fn reconcile(desired: Vec<Notification>, actual: &[Notification], policy: DiffPolicy) -> ReconcilePlan {
    let desired_keys: BTreeSet<NotificationKey> = desired.iter().filter_map(Notification::key).collect();

    let mut unread_keys: BTreeSet<NotificationKey> = BTreeSet::new();
    let mut read_rows: BTreeMap<NotificationKey, &str> = BTreeMap::new();
    for row in actual {
        let Some(key) = row.key() else { continue };
        if row.is_read {
            read_rows.entry(key).or_insert(row.id.as_str());
        } else {
            unread_keys.insert(key);
        }
    }

    let mut plan = ReconcilePlan::default();
    let mut planned: BTreeSet<NotificationKey> = BTreeSet::new();
    for proto in desired {
        let Some(key) = proto.key() else { continue };
        if unread_keys.contains(&key) || !planned.insert(key.clone()) {
            continue;
        }
        if policy.resurrect {
            if let Some(id) = read_rows.get(&key) {
                plan.resurrect.push((*id).to_string());
                continue;
            }
        }
        plan.create.push(proto);
    }

    for row in actual {
        let Some(key) = row.key() else { continue };
        if row.is_read || desired_keys.contains(&key) {
            continue;
        }
        match policy.stale {
            StaleAction::MarkRead => plan.mark_read.push(row.id.clone()),
            StaleAction::Delete => plan.delete.push(row.id.clone()),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotificationKind;

    fn proto(user: &str, task: &str) -> Notification {
        Notification::for_task(user, NotificationKind::TaskOverdue, "Task overdue", "msg", task)
    }

    fn row(user: &str, task: &str, is_read: bool) -> Notification {
        let mut n = proto(user, task);
        n.is_read = is_read;
        n
    }

    const RESURRECT_MARK_READ: DiffPolicy = DiffPolicy {
        resurrect: true,
        stale: StaleAction::MarkRead,
    };

    const FRESH_DELETE: DiffPolicy = DiffPolicy {
        resurrect: false,
        stale: StaleAction::Delete,
    };

    #[test]
    fn test_missing_key_is_created() {
        let plan = reconcile(vec![proto("u1", "t1")], &[], RESURRECT_MARK_READ);
        assert_eq!(plan.create.len(), 1);
        assert!(plan.resurrect.is_empty());
        assert!(plan.mark_read.is_empty());
    }

    #[test]
    fn test_unread_match_is_left_alone() {
        let plan = reconcile(vec![proto("u1", "t1")], &[row("u1", "t1", false)], RESURRECT_MARK_READ);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_read_match_is_resurrected_when_policy_says_so() {
        let existing = row("u1", "t1", true);
        let plan = reconcile(vec![proto("u1", "t1")], &[existing.clone()], RESURRECT_MARK_READ);
        assert!(plan.create.is_empty());
        assert_eq!(plan.resurrect, vec![existing.id]);
    }

    #[test]
    fn test_read_match_does_not_block_creation_without_resurrect() {
        let plan = reconcile(vec![proto("u1", "t1")], &[row("u1", "t1", true)], FRESH_DELETE);
        assert_eq!(plan.create.len(), 1);
        assert!(plan.resurrect.is_empty());
    }

    #[test]
    fn test_stale_unread_row_is_marked_read_or_deleted() {
        let stale = row("u1", "t1", false);

        let plan = reconcile(Vec::new(), &[stale.clone()], RESURRECT_MARK_READ);
        assert_eq!(plan.mark_read, vec![stale.id.clone()]);
        assert!(plan.delete.is_empty());

        let plan = reconcile(Vec::new(), &[stale.clone()], FRESH_DELETE);
        assert_eq!(plan.delete, vec![stale.id]);
        assert!(plan.mark_read.is_empty());
    }

    #[test]
    fn test_stale_read_row_is_history_and_untouched() {
        let plan = reconcile(Vec::new(), &[row("u1", "t1", true)], FRESH_DELETE);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_duplicate_desired_keys_create_once() {
        let plan = reconcile(vec![proto("u1", "t1"), proto("u1", "t1")], &[], RESURRECT_MARK_READ);
        assert_eq!(plan.create.len(), 1);
    }

    #[test]
    fn test_second_pass_over_applied_plan_is_empty() {
        let desired = vec![proto("u1", "t1"), proto("u2", "t1")];
        let first = reconcile(desired.clone(), &[], RESURRECT_MARK_READ);
        assert_eq!(first.create.len(), 2);

        // Pretend the plan was applied verbatim.
        let actual = first.create;
        let second = reconcile(desired, &actual, RESURRECT_MARK_READ);
        assert!(second.is_empty());
    }
}
