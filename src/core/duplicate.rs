// Exact-duplicate grouping by content hash.
//
// Grouping is a pure function over a snapshot of one user's photos: it
// returns assignments and never mutates its input. Callers write the
// assignments back with `GroupingOutcome::apply`.

use crate::core::photo::PhotoRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateAssignment {
    pub photo_id: String,
    pub is_duplicate: bool,
    /// Representative's id when `is_duplicate`
    pub duplicate_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub representative: String,
    pub duplicates: Vec<String>,
}

impl DuplicateGroup {
    /// Representative plus duplicates
    pub fn member_count(&self) -> usize {
        self.duplicates.len() + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingOutcome {
    /// One entry per input photo, in input order
    pub assignments: Vec<DuplicateAssignment>,
    /// Only groups with more than one member
    pub groups: Vec<DuplicateGroup>,
}

impl GroupingOutcome {
    pub fn duplicates(&self) -> impl Iterator<Item = &DuplicateAssignment> {
        self.assignments.iter().filter(|a| a.is_duplicate)
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates().count()
    }

    /// Write assignments onto matching records and return how many changed
    pub fn apply(&self, photos: &mut [PhotoRecord]) -> usize {
        let by_id: HashMap<&str, &DuplicateAssignment> = self
            .assignments
            .iter()
            .map(|a| (a.photo_id.as_str(), a))
            .collect();

        let mut changed = 0;
        for photo in photos.iter_mut() {
            let Some(assignment) = by_id.get(photo.id.as_str()) else {
                continue;
            };
            let analysis = &mut photo.analysis;
            if analysis.is_duplicate != assignment.is_duplicate
                || analysis.duplicate_group != assignment.duplicate_group
            {
                analysis.is_duplicate = assignment.is_duplicate;
                analysis.duplicate_group = assignment.duplicate_group.clone();
                changed += 1;
            }
        }
        changed
    }
}

/// Groups photos sharing a content hash, keeping the first one in input order
pub struct DuplicateGrouper;

impl DuplicateGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Group a snapshot ordered newest first.
    ///
    /// The first photo of each hash in `photos` is the representative and
    /// every later photo with that hash points at it. Photos with an empty
    /// content hash are never grouped.
    pub fn group(&self, photos: &[PhotoRecord]) -> GroupingOutcome {
        let mut group_index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut assignments = Vec::with_capacity(photos.len());

        for photo in photos {
            let hash = photo.content_hash.as_str();
            if hash.is_empty() {
                assignments.push(DuplicateAssignment {
                    photo_id: photo.id.clone(),
                    is_duplicate: false,
                    duplicate_group: None,
                });
                continue;
            }

            match group_index.get(hash).copied() {
                Some(index) => {
                    let group = &mut groups[index];
                    group.duplicates.push(photo.id.clone());
                    assignments.push(DuplicateAssignment {
                        photo_id: photo.id.clone(),
                        is_duplicate: true,
                        duplicate_group: Some(group.representative.clone()),
                    });
                }
                None => {
                    group_index.insert(hash, groups.len());
                    groups.push(DuplicateGroup {
                        content_hash: hash.to_string(),
                        representative: photo.id.clone(),
                        duplicates: Vec::new(),
                    });
                    assignments.push(DuplicateAssignment {
                        photo_id: photo.id.clone(),
                        is_duplicate: false,
                        duplicate_group: None,
                    });
                }
            }
        }

        groups.retain(|g| !g.duplicates.is_empty());

        GroupingOutcome {
            assignments,
            groups,
        }
    }

    /// Regroup the active photos of one user and write the flags back.
    ///
    /// Active photos are ordered newest first (stable on ties) before
    /// grouping; trashed and deleted photos keep whatever flags they had.
    pub fn regroup_active(&self, photos: &mut [PhotoRecord]) -> GroupingOutcome {
        let mut snapshot: Vec<PhotoRecord> = photos.iter().filter(|p| p.is_active()).cloned().collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let outcome = self.group(&snapshot);
        let changed = outcome.apply(photos);
        log::info!(
            "Grouping found {} duplicate(s) in {} group(s), {} record(s) changed",
            outcome.duplicate_count(),
            outcome.groups.len(),
            changed
        );
        outcome
    }

    /// Group several users' snapshots in parallel; users never share state
    pub fn group_many<K>(&self, snapshots: &[(K, Vec<PhotoRecord>)]) -> Vec<(K, GroupingOutcome)>
    where
        K: Clone + Send + Sync,
    {
        snapshots
            .par_iter()
            .map(|(key, photos)| (key.clone(), self.group(photos)))
            .collect()
    }
}

impl Default for DuplicateGrouper {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialises grouping passes per user; different users run freely
#[derive(Default)]
pub struct GroupingLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GroupingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user.to_string()).or_default().clone()
    }

    /// Run `f` while holding the grouping lock for `user`
    pub fn run_exclusive<T>(&self, user: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(user);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(user, lock);
        result
    }

    /// Number of users with a live lock entry
    pub fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    // Drops the entry once no other caller holds or waits on it
    fn release(&self, user: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn photo(id: &str, hash: &str) -> PhotoRecord {
        let mut record = PhotoRecord::new(format!("{}.jpg", id), 100, hash);
        record.id = id.to_string();
        record
    }

    #[test]
    fn test_newest_is_kept() {
        let photos = vec![photo("a", "h1"), photo("b", "h1"), photo("c", "h1")];
        let outcome = DuplicateGrouper::new().group(&photos);

        assert_eq!(
            outcome.assignments,
            vec![
                DuplicateAssignment {
                    photo_id: "a".to_string(),
                    is_duplicate: false,
                    duplicate_group: None,
                },
                DuplicateAssignment {
                    photo_id: "b".to_string(),
                    is_duplicate: true,
                    duplicate_group: Some("a".to_string()),
                },
                DuplicateAssignment {
                    photo_id: "c".to_string(),
                    is_duplicate: true,
                    duplicate_group: Some("a".to_string()),
                },
            ]
        );
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].representative, "a");
        assert_eq!(outcome.groups[0].member_count(), 3);
    }

    #[test]
    fn test_singletons_untouched() {
        let photos = vec![photo("a", "h1"), photo("b", "h2"), photo("c", "h1"), photo("d", "h3")];
        let outcome = DuplicateGrouper::new().group(&photos);

        let duplicates: Vec<&str> = outcome.duplicates().map(|a| a.photo_id.as_str()).collect();
        assert_eq!(duplicates, vec!["c"]);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].content_hash, "h1");
    }

    #[test]
    fn test_empty_hash_never_groups() {
        let photos = vec![photo("a", ""), photo("b", "")];
        let outcome = DuplicateGrouper::new().group(&photos);
        assert_eq!(outcome.duplicate_count(), 0);
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let mut photos = vec![photo("a", "h1"), photo("b", "h2"), photo("c", "h1"), photo("d", "h2")];
        let grouper = DuplicateGrouper::new();

        let first = grouper.group(&photos);
        assert_eq!(first.apply(&mut photos), 2);
        let after_first = photos.clone();

        let second = grouper.group(&photos);
        assert_eq!(first, second);
        assert_eq!(second.apply(&mut photos), 0);
        assert_eq!(photos, after_first);
    }

    #[test]
    fn test_stale_flags_are_cleared() {
        let mut photos = vec![photo("a", "h1"), photo("b", "h2")];
        photos[1].analysis.is_duplicate = true;
        photos[1].analysis.duplicate_group = Some("gone".to_string());

        let outcome = DuplicateGrouper::new().group(&photos);
        assert_eq!(outcome.apply(&mut photos), 1);
        assert!(!photos[1].analysis.is_duplicate);
        assert_eq!(photos[1].analysis.duplicate_group, None);
    }

    #[test]
    fn test_regroup_active_orders_newest_first() {
        let now = Utc::now();
        let mut oldest = photo("oldest", "h1");
        oldest.created_at = now - Duration::hours(2);
        let mut middle = photo("middle", "h1");
        middle.created_at = now - Duration::hours(1);
        let mut newest = photo("newest", "h1");
        newest.created_at = now;
        let mut trashed = photo("trashed", "h1");
        trashed.created_at = now + Duration::hours(1);
        trashed.move_to_trash().unwrap();

        // Deliberately not in date order
        let mut photos = vec![oldest, trashed, newest, middle];
        let outcome = DuplicateGrouper::new().regroup_active(&mut photos);

        assert_eq!(outcome.groups[0].representative, "newest");
        let by_id = |id: &str| photos.iter().find(|p| p.id == id).unwrap().clone();
        assert!(!by_id("newest").analysis.is_duplicate);
        assert_eq!(by_id("oldest").analysis.duplicate_group.as_deref(), Some("newest"));
        assert_eq!(by_id("middle").analysis.duplicate_group.as_deref(), Some("newest"));
        assert!(!by_id("trashed").analysis.is_duplicate);
    }

    #[test]
    fn test_group_many_users() {
        let snapshots = vec![
            ("alice".to_string(), vec![photo("a1", "h"), photo("a2", "h")]),
            ("bob".to_string(), vec![photo("b1", "h")]),
        ];
        let results = DuplicateGrouper::new().group_many(&snapshots);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "alice");
        assert_eq!(results[0].1.duplicate_count(), 1);
        assert_eq!(results[1].1.duplicate_count(), 0);
    }

    #[test]
    fn test_locks_serialise_same_user() {
        let locks = Arc::new(GroupingLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                std::thread::spawn(move || {
                    locks.run_exclusive("alice", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.run_exclusive("bob", || 42), 42);
        assert_eq!(locks.tracked_users(), 0);
    }

    #[test]
    fn test_idle_locks_are_pruned() {
        let locks = GroupingLocks::new();
        for i in 0..50 {
            locks.run_exclusive(&format!("user{}", i), || ());
        }
        assert_eq!(locks.tracked_users(), 0);

        let seen = locks.run_exclusive("carol", || locks.tracked_users());
        assert_eq!(seen, 1);
        assert_eq!(locks.tracked_users(), 0);
    }
}
