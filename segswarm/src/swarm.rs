use std::collections::HashMap;
use crate::{segments::Segments, Rank, NEW_PROVIDER_SENTINEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {

    // Holds every segment of the file.
    Seed,

    // Holds a contiguous prefix of the file.
    Peer,

    // Requesting, holds nothing yet. Never assigned by the tracker.
    Leecher,

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashRange {

    pub start: usize,

    // Highest contiguous segment index confirmed held.
    pub last: usize,

}

// One participant's relationship to one file's swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRecord {

    pub id: Rank,

    pub role: Role,

    pub interval: HashRange,

}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwarmState {

    pub segments_no: usize,

    // Authoritative ordered hash list of the file.
    pub segments: Segments,

    pub providers: Vec<ProviderRecord>,

}

impl SwarmState {

    fn new(segments: Segments, holder: Rank) -> Self {
        let segments_no = segments.len();
        Self {
            segments_no,
            segments,
            providers: vec![ProviderRecord {
                id: holder,
                role: Role::Seed,
                interval: HashRange { start: 0, last: segments_no },
            }],
        }
    }

    pub fn provider(&self, id: Rank) -> Option<&ProviderRecord> {
        self.providers.iter().find(|p| p.id == id)
    }

    fn provider_mut(&mut self, id: Rank) -> Option<&mut ProviderRecord> {
        self.providers.iter_mut().find(|p| p.id == id)
    }
}

// Tracker side store of every swarm, keyed by file name.
// Only the tracker task touches it, so it needs no locking.
#[derive(Debug, Default)]
pub struct SwarmDirectory {

    swarms: HashMap<String, SwarmState>,

    // Active leecher count per file, only ever decremented after registration.
    leechers: HashMap<String, i64>,

}

impl SwarmDirectory {

    pub fn new() -> Self {
        Self::default()
    }

    // A second registration of the same name replaces the first one entirely.
    pub fn register_holder(&mut self, file: &str, manifest: Segments, id: Rank) {
        if self.swarms.contains_key(file) {
            tracing::warn!("{} re-registered by {}, replacing previous swarm", file, id);
        }
        self.swarms.insert(file.to_owned(), SwarmState::new(manifest, id));
        self.leechers.insert(file.to_owned(), 0);
    }

    pub fn snapshot(&self, file: &str) -> Option<SwarmState> {
        self.swarms.get(file).cloned()
    }

    pub fn apply_progress(&mut self, file: &str, id: Rank, last: usize) {
        let Some(swarm) = self.swarms.get_mut(file) else {
            tracing::debug!("progress for unknown file {} from {}", file, id);
            return;
        };

        // At most one record per participant. A seed re-fetching its own file keeps its full range.
        if last == NEW_PROVIDER_SENTINEL {
            if swarm.provider(id).is_none() {
                swarm.providers.push(ProviderRecord {
                    id,
                    role: Role::Peer,
                    interval: HashRange { start: NEW_PROVIDER_SENTINEL, last: 0 },
                });
            }
        } else if last > NEW_PROVIDER_SENTINEL && last < swarm.segments_no {
            if let Some(provider) = swarm.provider_mut(id).filter(|p| p.role != Role::Seed) {
                provider.interval.last = last;
            }
        } else if last == swarm.segments_no {
            if let Some(count) = self.leechers.get_mut(file) {
                *count -= 1;
            }
            if let Some(provider) = swarm.provider_mut(id) {
                provider.interval.last = last;
                provider.role = Role::Seed;
            }
        }

        tracing::debug!("{} from {}: last segment {} of {}", file, id, last, swarm.segments_no);
        for provider in swarm.providers.iter() {
            tracing::trace!(
                "provider {} {:?} last segment {}",
                provider.id, provider.role, provider.interval.last,
            );
        }
    }

    pub fn leechers(&self, file: &str) -> Option<i64> {
        self.leechers.get(file).copied()
    }

    pub fn len(&self) -> usize {
        self.swarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swarms.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &SwarmState)> {
        self.swarms.iter().map(|(name, swarm)| (name.as_str(), swarm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::test_hash;

    fn manifest(n: usize) -> Segments {
        (0..n).map(test_hash).collect()
    }

    #[test]
    fn test_register_holder() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(15), 1);

        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.segments_no, 15);
        assert_eq!(swarm.segments_no, swarm.segments.len());
        assert_eq!(swarm.providers.len(), 1);
        assert_eq!(swarm.providers[0], ProviderRecord {
            id: 1,
            role: Role::Seed,
            interval: HashRange { start: 0, last: 15 },
        });
        assert_eq!(dir.leechers("a.txt"), Some(0));
    }

    #[test]
    fn test_register_overwrites() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(15), 1);
        dir.apply_progress("a.txt", 3, 15);
        assert_eq!(dir.leechers("a.txt"), Some(-1));

        dir.register_holder("a.txt", manifest(20), 2);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.segments_no, 20);
        assert_eq!(swarm.providers.len(), 1);
        assert_eq!(swarm.providers[0].id, 2);
        assert_eq!(dir.leechers("a.txt"), Some(0));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_snapshot_unknown() {
        let dir = SwarmDirectory::new();
        assert!(dir.snapshot("missing").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_progress_updates_in_place() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(35), 1);

        dir.apply_progress("a.txt", 2, 10);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.provider(2), Some(&ProviderRecord {
            id: 2,
            role: Role::Peer,
            interval: HashRange { start: 10, last: 0 },
        }));

        dir.apply_progress("a.txt", 2, 20);
        dir.apply_progress("a.txt", 2, 30);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.providers.len(), 2);
        assert_eq!(swarm.provider(2).unwrap().interval.last, 30);
        assert_eq!(swarm.provider(2).unwrap().role, Role::Peer);
        assert_eq!(dir.leechers("a.txt"), Some(0));
    }

    #[test]
    fn test_progress_complete_promotes_seed() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(15), 1);
        dir.apply_progress("a.txt", 2, 10);
        dir.apply_progress("a.txt", 2, 15);

        let swarm = dir.snapshot("a.txt").unwrap();
        let provider = swarm.provider(2).unwrap();
        assert_eq!(provider.role, Role::Seed);
        assert_eq!(provider.interval.last, 15);
        assert_eq!(swarm.providers.iter().filter(|p| p.id == 2).count(), 1);
        assert_eq!(dir.leechers("a.txt"), Some(-1));
    }

    #[test]
    fn test_progress_without_provider_dropped() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(35), 1);

        // Mid-file update for a participant never added.
        dir.apply_progress("a.txt", 4, 20);
        assert!(dir.snapshot("a.txt").unwrap().provider(4).is_none());

        // Completion still counts against the leechers but creates no record.
        dir.apply_progress("a.txt", 4, 35);
        assert!(dir.snapshot("a.txt").unwrap().provider(4).is_none());
        assert_eq!(dir.leechers("a.txt"), Some(-1));

        // Unchanged cursor from a stalled cycle is a no-op.
        dir.apply_progress("a.txt", 4, 0);
        assert_eq!(dir.snapshot("a.txt").unwrap().providers.len(), 1);
        dir.apply_progress("missing", 4, 10);
        assert!(dir.snapshot("missing").is_none());
    }

    #[test]
    fn test_progress_sentinel_repeated() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(25), 1);

        dir.apply_progress("a.txt", 2, 10);
        dir.apply_progress("a.txt", 2, 10);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.providers.len(), 2);
        assert_eq!(swarm.providers.iter().filter(|p| p.id == 2).count(), 1);
    }

    // A holder that also downloads its own file reports the usual cursors.
    #[test]
    fn test_progress_keeps_seed_range() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("a.txt", manifest(25), 1);

        dir.apply_progress("a.txt", 1, 10);
        dir.apply_progress("a.txt", 1, 20);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.providers, vec![ProviderRecord {
            id: 1,
            role: Role::Seed,
            interval: HashRange { start: 0, last: 25 },
        }]);

        dir.apply_progress("a.txt", 1, 25);
        let swarm = dir.snapshot("a.txt").unwrap();
        assert_eq!(swarm.providers.len(), 1);
        assert_eq!(swarm.providers[0].interval.last, 25);
        assert_eq!(dir.leechers("a.txt"), Some(-1));
    }

    #[test]
    fn test_progress_sentinel_on_ten_segment_file() {
        let mut dir = SwarmDirectory::new();
        dir.register_holder("ten", manifest(10), 1);

        // The sentinel check wins over completion.
        dir.apply_progress("ten", 2, 10);
        let swarm = dir.snapshot("ten").unwrap();
        assert_eq!(swarm.provider(2).unwrap().role, Role::Peer);
        assert_eq!(dir.leechers("ten"), Some(0));
    }
}
