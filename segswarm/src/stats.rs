use std::collections::HashMap;
use crate::Rank;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadStats {

    // Files fetched in full, in want-list order.
    pub completed: Vec<String>,

    // Files abandoned because no provider got ahead of the cursor.
    pub stalled: Vec<String>,

    // Files the tracker had no swarm for.
    pub unknown: Vec<String>,

    pub segments_fetched: u64,

}

impl DownloadStats {
    // Files that went through the download loop, finished or not.
    pub fn processed(&self) -> usize {
        self.completed.len() + self.stalled.len() + self.unknown.len()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadStats {

    pub segments_served: u64,

    pub served_per_file: HashMap<String, u64>,

}

impl UploadStats {
    pub fn record(&mut self, file: &str) {
        self.segments_served += 1;
        *self.served_per_file.entry(file.to_owned()).or_default() += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReport {

    pub rank: Rank,

    pub downloads: DownloadStats,

    pub uploads: UploadStats,

}

impl PeerReport {
    pub fn is_seed_only(&self) -> bool {
        self.downloads.processed() == 0
    }
}
