use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {

    // Directory completed downloads are written to.
    pub output_dir: PathBuf,

    // Wait after the first cycle in which no provider is ahead of the cursor.
    pub stall_backoff_initial: Duration,

    // Upper bound for the doubling stall wait.
    pub stall_backoff_max: Duration,

    // Consecutive empty cycles after which a file is given up on.
    pub max_stall_retries: u32,

}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            stall_backoff_initial: Duration::from_millis(10),
            stall_backoff_max: Duration::from_secs(1),
            max_stall_retries: 50,
        }
    }
}
