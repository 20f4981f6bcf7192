use std::path::{Path, PathBuf};
use crate::{manifest::{ManifestError, PeerManifest}, segments::Segments, Rank};


#[derive(thiserror::Error, Debug)]
pub enum FsError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("manifest {path}: {source}")]
    ManifestError {
        path: PathBuf,
        source: ManifestError,
    },

}

pub type Result<T> = std::result::Result<T, FsError>;

pub fn manifest_path(dir: &Path, rank: Rank) -> PathBuf {
    dir.join(format!("in{}.txt", rank))
}

pub fn output_path(dir: &Path, rank: Rank, file: &str) -> PathBuf {
    dir.join(format!("client{}_{}", rank, file))
}

// Reads the held and wanted files of the peer with the given rank.
pub async fn read_manifest(dir: &Path, rank: Rank) -> Result<PeerManifest> {
    let path = manifest_path(dir, rank);
    let contents = tokio::fs::read_to_string(&path).await?;
    contents
        .parse()
        .map_err(|source| FsError::ManifestError { path, source })
}

// Writes a completed download, one segment hash per line.
pub async fn write_download(dir: &Path, rank: Rank, file: &str, segments: &Segments) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = output_path(dir, rank, file);

    let mut contents = String::with_capacity(segments.len() * (crate::HASH_SIZE + 1));
    for hash in segments.iter() {
        contents.push_str(&hash.to_string());
        contents.push('\n');
    }
    tokio::fs::write(&path, contents).await?;

    tracing::debug!("wrote {} segments to {}", segments.len(), path.display());
    Ok(path)
}
