use std::str::FromStr;
use crate::{segments::{HashError, SegmentHash, Segments}, MAX_FILENAME};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ManifestError {

    #[error("line {line}: expected {expected}")]
    Missing { line: usize, expected: &'static str },

    #[error("line {line}: invalid count {value:?}")]
    InvalidCount { line: usize, value: String },

    #[error("line {line}: file name {name:?} is longer than 15 bytes")]
    NameTooLong { line: usize, name: String },

    #[error("line {line}: {source}")]
    InvalidHash { line: usize, source: HashError },

}

type Result<T> = std::result::Result<T, ManifestError>;

// A complete file a peer holds before registering with the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {

    pub name: String,

    pub segments: Segments,

}

// Everything a peer starts with: the files it holds and the files it wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerManifest {

    pub owned: Vec<FileManifest>,

    pub wanted: Vec<String>,

}

// Line cursor that remembers 1-based line numbers for errors.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    line: usize,
}

impl<'a> Lines<'a> {

    fn next(&mut self) -> Option<&'a str> {
        let (idx, line) = self.inner.next()?;
        self.line = idx + 1;
        Some(line.trim_end())
    }

    fn expect(&mut self, expected: &'static str) -> Result<&'a str> {
        let line = self.line + 1;
        self.next().ok_or(ManifestError::Missing { line, expected })
    }

    fn count(&self, value: &str) -> Result<usize> {
        value.trim().parse().map_err(|_| ManifestError::InvalidCount {
            line: self.line,
            value: value.to_owned(),
        })
    }

    fn name(&self, name: &str) -> Result<String> {
        if name.len() > MAX_FILENAME {
            return Err(ManifestError::NameTooLong { line: self.line, name: name.to_owned() });
        }
        Ok(name.to_owned())
    }
}

// Layout:
//   <owned count>
//   <name> <hash count>      (per owned file)
//   <hash>                   (hash count lines)
//   <wanted count>
//   <name>                   (wanted count lines)
// A missing section reads as empty.
impl FromStr for PeerManifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self> {
        let mut lines = Lines { inner: s.lines().enumerate(), line: 0 };
        let mut manifest = PeerManifest::default();

        let Some(owned) = lines.next() else {
            return Ok(manifest);
        };
        let owned = lines.count(owned)?;
        for _ in 0..owned {
            let header = lines.expect("<name> <hash count>")?;
            let mut parts = header.split_whitespace();
            let (Some(name), Some(count)) = (parts.next(), parts.next()) else {
                return Err(ManifestError::Missing { line: lines.line, expected: "<name> <hash count>" });
            };
            let name = lines.name(name)?;
            let count = lines.count(count)?;

            let mut hashes: Vec<SegmentHash> = Vec::with_capacity(count);
            for _ in 0..count {
                let hash = lines.expect("segment hash")?;
                hashes.push(hash.parse().map_err(|source| ManifestError::InvalidHash {
                    line: lines.line,
                    source,
                })?);
            }
            manifest.owned.push(FileManifest { name, segments: Segments::from_hashes(hashes) });
        }

        let Some(wanted) = lines.next() else {
            return Ok(manifest);
        };
        let wanted = lines.count(wanted)?;
        for _ in 0..wanted {
            let name = lines.expect("wanted file name")?;
            let name = lines.name(name.trim())?;
            manifest.wanted.push(name);
        }

        Ok(manifest)
    }
}
