use std::{fmt, str::FromStr};
use bytes::{BufMut, Bytes, BytesMut};
use crate::HASH_SIZE;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HashError {

    #[error("segment hash must be 32 bytes, got {len}")]
    InvalidLength { len: usize },

    #[error("segment hash contains non-ascii bytes")]
    NotAscii,

}

// Opaque fixed-width token identifying the content of one segment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHash([u8; HASH_SIZE]);

impl SegmentHash {

    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl FromStr for SegmentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end();
        if !s.is_ascii() {
            return Err(HashError::NotAscii);
        }
        let bytes: [u8; HASH_SIZE] = s
            .as_bytes()
            .try_into()
            .map_err(|_| HashError::InvalidLength { len: s.len() })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for SegmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for SegmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentHash({})", self)
    }
}

// Ordered segment hashes of one file, kept in a single buffer and indexed by segment.
// Cloning shares the buffer, so snapshots sent to peers do not copy hashes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Segments {
    buf: Bytes,
}

impl Segments {

    pub fn from_hashes<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = SegmentHash>,
    {
        let hashes = hashes.into_iter();
        let mut buf = BytesMut::with_capacity(hashes.size_hint().0 * HASH_SIZE);
        for hash in hashes {
            buf.put_slice(hash.as_bytes());
        }
        Self { buf: buf.freeze() }
    }

    // Number of segments.
    pub fn len(&self) -> usize {
        self.buf.len() / HASH_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<SegmentHash> {
        let start = idx.checked_mul(HASH_SIZE)?;
        let chunk = self.buf.get(start..start + HASH_SIZE)?;
        chunk.try_into().ok().map(SegmentHash)
    }

    pub fn iter(&self) -> impl Iterator<Item = SegmentHash> + '_ {
        self.buf
            .chunks_exact(HASH_SIZE)
            .filter_map(|chunk| chunk.try_into().ok().map(SegmentHash))
    }
}

impl FromIterator<SegmentHash> for Segments {
    fn from_iter<T: IntoIterator<Item = SegmentHash>>(iter: T) -> Self {
        Segments::from_hashes(iter)
    }
}

impl fmt::Debug for Segments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
pub(crate) fn test_hash(n: usize) -> SegmentHash {
    format!("{:032}", n).parse().unwrap()
}
