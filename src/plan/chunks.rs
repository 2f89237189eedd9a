//! Pure chunk planning
//!
//! Splits the global iteration range `[0, N)` into contiguous chunks of at
//! most `chunk_size` iterations. No I/O, deterministic.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::ops::Range;

/// A contiguous slice `[start, end)` of the global iteration sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRange {
    /// Position of this chunk in submission order
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ChunkRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk {} [{}, {})", self.index, self.start, self.end)
    }
}

/// Pure: Number of chunks needed for `total` iterations
pub fn chunk_count(total: usize, chunk_size: NonZeroUsize) -> usize {
    total.div_ceil(chunk_size.get())
}

/// Pure: Lazily plan the chunks covering `[0, total)`
pub fn plan_chunks(total: usize, chunk_size: NonZeroUsize) -> ChunkPlan {
    ChunkPlan {
        total,
        chunk_size: chunk_size.get(),
        next: 0,
    }
}

/// Iterator over the chunks of a plan, in global order
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
    next: usize,
}

impl Iterator for ChunkPlan {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        let start = self.next.checked_mul(self.chunk_size)?;
        if start >= self.total {
            return None;
        }
        let end = start.saturating_add(self.chunk_size).min(self.total);
        let chunk = ChunkRange {
            index: self.next,
            start,
            end,
        };
        self.next += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.div_ceil(self.chunk_size).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}
