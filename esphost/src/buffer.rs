//! # Heap Frame Buffer Pool
//!
//! A [`MemoryManager`] backed by the global allocator, for hosts that have one
//! and for exercising the link device off-target.
//!
//! ## Memory Layout
//!
//! A [`HeapBuffer`] is a chain of segments. Each segment over-allocates by the
//! requested alignment so its payload can start on an aligned address:
//!
//! ```text
//! ┌────────┬──────────────────────────────┬──────────┐
//! │ offset │        payload (len)         │  slack   │
//! └────────┴──────────────────────────────┴──────────┘
//!          ▲
//!   storage + offset, aligned
//! ```
//!
//! The pool counts every allocation and release so callers can check that no
//! buffer leaks.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;

use crate::config::BUFF_ALIGNMENT;
use crate::traits::MemoryManager;

struct Segment {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl Segment {
    fn aligned(len: usize, align: usize) -> Option<Self> {
        let align = align.max(1);
        let storage = vec![0u8; len.checked_add(align)?];
        let offset = storage.as_ptr().align_offset(align).min(align - 1);
        Some(Self { storage, offset, len })
    }

    fn bytes(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

/// A frame buffer made of one or more heap segments
pub struct HeapBuffer {
    segments: Vec<Segment>,
}

impl HeapBuffer {
    /// Length of the whole chain
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }

    /// Payload of the first segment
    pub fn payload(&self) -> &[u8] {
        self.segments.first().map(Segment::bytes).unwrap_or(&[])
    }

    /// Gather the whole chain into one vector
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for segment in &self.segments {
            out.extend_from_slice(segment.bytes());
        }
        out
    }
}

impl core::fmt::Debug for HeapBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapBuffer")
            .field("segments", &self.segments.len())
            .field("total_len", &self.total_len())
            .finish()
    }
}

/// Allocation counters of a [`HeapMemoryManager`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out
    pub allocated: usize,
    /// Buffers given back
    pub freed: usize,
    /// Allocations refused
    pub failed: usize,
}

impl PoolStats {
    /// Buffers currently held by someone
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.freed)
    }
}

/// Heap-backed buffer pool with an optional allocation budget
#[derive(Default)]
pub struct HeapMemoryManager {
    allocated: Cell<usize>,
    freed: Cell<usize>,
    failed: Cell<usize>,
    budget: Cell<Option<usize>>,
}

impl HeapMemoryManager {
    pub const fn new() -> Self {
        Self {
            allocated: Cell::new(0),
            freed: Cell::new(0),
            failed: Cell::new(0),
            budget: Cell::new(None),
        }
    }

    /// Allow only `remaining` more allocations (`None` lifts the limit)
    pub fn set_budget(&self, remaining: Option<usize>) {
        self.budget.set(remaining);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.get(),
            freed: self.freed.get(),
            failed: self.failed.get(),
        }
    }

    /// Allocate an aligned single-segment buffer holding `data`
    pub fn alloc_from(&self, data: &[u8]) -> Option<HeapBuffer> {
        let mut buf = self.alloc_heap(data.len(), BUFF_ALIGNMENT)?;
        buf.segments[0].bytes_mut().copy_from_slice(data);
        Some(buf)
    }

    /// Allocate a chained buffer, one segment per part
    pub fn alloc_chain(&self, parts: &[&[u8]]) -> Option<HeapBuffer> {
        if !self.take_budget() {
            return None;
        }
        let segments = parts
            .iter()
            .map(|part| {
                let mut segment = Segment::aligned(part.len(), BUFF_ALIGNMENT)?;
                segment.bytes_mut().copy_from_slice(part);
                Some(segment)
            })
            .collect::<Option<Vec<_>>>()?;
        Some(HeapBuffer { segments })
    }

    /// Allocate a single-segment buffer holding `data` whose payload is
    /// deliberately off the [`BUFF_ALIGNMENT`] boundary
    pub fn alloc_unaligned(&self, data: &[u8]) -> Option<HeapBuffer> {
        if !self.take_budget() {
            return None;
        }
        let mut segment = Segment::aligned(data.len().checked_add(1)?, BUFF_ALIGNMENT)?;
        segment.offset += 1;
        segment.len = data.len();
        segment.bytes_mut().copy_from_slice(data);
        Some(HeapBuffer {
            segments: vec![segment],
        })
    }

    fn take_budget(&self) -> bool {
        match self.budget.get() {
            Some(0) => {
                self.failed.set(self.failed.get() + 1);
                false
            }
            Some(n) => {
                self.budget.set(Some(n - 1));
                self.allocated.set(self.allocated.get() + 1);
                true
            }
            None => {
                self.allocated.set(self.allocated.get() + 1);
                true
            }
        }
    }
}

impl MemoryManager for HeapMemoryManager {
    type Buffer = HeapBuffer;

    fn alloc_heap(&self, size: usize, align: usize) -> Option<HeapBuffer> {
        let Some(segment) = Segment::aligned(size, align) else {
            self.failed.set(self.failed.get() + 1);
            return None;
        };
        if !self.take_budget() {
            return None;
        }
        Some(HeapBuffer {
            segments: vec![segment],
        })
    }

    fn free(&self, buf: HeapBuffer) {
        self.freed.set(self.freed.get() + 1);
        drop(buf);
    }

    fn is_chained(&self, buf: &HeapBuffer) -> bool {
        buf.segments.len() > 1
    }

    fn total_len(&self, buf: &HeapBuffer) -> usize {
        buf.total_len()
    }

    fn len(&self, buf: &HeapBuffer) -> usize {
        buf.segments.first().map_or(0, |s| s.len)
    }

    fn payload<'b>(&self, buf: &'b HeapBuffer) -> &'b [u8] {
        buf.payload()
    }

    fn payload_mut<'b>(&self, buf: &'b mut HeapBuffer) -> &'b mut [u8] {
        match buf.segments.first_mut() {
            Some(segment) => segment.bytes_mut(),
            None => &mut [],
        }
    }

    fn truncate(&self, buf: &mut HeapBuffer, len: usize) {
        if let Some(segment) = buf.segments.first_mut() {
            segment.len = segment.len.min(len);
        }
    }

    fn copy(&self, to: &mut HeapBuffer, from: &HeapBuffer) {
        let Some(dest) = to.segments.first_mut() else {
            return;
        };
        let dest = dest.bytes_mut();
        let mut written = 0;
        for segment in &from.segments {
            let src = segment.bytes();
            let n = src.len().min(dest.len() - written);
            dest[written..written + n].copy_from_slice(&src[..n]);
            written += n;
            if written == dest.len() {
                break;
            }
        }
    }
}
