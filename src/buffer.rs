//! Growable scratch buffers and the pool that recycles them.
//!
//! A [`ScratchBuffer`] is used to lay out an outgoing frame (header + payload) so it
//! reaches the stream in a single write, and to accumulate the payload of an
//! incoming message across fragments. Buffers are borrowed from a [`BufferPool`]
//! through a [`PooledBuffer`] guard which hands them back, emptied, when dropped.

use std::io;
use std::io::Read;
use std::mem;
use std::ops::{Deref, DerefMut, Range};
use std::sync::{Arc, Mutex};

use crate::ws::mask::Mask;

pub const DEFAULT_INITIAL_CAPACITY: usize = 4096;
pub const DEFAULT_POOL_CAPACITY: usize = 4;
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct ScratchBuffer {
    inner: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new() -> ScratchBuffer {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> ScratchBuffer {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Resets the length, keeps the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.inner
    }

    #[inline]
    pub fn view_mut(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    #[inline]
    pub fn view_last(&self, len: usize) -> &[u8] {
        &self.inner[self.inner.len() - len..]
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.inner.push(value);
    }

    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.inner.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_u64(&mut self, value: u64) {
        self.inner.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_slice(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Appends `data` and masks the appended bytes, leaving `data` untouched.
    pub fn put_masked(&mut self, mask: &mut Mask, data: &[u8]) {
        let start = self.inner.len();
        self.inner.extend_from_slice(data);
        mask.apply(&mut self.inner[start..]);
    }

    /// Appends exactly `len` bytes read from `stream` and returns the range they
    /// occupy. On error the buffer is truncated back to its previous length.
    pub fn read_from<S: Read + ?Sized>(&mut self, stream: &mut S, len: usize) -> io::Result<Range<usize>> {
        let start = self.inner.len();
        self.inner.resize(start + len, 0u8);
        match stream.read_exact(&mut self.inner[start..]) {
            Ok(()) => Ok(start..start + len),
            Err(err) => {
                self.inner.truncate(start);
                Err(err)
            }
        }
    }

    /// Reads one byte at a time until the buffer ends with `delimiter`, so nothing past
    /// the delimiter is ever consumed from the stream. Fails with `InvalidData` once
    /// `limit` bytes were read without seeing it.
    pub fn read_until<S: Read + ?Sized>(&mut self, stream: &mut S, delimiter: &[u8], limit: usize) -> io::Result<()> {
        let mut byte = [0u8; 1];
        loop {
            if self.inner.len() >= delimiter.len() && self.view_last(delimiter.len()) == delimiter {
                return Ok(());
            }
            if self.inner.len() >= limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("delimiter not found within {limit} bytes"),
                ));
            }
            stream.read_exact(&mut byte)?;
            self.inner.push(byte[0]);
        }
    }
}

/// Recycles [`ScratchBuffer`]s. Cloning the pool shares the same free list.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<FreeList>>,
}

#[derive(Debug)]
struct FreeList {
    buffers: Vec<ScratchBuffer>,
    capacity: usize,
    max_retained_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_MAX_RETAINED_CAPACITY)
    }
}

impl BufferPool {
    /// `capacity` bounds the number of idle buffers kept around, buffers that grew past
    /// `max_retained_capacity` are released instead of pooled.
    pub fn new(capacity: usize, max_retained_capacity: usize) -> BufferPool {
        Self {
            inner: Arc::new(Mutex::new(FreeList {
                buffers: Vec::with_capacity(capacity),
                capacity,
                max_retained_capacity,
            })),
        }
    }

    /// Borrows an empty buffer, allocating one if the pool has none idle.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = self
            .inner
            .lock()
            .ok()
            .and_then(|mut free| free.buffers.pop())
            .unwrap_or_else(ScratchBuffer::new);
        PooledBuffer {
            buffer,
            pool: self.clone(),
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.inner.lock().map(|free| free.buffers.len()).unwrap_or(0)
    }

    fn release(&self, mut buffer: ScratchBuffer) {
        buffer.clear();
        if let Ok(mut free) = self.inner.lock() {
            if free.buffers.len() < free.capacity && buffer.capacity() <= free.max_retained_capacity {
                free.buffers.push(buffer);
            }
        }
    }
}

/// Exclusive loan of a [`ScratchBuffer`], returned to its pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: ScratchBuffer,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = ScratchBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(mem::take(&mut self.buffer));
    }
}
