use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Reusable scratch buffers for decompressed request bodies.
///
/// Buffers larger than `max_retained_capacity` are dropped instead of
/// returned so one huge body does not pin memory forever.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    max_retained_capacity: usize,
}

const DEFAULT_RETAINED_CAPACITY: usize = 1 << 20;

impl BufferPool {
    /// Pool keeping at most `max_idle` buffers between requests.
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                max_retained_capacity: DEFAULT_RETAINED_CAPACITY,
            }),
        }
    }

    /// Borrow an empty buffer; it goes back to the pool when dropped.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default();
        PooledBuffer {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Buffers currently idle.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        if buf.capacity() == 0 || buf.capacity() > self.pool.max_retained_capacity {
            return;
        }
        buf.clear();
        // A poisoned lock only loses the buffer.
        if let Ok(mut free) = self.pool.free.lock() {
            if free.len() < self.pool.max_idle {
                free.push(buf);
            }
        }
    }
}
