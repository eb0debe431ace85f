//! A single-producer/single-consumer channel, the unit of data flow between
//! [`crate::block::Block`]s.
//!
//! A channel is constructed once and immediately split into a [`Producer`]
//! and a [`Consumer`] handle, matching the original source's design note
//! that channels decompose into a handle owned by the upstream block's
//! runner and a handle owned by the downstream block itself. Two storage
//! kinds are available: [`channel_inline`] allocates a plain heap buffer,
//! and [`channel_dbf`] allocates a doubly-mapped virtual-memory region so
//! that read/write windows are always contiguous, even across a wrap.

mod storage;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::error::Error;
use crate::pod::Pod;
use storage::RawStorage;

struct Channel<T: Pod> {
    storage: RawStorage<T>,
    capacity: usize,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    producer_dropped: CachePadded<AtomicBool>,
    consumer_dropped: CachePadded<AtomicBool>,
}

impl<T: Pod> Channel<T> {
    fn size(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head - tail) as usize
    }

    fn space(&self) -> usize {
        self.capacity - self.size()
    }
}

/// The write half of a channel, owned by the upstream block's
/// [`crate::runner::BlockRunner`].
pub struct Producer<T: Pod> {
    inner: Arc<Channel<T>>,
}

/// The read half of a channel, owned by the downstream block as a field.
pub struct Consumer<T: Pod> {
    inner: Arc<Channel<T>>,
}

// SAFETY: a Producer/Consumer pair only ever touches the indices and
// storage regions their own side owns; moving either handle to a worker
// thread is the whole point of the split.
unsafe impl<T: Pod> Send for Producer<T> {}
unsafe impl<T: Pod> Send for Consumer<T> {}

impl<T: Pod> Drop for Producer<T> {
    fn drop(&mut self) {
        self.inner.producer_dropped.store(true, Ordering::Release);
    }
}

impl<T: Pod> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.inner.consumer_dropped.store(true, Ordering::Release);
    }
}

fn split<T: Pod>(storage: RawStorage<T>) -> (Producer<T>, Consumer<T>) {
    let capacity = storage.capacity();
    let channel = Arc::new(Channel {
        storage,
        capacity,
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
        producer_dropped: CachePadded::new(AtomicBool::new(false)),
        consumer_dropped: CachePadded::new(AtomicBool::new(false)),
    });
    (
        Producer {
            inner: channel.clone(),
        },
        Consumer { inner: channel },
    )
}

/// Creates a channel backed by a plain heap-allocated ring buffer of
/// `capacity` elements.
///
/// Panics if `capacity < 2`: a one-slot ring cannot distinguish "empty"
/// from "full" under this channel's size/space accounting, and a
/// zero-capacity ring divides by zero when computing ring offsets.
pub fn channel_inline<T: Pod>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity >= 2, "channel capacity must be at least 2");
    split(RawStorage::inline(capacity))
}

/// Creates a channel backed by a doubly-mapped virtual-memory region able
/// to hold at least `capacity` elements (the actual capacity may be larger
/// after rounding to the platform's allocation granularity).
///
/// Fails with [`Error::UnsupportedPlatform`] on platforms without
/// doubly-mapped buffer support. Panics if `capacity < 2`, for the same
/// reason as [`channel_inline`].
pub fn channel_dbf<T: Pod>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), Error> {
    assert!(capacity >= 2, "channel capacity must be at least 2");
    Ok(split(RawStorage::doubly_mapped(capacity)?))
}

impl<T: Pod> Producer<T> {
    /// Total capacity of the channel, in elements.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of elements currently occupying the channel.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Number of free elements available to write.
    pub fn space(&self) -> usize {
        self.inner.space()
    }

    /// Whether the paired [`Consumer`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.consumer_dropped.load(Ordering::Acquire)
    }

    /// Pushes a single element, returning `false` if the channel is full.
    pub fn push(&mut self, value: T) -> bool {
        self.write_n(std::slice::from_ref(&value)) == 1
    }

    /// Writes as many elements from `src` as there is space for, returning
    /// the number actually written. Unwritten elements are not buffered or
    /// retried; callers that must not lose samples should check the
    /// returned count.
    pub fn write_n(&mut self, src: &[T]) -> usize {
        let n = self.inner.space().min(src.len());
        if n == 0 {
            return 0;
        }
        let head = self.inner.head.load(Ordering::Relaxed);
        let at = (head % self.inner.capacity as u64) as usize;
        self.inner.storage.write_at(at, &src[..n]);
        self.inner.head.store(head + n as u64, Ordering::Release);
        n
    }

    /// Borrows a contiguous, mutable window of up to `max_len` free
    /// elements to write into directly. The returned slice may be shorter
    /// than `max_len` (in particular for inline storage, which cannot hand
    /// out a window spanning the physical end of the buffer). No elements
    /// are considered written until [`Producer::commit_write`] is called.
    pub fn write_window(&mut self, max_len: usize) -> &mut [T] {
        let space = self.inner.space();
        let requested = space.min(max_len);
        let head = self.inner.head.load(Ordering::Relaxed);
        let at = (head % self.inner.capacity as u64) as usize;
        let len = self.inner.storage.contiguous_len(at, requested);
        let ptr = self.inner.storage.ptr_at(at);
        // SAFETY: `len` elements starting at `at` are free space this
        // producer exclusively owns until `commit_write` advances `head`.
        unsafe { std::slice::from_raw_parts_mut(ptr, len) }
    }

    /// Commits `n` elements previously written through
    /// [`Producer::write_window`], making them visible to the consumer.
    /// `n` is clamped to the available space.
    pub fn commit_write(&mut self, n: usize) {
        let n = self.inner.space().min(n) as u64;
        let head = self.inner.head.load(Ordering::Relaxed);
        self.inner.head.store(head + n, Ordering::Release);
    }
}

impl<T: Pod> Consumer<T> {
    /// Total capacity of the channel, in elements.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of elements currently available to read.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Number of free elements in the channel.
    pub fn space(&self) -> usize {
        self.inner.space()
    }

    /// Whether the paired [`Producer`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.producer_dropped.load(Ordering::Acquire)
    }

    /// Pops a single element, returning `None` if the channel is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.inner.size() == 0 {
            return None;
        }
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let at = (tail % self.inner.capacity as u64) as usize;
        // SAFETY: `size() > 0` guarantees a committed element at `at` that
        // this consumer exclusively owns until `tail` advances below.
        let value = unsafe { self.inner.storage.ptr_at(at).read() };
        self.inner.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }

    /// Reads as many elements into `dst` as are available, returning the
    /// number actually read.
    pub fn read_n(&mut self, dst: &mut [T]) -> usize {
        let n = self.inner.size().min(dst.len());
        if n == 0 {
            return 0;
        }
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let at = (tail % self.inner.capacity as u64) as usize;
        self.inner.storage.read_at(at, &mut dst[..n]);
        self.inner.tail.store(tail + n as u64, Ordering::Release);
        n
    }

    /// Borrows a contiguous window of up to `max_len` available elements.
    /// The returned slice may be shorter than `max_len`, mirroring
    /// [`Producer::write_window`]. No elements are considered consumed
    /// until [`Consumer::commit_read`] is called.
    pub fn read_window(&mut self, max_len: usize) -> &[T] {
        let size = self.inner.size();
        let requested = size.min(max_len);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let at = (tail % self.inner.capacity as u64) as usize;
        let len = self.inner.storage.contiguous_len(at, requested);
        let ptr = self.inner.storage.ptr_at(at);
        // SAFETY: `len` elements starting at `at` are committed data this
        // consumer exclusively owns until `commit_read` advances `tail`.
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    /// Commits `n` elements previously consumed through
    /// [`Consumer::read_window`], freeing their space for the producer.
    /// `n` is clamped to the available size.
    pub fn commit_read(&mut self, n: usize) {
        let n = self.inner.size().min(n) as u64;
        let tail = self.inner.tail.load(Ordering::Relaxed);
        self.inner.tail.store(tail + n, Ordering::Release);
    }

    /// Returns up to two contiguous slices covering every readable sample,
    /// without committing any of it. The second slice is non-empty only
    /// for inline storage whose readable range wraps past the physical end
    /// of the buffer; doubly-mapped storage always returns everything in
    /// the first slice.
    pub fn peek_read(&self) -> (&[T], &[T]) {
        let size = self.inner.size();
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let at = (tail % self.inner.capacity as u64) as usize;
        let first_len = self.inner.storage.contiguous_len(at, size);
        let first_ptr = self.inner.storage.ptr_at(at);
        // SAFETY: `size` committed elements starting at `at` are owned by
        // this consumer until a subsequent `commit_read`/`read_n`/
        // `try_pop` advances `tail`; this call advances nothing.
        let first = unsafe { std::slice::from_raw_parts(first_ptr, first_len) };
        let remaining = size - first_len;
        if remaining == 0 {
            (first, &[])
        } else {
            let second_ptr = self.inner.storage.ptr_at(0);
            // SAFETY: the remaining `remaining` elements wrapped to the
            // front of the inline buffer; `contiguous_len` only leaves a
            // remainder for non-doubly-mapped storage.
            let second = unsafe { std::slice::from_raw_parts(second_ptr, remaining) };
            (first, second)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_round_trip() {
        let (mut tx, mut rx) = channel_inline::<u32>(4);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert_eq!(rx.try_pop(), Some(1));
        assert_eq!(rx.try_pop(), Some(2));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn full_channel_rejects_push() {
        let (mut tx, _rx) = channel_inline::<u32>(2);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert!(!tx.push(3));
    }

    #[test]
    fn write_n_clamps_to_space() {
        let (mut tx, mut rx) = channel_inline::<u32>(4);
        let written = tx.write_n(&[1, 2, 3, 4, 5]);
        assert_eq!(written, 4);
        let mut buf = [0u32; 4];
        assert_eq!(rx.read_n(&mut buf), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn wraparound_preserves_order_on_inline_storage() {
        let (mut tx, mut rx) = channel_inline::<u32>(4);
        assert_eq!(tx.write_n(&[1, 2, 3]), 3);
        let mut buf = [0u32; 2];
        assert_eq!(rx.read_n(&mut buf), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(tx.write_n(&[4, 5, 6]), 3);
        let mut buf = [0u32; 4];
        assert_eq!(rx.read_n(&mut buf), 4);
        assert_eq!(buf, [3, 4, 5, 6]);
    }

    #[test]
    fn window_and_commit_round_trip() {
        let (mut tx, mut rx) = channel_inline::<u32>(4);
        {
            let w = tx.write_window(4);
            assert_eq!(w.len(), 4);
            w[0] = 10;
            w[1] = 20;
        }
        tx.commit_write(2);
        assert_eq!(rx.size(), 2);
        {
            let r = rx.read_window(4);
            assert_eq!(r, &[10, 20]);
        }
        rx.commit_read(2);
        assert_eq!(rx.size(), 0);
    }

    #[test]
    fn peek_read_splits_across_the_wrap_on_inline_storage() {
        let (mut tx, mut rx) = channel_inline::<u32>(4);
        assert_eq!(tx.write_n(&[1, 2, 3]), 3);
        let mut buf = [0u32; 2];
        assert_eq!(rx.read_n(&mut buf), 2);
        assert_eq!(tx.write_n(&[4, 5, 6]), 3);
        let (first, second) = rx.peek_read();
        assert_eq!(first, &[3, 4]);
        assert_eq!(second, &[5, 6]);
        // peek_read never commits.
        assert_eq!(rx.size(), 4);
    }

    #[test]
    fn is_closed_reflects_peer_drop() {
        let (tx, rx) = channel_inline::<u32>(4);
        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
    }

    #[test]
    fn cross_thread_producer_consumer() {
        let (mut tx, mut rx) = channel_inline::<u32>(1024);
        let writer = std::thread::spawn(move || {
            let mut written = 0usize;
            while written < 10_000 {
                written += tx.write_n(&[written as u32]);
            }
        });
        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            if let Some(v) = rx.try_pop() {
                received.push(v);
            }
        }
        writer.join().unwrap();
        for (i, v) in received.iter().enumerate() {
            assert_eq!(*v, i as u32);
        }
    }

    #[test]
    fn doubly_mapped_wraparound_window_is_contiguous() {
        let (mut tx, mut rx) = match channel_dbf::<u32>(4) {
            Ok(pair) => pair,
            Err(Error::UnsupportedPlatform) => return,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(tx.write_n(&[1, 2, 3]), 3);
        let mut buf = [0u32; 2];
        assert_eq!(rx.read_n(&mut buf), 2);
        assert_eq!(tx.write_n(&[4, 5]), 2);
        // A window request larger than the physical tail-to-end distance
        // still comes back contiguous thanks to the mirrored mapping.
        let w = rx.read_window(4);
        assert_eq!(w, &[3, 4, 5]);
    }
}
