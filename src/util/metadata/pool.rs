use super::MetadataBuffer;
use crossbeam::queue::SegQueue;

/// A lock-free pool of metadata buffers. Producers put full (or finished) buffers, consumers
/// get them in any order.
#[derive(Default)]
pub struct Pool {
    queue: SegQueue<Box<MetadataBuffer>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, buffer: Box<MetadataBuffer>) {
        self.queue.push(buffer);
    }

    pub fn get(&self) -> Option<Box<MetadataBuffer>> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The number of buffers in the pool. Only exact when no other thread uses the pool.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// The number of entries in all buffers. Takes every buffer out and puts it back, so the
    /// pool must not be in concurrent use.
    pub fn num_entries(&self) -> usize {
        let buffers = self.drain();
        let n = buffers.iter().map(|b| b.len()).sum();
        for b in buffers {
            self.put(b);
        }
        n
    }

    /// Take every buffer out of the pool.
    pub fn drain(&self) -> Vec<Box<MetadataBuffer>> {
        let mut buffers = Vec::with_capacity(self.queue.len());
        while let Some(b) = self.queue.pop() {
            buffers.push(b);
        }
        buffers
    }

    /// Move every buffer of `other` into this pool.
    pub fn append(&self, other: &Pool) {
        while let Some(b) = other.get() {
            self.put(b);
        }
    }
}
