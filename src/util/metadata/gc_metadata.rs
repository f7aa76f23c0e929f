use super::{MetadataBuffer, Pool};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Owner of every metadata buffer and the shared pools they travel through.
///
/// Free buffers are kept in two pools: stack buffers for trace stacks and set buffers for
/// everything that is appended to (root sets, remembered sets, finalizer queues, barrier
/// records). When a free pool runs dry, another batch of buffers is created under a lock.
pub struct GcMetadata {
    free_task_pool: Pool,
    free_set_pool: Pool,
    /// Total number of buffers ever created.
    num_buffers: AtomicUsize,
    extend_lock: spin::Mutex<()>,
    extend_batch: usize,

    /// Full trace stacks waiting to be drained by any collector.
    pub mark_task_pool: Pool,
    /// Root slots enumerated for the current collection.
    pub gc_rootset_pool: Pool,
    /// Slots recorded by the mutators' write barrier.
    pub mutator_remset_pool: Pool,
    /// Slots recorded by collectors when a survivor stays in NOS.
    pub collector_remset_pool: Pool,
    /// Records of the concurrent-marking write barrier.
    pub dirty_obj_pool: Pool,

    root_snapshot: spin::RwLock<Vec<Box<MetadataBuffer>>>,
    root_cursor: AtomicUsize,
}

impl GcMetadata {
    pub fn new(initial_buffers: usize) -> Self {
        let metadata = GcMetadata {
            free_task_pool: Pool::new(),
            free_set_pool: Pool::new(),
            num_buffers: AtomicUsize::new(0),
            extend_lock: spin::Mutex::new(()),
            extend_batch: (initial_buffers / 4).max(8),
            mark_task_pool: Pool::new(),
            gc_rootset_pool: Pool::new(),
            mutator_remset_pool: Pool::new(),
            collector_remset_pool: Pool::new(),
            dirty_obj_pool: Pool::new(),
            root_snapshot: spin::RwLock::new(vec![]),
            root_cursor: AtomicUsize::new(0),
        };
        // Split the initial buffers between stacks and sets.
        let tasks = initial_buffers / 2;
        metadata.create_buffers(&metadata.free_task_pool, tasks);
        metadata.create_buffers(&metadata.free_set_pool, initial_buffers - tasks);
        metadata
    }

    fn create_buffers(&self, pool: &Pool, n: usize) {
        for _ in 0..n {
            pool.put(Box::new(MetadataBuffer::new()));
        }
        self.num_buffers.fetch_add(n, Ordering::SeqCst);
    }

    fn get_or_extend(&self, pool: &Pool) -> Box<MetadataBuffer> {
        loop {
            if let Some(b) = pool.get() {
                debug_assert!(b.is_empty());
                return b;
            }
            let _guard = self.extend_lock.lock();
            // Another thread may have extended the pool while we waited for the lock.
            if pool.is_empty() {
                debug!(
                    "Extending metadata by {} buffers ({} total)",
                    self.extend_batch,
                    self.num_buffers.load(Ordering::Relaxed) + self.extend_batch
                );
                self.create_buffers(pool, self.extend_batch);
            }
        }
    }

    /// Get an empty buffer to use as a trace stack.
    pub fn free_task_buffer(&self) -> Box<MetadataBuffer> {
        self.get_or_extend(&self.free_task_pool)
    }

    /// Get an empty buffer to append to.
    pub fn free_set_buffer(&self) -> Box<MetadataBuffer> {
        self.get_or_extend(&self.free_set_pool)
    }

    pub fn put_free_task_buffer(&self, mut buffer: Box<MetadataBuffer>) {
        buffer.clear();
        self.free_task_pool.put(buffer);
    }

    pub fn put_free_set_buffer(&self, mut buffer: Box<MetadataBuffer>) {
        buffer.clear();
        self.free_set_pool.put(buffer);
    }

    /// Empty a pool of set buffers back into the free pool.
    pub fn clear_set_pool(&self, pool: &Pool) {
        while let Some(b) = pool.get() {
            self.put_free_set_buffer(b);
        }
    }

    /// Empty a pool of task buffers back into the free pool.
    pub fn clear_task_pool(&self, pool: &Pool) {
        while let Some(b) = pool.get() {
            self.put_free_task_buffer(b);
        }
    }

    /// Put a set buffer into `pool` if it has entries, otherwise recycle it.
    pub fn put_set_buffer_into(&self, pool: &Pool, buffer: Box<MetadataBuffer>) {
        if buffer.is_empty() {
            self.put_free_set_buffer(buffer);
        } else {
            pool.put(buffer);
        }
    }

    pub fn total_buffers(&self) -> usize {
        self.num_buffers.load(Ordering::SeqCst)
    }

    pub fn free_buffers(&self) -> usize {
        self.free_task_pool.len() + self.free_set_pool.len()
    }

    /// Pools that must be empty between collections.
    pub fn check_results_empty(&self) -> bool {
        self.mark_task_pool.is_empty()
            && self.gc_rootset_pool.is_empty()
            && self.root_snapshot.read().is_empty()
    }

    /// Move the enumerated root buffers into the snapshot that collectors claim from. The
    /// snapshot stays intact until [`GcMetadata::release_roots`], so a collection can walk the
    /// roots more than once.
    pub fn snapshot_roots(&self) {
        let mut snapshot = self.root_snapshot.write();
        while let Some(b) = self.gc_rootset_pool.get() {
            snapshot.push(b);
        }
        self.root_cursor.store(0, Ordering::SeqCst);
    }

    /// Let the next pass claim every root buffer again.
    pub fn reset_root_cursor(&self) {
        self.root_cursor.store(0, Ordering::SeqCst);
    }

    /// Claim root buffers one at a time and call `f` on each entry, until every buffer has
    /// been claimed by some collector.
    pub fn for_each_claimed_root(&self, mut f: impl FnMut(usize)) {
        let snapshot = self.root_snapshot.read();
        loop {
            let i = self.root_cursor.fetch_add(1, Ordering::SeqCst);
            if i >= snapshot.len() {
                return;
            }
            for word in snapshot[i].iter() {
                f(word);
            }
        }
    }

    /// Visit every root entry from one thread.
    pub fn for_each_root(&self, mut f: impl FnMut(usize)) {
        for b in self.root_snapshot.read().iter() {
            for word in b.iter() {
                f(word);
            }
        }
    }

    pub fn num_roots(&self) -> usize {
        self.root_snapshot.read().iter().map(|b| b.len()).sum()
    }

    pub fn release_roots(&self) {
        let mut snapshot = self.root_snapshot.write();
        for b in snapshot.drain(..) {
            self.put_free_set_buffer(b);
        }
    }

    /// Count buffers sitting in the pools this struct owns.
    pub fn pooled_buffers(&self) -> usize {
        self.free_buffers()
            + self.mark_task_pool.len()
            + self.gc_rootset_pool.len()
            + self.mutator_remset_pool.len()
            + self.collector_remset_pool.len()
            + self.dirty_obj_pool.len()
            + self.root_snapshot.read().len()
    }

    /// Give every buffer back to the allocator. Used at shutdown.
    pub fn destroy(&self) {
        self.release_roots();
        for pool in [
            &self.mark_task_pool,
            &self.gc_rootset_pool,
            &self.mutator_remset_pool,
            &self.collector_remset_pool,
            &self.dirty_obj_pool,
            &self.free_task_pool,
            &self.free_set_pool,
        ] {
            let n = pool.drain().len();
            self.num_buffers.fetch_sub(n, Ordering::SeqCst);
        }
    }
}
