use super::Collector;
use crate::vm::VMBinding;
use crate::GC;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task<VM> = Arc<dyn Fn(&mut Collector<VM>) + Send + Sync>;

struct PoolSync<VM: VMBinding> {
    name: &'static str,
    task: Option<Task<VM>>,
    /// Incremented for every posted task. A collector runs a task when it sees a new epoch.
    epoch: usize,
    finished: usize,
    panicked: usize,
    exit: bool,
}

/// A fixed set of collector threads that run the phases of a collection.
pub struct CollectorPool<VM: VMBinding> {
    num_collectors: usize,
    sync: Mutex<PoolSync<VM>>,
    task_posted: Condvar,
    task_finished: Condvar,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<VM: VMBinding> CollectorPool<VM> {
    pub fn new(num_collectors: usize) -> Self {
        assert!(num_collectors > 0);
        CollectorPool {
            num_collectors,
            sync: Mutex::new(PoolSync {
                name: "",
                task: None,
                epoch: 0,
                finished: num_collectors,
                panicked: 0,
                exit: false,
            }),
            task_posted: Condvar::new(),
            task_finished: Condvar::new(),
            handles: Mutex::new(vec![]),
        }
    }

    pub fn num_collectors(&self) -> usize {
        self.num_collectors
    }

    /// Start the collector threads.
    pub fn spawn(&'static self, gc: &'static GC<VM>) {
        let mut handles = self.handles.lock().unwrap();
        for ordinal in 0..self.num_collectors {
            let handle = std::thread::Builder::new()
                .name(format!("gengc-collector-{}", ordinal))
                .spawn(move || {
                    let mut collector = Collector::new(ordinal, gc);
                    self.collector_loop(&mut collector);
                });
            match handle {
                Ok(h) => handles.push(h),
                Err(e) => panic!("Failed to spawn collector thread {}: {}", ordinal, e),
            }
        }
        debug!("Spawned {} collector threads", self.num_collectors);
    }

    fn collector_loop(&self, collector: &mut Collector<VM>) {
        let mut seen = 0;
        loop {
            let task = {
                let mut sync = self.sync.lock().unwrap();
                while sync.epoch == seen && !sync.exit {
                    sync = self.task_posted.wait(sync).unwrap();
                }
                if sync.exit {
                    return;
                }
                seen = sync.epoch;
                sync.task.clone()
            };
            let ok = match task {
                Some(task) => catch_unwind(AssertUnwindSafe(|| task(collector))).is_ok(),
                None => true,
            };
            let mut sync = self.sync.lock().unwrap();
            if !ok {
                sync.panicked += 1;
            }
            sync.finished += 1;
            if sync.finished == self.num_collectors {
                sync.task = None;
                self.task_finished.notify_all();
            }
        }
    }

    /// Hand a task to every collector without waiting for it. Waits for the previous task
    /// first.
    pub fn post_task<F>(&self, name: &'static str, task: F)
    where
        F: Fn(&mut Collector<VM>) + Send + Sync + 'static,
    {
        self.wait_for_task();
        let mut sync = self.sync.lock().unwrap();
        trace!("Posting task {}", name);
        sync.name = name;
        sync.task = Some(Arc::new(task));
        sync.finished = 0;
        sync.epoch += 1;
        self.task_posted.notify_all();
    }

    /// Whether every collector has finished the last posted task.
    pub fn is_task_finished(&self) -> bool {
        self.sync.lock().unwrap().finished == self.num_collectors
    }

    /// Block until every collector has finished the last posted task.
    pub fn wait_for_task(&self) {
        let mut sync = self.sync.lock().unwrap();
        while sync.finished < self.num_collectors {
            sync = self.task_finished.wait(sync).unwrap();
        }
        if sync.panicked > 0 {
            let name = sync.name;
            sync.panicked = 0;
            drop(sync);
            panic!("A collector panicked while running {}", name);
        }
    }

    /// Run a task on every collector and wait until all of them have finished it.
    pub fn run_task<F>(&self, name: &'static str, task: F)
    where
        F: Fn(&mut Collector<VM>) + Send + Sync + 'static,
    {
        self.post_task(name, task);
        self.wait_for_task();
    }

    /// Stop the collector threads. Any posted task is finished first.
    pub fn shutdown(&self) {
        self.wait_for_task();
        {
            let mut sync = self.sync.lock().unwrap();
            sync.exit = true;
            self.task_posted.notify_all();
        }
        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        for h in handles {
            if h.join().is_err() {
                warn!("A collector thread exited with a panic");
            }
        }
    }
}
