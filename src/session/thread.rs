//! The single-owner task queue a session is bound to.
//!
//! Every state-mutating session entry point runs as a task on one
//! `CameraThread`. The queue either runs on a dedicated worker thread
//! ([`CameraThread::spawn`]) or is drained by hand on the caller's thread
//! ([`CameraThread::run_until_idle`]), which keeps tests deterministic.
//! Identity is checked by comparing queue ids, not OS thread ids.

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Shutdown,
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_QUEUE: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Marks the current OS thread as executing a queue until dropped.
struct ExecutionScope {
    previous: Option<u64>,
}

impl ExecutionScope {
    fn enter(id: u64) -> Self {
        let previous = CURRENT_QUEUE.with(|current| current.replace(Some(id)));
        Self { previous }
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        CURRENT_QUEUE.with(|current| current.set(self.previous));
    }
}

struct Inner {
    id: u64,
    name: String,
    tx: flume::Sender<Message>,
    rx: flume::Receiver<Message>,
}

/// Cloneable handle to a camera task queue.
#[derive(Clone)]
pub struct CameraThread {
    inner: Arc<Inner>,
}

impl CameraThread {
    /// Creates a queue that is drained with [`CameraThread::run_until_idle`].
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            inner: Arc::new(Inner {
                id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                tx,
                rx,
            }),
        }
    }

    /// Creates a queue served by a dedicated worker thread.
    ///
    /// The worker exits after [`CameraThread::shutdown`].
    pub fn spawn(name: impl Into<String>) -> io::Result<(Self, JoinHandle<()>)> {
        let thread = Self::new(name);
        let worker = thread.clone();
        let handle = std::thread::Builder::new()
            .name(thread.inner.name.clone())
            .spawn(move || worker.run_worker())?;
        Ok((thread, handle))
    }

    fn run_worker(&self) {
        let _scope = ExecutionScope::enter(self.inner.id);
        tracing::debug!(thread = %self.inner.name, "Camera thread started");
        while let Ok(message) = self.inner.rx.recv() {
            match message {
                Message::Run(task) => task(),
                Message::Shutdown => break,
            }
        }
        tracing::debug!(thread = %self.inner.name, "Camera thread exited");
    }

    /// Queues `task` to run on this camera thread.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.tx.send(Message::Run(Box::new(task))).is_err() {
            tracing::warn!(thread = %self.inner.name, "Camera thread gone, dropping task");
        }
    }

    /// Runs `task` on the camera thread and waits for its result.
    ///
    /// Only valid for spawned queues and never from the camera thread
    /// itself. Returns `None` if the worker exited before running it.
    pub fn invoke<F, R>(&self, task: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        assert!(!self.is_current(), "invoke() called from its own camera thread");
        let (tx, rx) = flume::bounded(1);
        self.post(move || {
            let _ = tx.send(task());
        });
        rx.recv().ok()
    }

    /// Asks a spawned worker to exit after the tasks already queued.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(Message::Shutdown);
    }

    /// Drains the queue on the calling thread, including tasks posted by
    /// the tasks it runs. Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> usize {
        let _scope = ExecutionScope::enter(self.inner.id);
        let mut executed = 0;
        while let Ok(message) = self.inner.rx.try_recv() {
            if let Message::Run(task) = message {
                task();
                executed += 1;
            }
        }
        executed
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.rx.len()
    }

    /// Returns true if the caller is executing on this queue.
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE.with(|current| current.get() == Some(self.inner.id))
    }

    /// Panics unless the caller is executing on this queue.
    #[track_caller]
    pub fn check_is_current(&self) {
        if !self.is_current() {
            panic!("Wrong thread: expected camera thread '{}'", self.inner.name);
        }
    }

    /// Name given at creation, used in logs and panics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl std::fmt::Debug for CameraThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraThread")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_tasks_run_in_order_on_drain() {
        let thread = CameraThread::new("test");
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            thread.post(move || log.lock().unwrap().push(i));
        }
        assert_eq!(thread.pending(), 3);
        assert_eq!(thread.run_until_idle(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_nested_posts_are_drained() {
        let thread = CameraThread::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let inner_thread = thread.clone();
        let inner_count = Arc::clone(&count);

        thread.post(move || {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let c = Arc::clone(&inner_count);
            inner_thread.post(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(thread.run_until_idle(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identity_only_inside_tasks() {
        let thread = CameraThread::new("test");
        let other = CameraThread::new("other");
        assert!(!thread.is_current());

        let seen = Arc::new(AtomicUsize::new(0));
        let (t, o, s) = (thread.clone(), other.clone(), Arc::clone(&seen));
        thread.post(move || {
            if t.is_current() && !o.is_current() {
                s.store(1, Ordering::SeqCst);
            }
        });
        thread.run_until_idle();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!thread.is_current());
    }

    #[test]
    #[should_panic(expected = "Wrong thread")]
    fn test_check_panics_off_thread() {
        CameraThread::new("test").check_is_current();
    }

    #[test]
    fn test_spawned_worker_invoke() {
        let (thread, handle) = CameraThread::spawn("worker").unwrap();
        let queue = thread.clone();
        let on_thread = thread.invoke(move || queue.is_current());

        assert_eq!(on_thread, Some(true));
        thread.shutdown();
        handle.join().unwrap();
    }
}
