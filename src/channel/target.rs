//! Conditionally compiled code.
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    ops::Deref,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// A marker trait for messages that can be sent on a Transmitter.
#[cfg(not(target_arch = "wasm32"))]
pub trait Transmission: Send + Sync + 'static {}
#[cfg(target_arch = "wasm32")]
pub trait Transmission: 'static {}

#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + 'static> Transmission for T {}
#[cfg(target_arch = "wasm32")]
impl<T: 'static> Transmission for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait FutureMessage<A>: Future<Output = A> + Send + 'static {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Future<Output = A> + Send + 'static, A> FutureMessage<A> for T {}
#[cfg(target_arch = "wasm32")]
pub trait FutureMessage<A>: Future<Output = A> + 'static {}
#[cfg(target_arch = "wasm32")]
impl<T: Future<Output = A> + 'static, A> FutureMessage<A> for T {}

/// An abstraction over [`std::sync::Arc`] or [`std::rc::Rc`], depending on configuration and targets.
#[derive(Debug, Default)]
pub struct Counted<T> {
    #[cfg(target_arch = "wasm32")]
    inner: std::rc::Rc<T>,
    #[cfg(not(target_arch = "wasm32"))]
    inner: std::sync::Arc<T>,
}

impl<T> Clone for Counted<T> {
    fn clone(&self) -> Self {
        Counted {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Counted<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Counted<T> {
    #[cfg(target_arch = "wasm32")]
    pub fn new(t: T) -> Self {
        Counted {
            inner: std::rc::Rc::new(t),
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(t: T) -> Self {
        Counted {
            inner: std::sync::Arc::new(t),
        }
    }

    /// Create a non-owning handle to the same allocation.
    #[cfg(target_arch = "wasm32")]
    pub fn downgrade(&self) -> WeakCounted<T> {
        WeakCounted {
            inner: std::rc::Rc::downgrade(&self.inner),
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    pub fn downgrade(&self) -> WeakCounted<T> {
        WeakCounted {
            inner: std::sync::Arc::downgrade(&self.inner),
        }
    }
}

/// The non-owning counterpart of [`Counted`].
///
/// Holding a `WeakCounted` never extends the lifetime of the allocation it
/// points at. [`WeakCounted::upgrade`] is the only way back to the value and
/// fails once the last [`Counted`] is gone.
#[derive(Debug)]
pub struct WeakCounted<T> {
    #[cfg(target_arch = "wasm32")]
    inner: std::rc::Weak<T>,
    #[cfg(not(target_arch = "wasm32"))]
    inner: std::sync::Weak<T>,
}

impl<T> Clone for WeakCounted<T> {
    fn clone(&self) -> Self {
        WeakCounted {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakCounted<T> {
    /// Attempt to recover an owning handle. `None` after the value dropped.
    pub fn upgrade(&self) -> Option<Counted<T>> {
        self.inner.upgrade().map(|inner| Counted { inner })
    }
}

/// An abstraction over [`std::sync::Mutex`] or [`std::cell::RefCell`], depending on configuration and targets.
#[derive(Default)]
pub struct Shared<T> {
    #[cfg(target_arch = "wasm32")]
    inner: std::cell::RefCell<T>,
    #[cfg(not(target_arch = "wasm32"))]
    inner: std::sync::Mutex<T>,
}

impl<T> Shared<T> {
    /// Create a new shared variable.
    #[cfg(target_arch = "wasm32")]
    pub fn new(t: T) -> Self {
        Shared {
            inner: std::cell::RefCell::new(t),
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(t: T) -> Self {
        Shared {
            inner: std::sync::Mutex::new(t),
        }
    }

    /// Visit the value of the shared variable using a closure
    /// which may return a value.
    #[cfg(target_arch = "wasm32")]
    pub fn visit<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&T) -> A,
    {
        f(&self.inner.borrow())
    }
    #[cfg(not(target_arch = "wasm32"))]
    pub fn visit<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&T) -> A,
    {
        f(&self.inner.lock().unwrap())
    }

    /// Visit the value of the shared variable using a closure
    /// which may mutate the inner value and return a value.
    #[cfg(target_arch = "wasm32")]
    pub fn visit_mut<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&mut T) -> A,
    {
        f(&mut self.inner.borrow_mut())
    }
    #[cfg(not(target_arch = "wasm32"))]
    pub fn visit_mut<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&mut T) -> A,
    {
        f(&mut self.inner.lock().unwrap())
    }
}

#[cfg(target_arch = "wasm32")]
type Response<A> = Box<dyn FnMut(&A)>;
#[cfg(not(target_arch = "wasm32"))]
type Response<A> = Box<dyn FnMut(&A) + Send + Sync>;

/// A boxed run-once hook.
#[cfg(target_arch = "wasm32")]
pub(crate) type Hook = Box<dyn FnOnce()>;
#[cfg(not(target_arch = "wasm32"))]
pub(crate) type Hook = Box<dyn FnOnce() + Send + Sync>;

struct Entry<A> {
    on_event: Response<A>,
    on_close: Option<Hook>,
}

pub struct Responders<A> {
    next_k: AtomicUsize,
    closed: AtomicBool,
    branches: Shared<HashMap<usize, Entry<A>>>,
    // keys detached while their entry was checked out by `send`
    defunct: Shared<HashSet<usize>>,
}

impl<A> Default for Responders<A> {
    fn default() -> Self {
        Self {
            next_k: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            branches: Default::default(),
            defunct: Default::default(),
        }
    }
}

impl<A: Transmission> Responders<A> {
    pub fn insert(&self, k: usize, f: impl FnMut(&A) + Transmission) {
        self.insert_entry(
            k,
            Entry {
                on_event: Box::new(f),
                on_close: None,
            },
        );
    }

    pub fn insert_with_close(
        &self,
        k: usize,
        f: impl FnMut(&A) + Transmission,
        h: impl FnOnce() + Transmission,
    ) {
        self.insert_entry(
            k,
            Entry {
                on_event: Box::new(f),
                on_close: Some(Box::new(h)),
            },
        );
    }

    fn insert_entry(&self, k: usize, entry: Entry<A>) {
        if self.is_closed() {
            if let Some(h) = entry.on_close {
                h();
            }
            return;
        }
        self.branches.visit_mut(|b| b.insert(k, entry));
        // `close` may have drained the map between the check and the insert.
        // Whichever side still finds the entry owns firing its hook.
        if self.is_closed() {
            if let Some(entry) = self.branches.visit_mut(|b| b.remove(&k)) {
                if let Some(h) = entry.on_close {
                    h();
                }
            }
        }
    }

    pub fn remove(&self, k: usize) {
        let present = self.branches.visit_mut(|b| b.remove(&k).is_some());
        if !present && !self.is_closed() {
            // checked out by a dispatch on another context right now
            self.defunct.visit_mut(|d| d.insert(k));
        }
    }

    /// Fetch the next available responder index, incrementing it.
    pub fn get_next_k(&self) -> usize {
        self.next_k.fetch_add(1, Ordering::SeqCst)
    }

    /// Run every responder with `a`.
    ///
    /// Each entry is checked out of the registry while its closure runs, so a
    /// responder may subscribe, detach or send on this same channel without
    /// deadlocking. Responders inserted during a dispatch see only later
    /// messages.
    pub fn send(&self, a: &A) {
        if self.is_closed() {
            return;
        }
        let ks: Vec<usize> = self.branches.visit(|b| b.keys().copied().collect());
        for k in ks {
            let checked_out = self.branches.visit_mut(|b| b.remove(&k));
            let mut entry = match checked_out {
                Some(entry) => entry,
                None => continue,
            };
            (entry.on_event)(a);
            // a detach during the callback wins over a close during the
            // callback, so consume the defunct mark first
            if self.defunct.visit_mut(|d| d.remove(&k)) {
                // detached mid-dispatch; drop without firing the close hook
            } else if self.is_closed() {
                // the channel closed while this entry was checked out, so the
                // drain in `close` could not reach it
                if let Some(h) = entry.on_close {
                    h();
                }
            } else {
                self.branches.visit_mut(|b| b.insert(k, entry));
                // same check-back as `insert_entry`: `close` may have drained
                // between the closed check and the insert
                if self.is_closed() {
                    if let Some(entry) = self.branches.visit_mut(|b| b.remove(&k)) {
                        if let Some(h) = entry.on_close {
                            h();
                        }
                    }
                }
            }
        }
    }

    /// Close the channel: terminal and idempotent.
    ///
    /// Fires every registered close hook exactly once and drops all
    /// responders, releasing whatever their closures captured.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let entries: Vec<Entry<A>> = self
            .branches
            .visit_mut(|b| b.drain().map(|(_, entry)| entry).collect());
        // defunct marks are left for the dispatch that created them to
        // consume; clearing them here would turn a mid-dispatch detach
        // into a completion
        for entry in entries {
            if let Some(h) = entry.on_close {
                h();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        pub fn spawn<FutureA: FutureMessage<()>>(fa: FutureA) {
            wasm_bindgen_futures::spawn_local(fa);
        }
    } else if #[cfg(feature = "async-tokio")] {
        pub fn spawn<FutureA: FutureMessage<()>>(fa: FutureA) {
            let _ = tokio::task::spawn(fa);
        }
    } else if #[cfg(feature = "async-smol")] {
        pub fn spawn<FutureA: FutureMessage<()>>(fa: FutureA) {
            smol::spawn(fa).detach();
        }
    } else {
        compile_error!("no support for async - you must build for wasm32 or enable one of the async-tokio or async-smol features");
    }
}
