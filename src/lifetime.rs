//! One-shot end-of-life signals.
//!
//! A [`LifetimeSource`] lives inside an owner object and ends, exactly once,
//! when the owner tears down - either explicitly through
//! [`LifetimeSource::end`] or implicitly when the source drops with its
//! owner. [`Lifetime`] handles observe the end from anywhere without keeping
//! the owner alive.
//!
//! Ending is the close of an internal `()` channel, so it carries no value,
//! happens at most once, and is observable after the fact: a hook added to a
//! lifetime that has already ended runs immediately.
use crate::channel::{channel, Receiver, Subscription, Transmission, Transmitter};

/// The owning half of a lifetime. Ends it when dropped.
///
/// Deliberately not `Clone`: exactly one place - the owner - decides when
/// the lifetime is over.
pub struct LifetimeSource {
    tx: Transmitter<()>,
}

impl Default for LifetimeSource {
    fn default() -> Self {
        LifetimeSource {
            tx: Transmitter::new(),
        }
    }
}

impl LifetimeSource {
    pub fn new() -> LifetimeSource {
        Default::default()
    }

    /// A cloneable handle observing this lifetime.
    pub fn lifetime(&self) -> Lifetime {
        Lifetime {
            rx: self.tx.spawn_recv(),
        }
    }

    /// End the lifetime now. Idempotent.
    pub fn end(&self) {
        self.tx.close();
    }

    pub fn has_ended(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Drop for LifetimeSource {
    fn drop(&mut self) {
        self.tx.close();
    }
}

/// A handle observing an owner's end of life.
#[derive(Clone)]
pub struct Lifetime {
    rx: Receiver<()>,
}

impl Lifetime {
    /// A lifetime that ended before it was ever observable.
    pub fn ended() -> Lifetime {
        let (tx, rx) = channel::<()>();
        tx.close();
        Lifetime { rx }
    }

    /// A lifetime that never ends.
    pub fn never() -> Lifetime {
        let (_tx, rx) = channel::<()>();
        Lifetime { rx }
    }

    pub fn has_ended(&self) -> bool {
        self.rx.is_closed()
    }

    /// Run `f` when the lifetime ends: exactly once, immediately if it has
    /// already ended. Dropping the returned [`Subscription`] cancels the
    /// hook.
    pub fn on_end<F>(&self, f: F) -> Subscription
    where
        F: FnOnce() + Transmission,
    {
        self.rx.respond_with_close(|_| {}, f)
    }
}
