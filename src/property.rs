//! Reactive views over single fields of owned objects.
//!
//! A property ties three things a constructing collaborator already has -
//! a counted owner, an accessor closure and a change [`Receiver`] - into one
//! value that can be read live, replayed-then-followed, or (for the mutable
//! flavor) driven from an external stream through a [`WriteTarget`].
//!
//! Properties never keep their owner alive. The owner is held through a
//! [`WeakCounted`] and every dereference is preceded by an upgrade, so the
//! worst that can happen after the owner is gone is a `None` read or a
//! silently dropped write. The mutable flavor additionally carries the
//! owner's [`Lifetime`]: its change stream closes and its write targets go
//! permanently inert the moment the lifetime ends, with no caller action.
use crate::{
    channel::{new_shared, Counted, Receiver, Subscription, Transmission, WeakCounted},
    lifetime::Lifetime,
    scheduler::Scheduler,
};

#[cfg(not(target_arch = "wasm32"))]
type ReadFn<O, T> = Box<dyn Fn(&O) -> T + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type ReadFn<O, T> = Box<dyn Fn(&O) -> T>;

#[cfg(not(target_arch = "wasm32"))]
type WriteFn<O, T> = Box<dyn Fn(&O, T) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type WriteFn<O, T> = Box<dyn Fn(&O, T)>;

#[cfg(not(target_arch = "wasm32"))]
type SnapFn<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type SnapFn<T> = Box<dyn Fn() -> Option<T>>;

/// A read-only reactive view of one field of an owner object.
pub struct Property<O, T> {
    owner: WeakCounted<O>,
    read: Counted<ReadFn<O, T>>,
    changes: Receiver<T>,
}

impl<O, T: Transmission> Clone for Property<O, T> {
    fn clone(&self) -> Self {
        Property {
            owner: self.owner.clone(),
            read: self.read.clone(),
            changes: self.changes.clone(),
        }
    }
}

impl<O: Transmission, T: Transmission> Property<O, T> {
    /// Wrap a field of `owner`.
    ///
    /// `read` must be a pure accessor. `changes` is the field's change
    /// stream; the contract on the caller is that every successful mutation
    /// of the field is followed by exactly one message carrying the new
    /// value, and that the stream closes when the owner's lifetime ends.
    /// Fields kept in a [`Model`](crate::model::Model) satisfy the first
    /// half by construction, [`Receiver::branch_until`] the second.
    pub fn new<F>(owner: &Counted<O>, read: F, changes: Receiver<T>) -> Property<O, T>
    where
        F: Fn(&O) -> T + Transmission,
    {
        let read: ReadFn<O, T> = Box::new(read);
        Property {
            owner: owner.downgrade(),
            read: Counted::new(read),
            changes,
        }
    }

    /// Read the field live: `Some` while the owner is alive, `None` after.
    pub fn get(&self) -> Option<T> {
        let owner = self.owner.upgrade()?;
        Some((*self.read)(&owner))
    }

    /// A cold stream of the field's values: each subscription replays the
    /// value current at subscription time, then follows every change.
    pub fn replay(&self) -> Replay<T> {
        let owner = self.owner.clone();
        let read = self.read.clone();
        let now: SnapFn<T> = Box::new(move || owner.upgrade().map(|o| (*read)(&o)));
        Replay {
            now: Counted::new(now),
            later: self.changes.branch(),
        }
    }

    /// A stream that fires once per change with the payload erased.
    pub fn changed(&self) -> Receiver<()> {
        self.changes.branch_void()
    }
}

/// A read-write reactive view of one field of an owner object.
///
/// On top of [`Property`] this carries a mutator, the owner's [`Lifetime`]
/// and an optional delivery [`Scheduler`] for writes arriving through a
/// [`WriteTarget`]. The change stream handed in at construction is bounded
/// by the lifetime immediately, so everything derived from this property
/// completes on its own when the owner goes away.
pub struct MutableProperty<O, T> {
    owner: WeakCounted<O>,
    read: Counted<ReadFn<O, T>>,
    write: Counted<WriteFn<O, T>>,
    changes: Receiver<T>,
    life: Lifetime,
    deliver: Option<Scheduler>,
}

impl<O, T: Transmission> Clone for MutableProperty<O, T> {
    fn clone(&self) -> Self {
        MutableProperty {
            owner: self.owner.clone(),
            read: self.read.clone(),
            write: self.write.clone(),
            changes: self.changes.clone(),
            life: self.life.clone(),
            deliver: self.deliver,
        }
    }
}

impl<O: Transmission, T: Transmission> MutableProperty<O, T> {
    /// Wrap a settable field of `owner`.
    ///
    /// `read` and `changes` are as in [`Property::new`]. `write` applies a
    /// new value to the field and is expected to cause the one change
    /// message the contract asks for. `life` is the owner's lifetime;
    /// `deliver` names the context write-target sends are applied on, with
    /// `None` meaning the sending context, immediately.
    pub fn new<F, G>(
        owner: &Counted<O>,
        life: Lifetime,
        read: F,
        write: G,
        changes: Receiver<T>,
        deliver: Option<Scheduler>,
    ) -> MutableProperty<O, T>
    where
        F: Fn(&O) -> T + Transmission,
        G: Fn(&O, T) + Transmission,
    {
        let read: ReadFn<O, T> = Box::new(read);
        let write: WriteFn<O, T> = Box::new(write);
        let changes = changes.branch_until(&life);
        MutableProperty {
            owner: owner.downgrade(),
            read: Counted::new(read),
            write: Counted::new(write),
            changes,
            life,
            deliver,
        }
    }

    /// Read the field live: `Some` while the owner is alive, `None` after.
    pub fn get(&self) -> Option<T> {
        let owner = self.owner.upgrade()?;
        Some((*self.read)(&owner))
    }

    /// Apply the mutator synchronously on the calling context.
    ///
    /// This is the direct-write path: it ignores the delivery scheduler.
    /// A silent no-op once the owner is gone.
    pub fn set(&self, value: T) {
        if let Some(owner) = self.owner.upgrade() {
            (*self.write)(&owner, value);
        }
    }

    /// The read-only view of the same field.
    pub fn read(&self) -> Property<O, T> {
        Property {
            owner: self.owner.clone(),
            read: self.read.clone(),
            changes: self.changes.branch(),
        }
    }

    /// A cold stream of the field's values: each subscription replays the
    /// value current at subscription time, then follows every change, and
    /// completes when the owner's lifetime ends.
    pub fn replay(&self) -> Replay<T> {
        self.read().replay()
    }

    /// A stream that fires once per change with the payload erased.
    pub fn changed(&self) -> Receiver<()> {
        self.changes.branch_void()
    }

    /// The owner's lifetime.
    pub fn lifetime(&self) -> Lifetime {
        self.life.clone()
    }

    /// The consumer half of the property: a sink that applies received
    /// values to the field.
    pub fn write_target(&self) -> WriteTarget<O, T> {
        WriteTarget {
            owner: self.owner.clone(),
            write: self.write.clone(),
            deliver: self.deliver,
            life: self.life.clone(),
        }
    }
}

/// A sink that writes received values into one field of an owner it does
/// not keep alive.
///
/// Active until the owner's lifetime ends, then permanently inert: values
/// sent afterwards are dropped without a write, an error or a panic. The
/// owner is re-upgraded at application time - after the scheduler hop, when
/// there is one - so the field of a deallocated owner is never touched.
pub struct WriteTarget<O, T> {
    owner: WeakCounted<O>,
    write: Counted<WriteFn<O, T>>,
    deliver: Option<Scheduler>,
    life: Lifetime,
}

impl<O, T> Clone for WriteTarget<O, T> {
    fn clone(&self) -> Self {
        WriteTarget {
            owner: self.owner.clone(),
            write: self.write.clone(),
            deliver: self.deliver,
            life: self.life.clone(),
        }
    }
}

impl<O: Transmission, T: Transmission> WriteTarget<O, T> {
    /// Apply `value` to the field, through the delivery scheduler when the
    /// property has one. Infallible: once the lifetime has ended, or after
    /// the owner is gone, the value is silently dropped.
    pub fn send(&self, value: T) {
        if self.life.has_ended() {
            return;
        }
        match self.deliver {
            None => self.apply(value),
            Some(scheduler) => {
                let target = self.clone();
                scheduler.schedule(move || target.apply(value));
            }
        }
    }

    fn apply(&self, value: T) {
        if self.life.has_ended() {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            (*self.write)(&owner, value);
        }
    }

    /// Forward every message of `rx` into [`WriteTarget::send`].
    ///
    /// The forwarding responder detaches on its own when the owner's
    /// lifetime ends; dropping the returned subscription detaches it
    /// earlier.
    pub fn bind(&self, rx: &Receiver<T>) -> Subscription
    where
        T: Clone,
    {
        let target = self.clone();
        let sub = rx.respond(move |v| target.send(v.clone()));
        let slot = new_shared(Some(sub));
        let unbind = slot.clone();
        let gate = self.life.on_end(move || unbind.visit_mut(|s| *s = None));
        Subscription::new(move || {
            slot.visit_mut(|s| *s = None);
            // the lifetime hook goes with the binding it guards
            drop(gate);
        })
    }
}

/// A cold, replay-then-follow stream of a property's values, from
/// [`Property::replay`].
///
/// Every subscription independently snapshots the value current at
/// subscription time: two subscriptions taken around a change legitimately
/// start from different values. The snapshot is skipped when the owner is
/// already gone.
pub struct Replay<T> {
    now: Counted<SnapFn<T>>,
    later: Receiver<T>,
}

impl<T: Transmission> Clone for Replay<T> {
    fn clone(&self) -> Self {
        Replay {
            now: self.now.clone(),
            later: self.later.clone(),
        }
    }
}

impl<T: Transmission> Replay<T> {
    /// Replay the current value to `f`, then run `f` for every subsequent
    /// change until the subscription drops or the stream completes.
    pub fn subscribe<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(&T) + Transmission,
    {
        if let Some(now) = (*self.now)() {
            f(&now);
        }
        self.later.respond(f)
    }

    /// Like [`Replay::subscribe`], with a hook that runs exactly once when
    /// the stream completes - immediately, if it already has.
    pub fn subscribe_with_close<F, G>(&self, mut f: F, g: G) -> Subscription
    where
        F: FnMut(&T) + Transmission,
        G: FnOnce() + Transmission,
    {
        if let Some(now) = (*self.now)() {
            f(&now);
        }
        self.later.respond_with_close(f, g)
    }

    /// The pull-based variant: a [`futures::Stream`] yielding the
    /// subscription-time snapshot, then every change, ending when the
    /// change stream closes.
    pub fn recv_stream(&self) -> impl futures::Stream<Item = T>
    where
        T: Clone,
    {
        use futures::StreamExt;
        let now = (*self.now)();
        let later = self.later.recv_stream();
        futures::stream::iter(now).chain(later)
    }
}
