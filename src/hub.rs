//! In-process notification bridging.
//!
//! A [`Hub`] maps notification names to typed instant channels, so that
//! owners which cannot hand a change [`Receiver`] to their collaborators
//! directly can still publish through a shared place. Slots are created
//! lazily by whichever side shows up first.
//!
//! A name is bound to the value type it is first used with. Using it at any
//! other type afterwards is not an error: the post is dropped, or the
//! observation comes back as an always-empty stream, and one warning is
//! logged either way.
use std::{any::Any, collections::HashMap};

use crate::channel::{channel, new_shared, Counted, Receiver, Shared, Transmission, Transmitter};

#[cfg(not(target_arch = "wasm32"))]
type AnyHalf = Box<dyn Any + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type AnyHalf = Box<dyn Any>;

struct Slot {
    tx: AnyHalf,
    rx: AnyHalf,
    carries: &'static str,
}

impl Slot {
    fn of<T: Transmission>() -> Slot {
        let (tx, rx) = channel::<T>();
        Slot {
            tx: Box::new(tx),
            rx: Box::new(rx),
            carries: std::any::type_name::<T>(),
        }
    }

    fn transmitter<T: Transmission>(&self) -> Option<Transmitter<T>> {
        self.tx.downcast_ref::<Transmitter<T>>().cloned()
    }

    fn receiver<T: Transmission>(&self) -> Option<Receiver<T>> {
        self.rx.downcast_ref::<Receiver<T>>().map(|rx| rx.branch())
    }
}

/// Named, typed notification channels.
#[derive(Clone)]
pub struct Hub {
    slots: Counted<Shared<HashMap<String, Slot>>>,
}

impl Default for Hub {
    fn default() -> Self {
        Hub {
            slots: new_shared(HashMap::new()),
        }
    }
}

impl Hub {
    pub fn new() -> Hub {
        Default::default()
    }

    /// Post a notification, running every observer of `name` immediately.
    ///
    /// A post at the wrong type for `name` is dropped with a warning.
    pub fn post<T: Transmission>(&self, name: &str, value: &T) {
        let (tx, carries) = self.slots.visit_mut(|slots| {
            let slot = slots.entry(name.to_string()).or_insert_with(Slot::of::<T>);
            (slot.transmitter::<T>(), slot.carries)
        });
        match tx {
            // responders run outside the hub lock, observers may post
            Some(tx) => tx.send(value),
            None => log::warn!(
                "notification {:?} carries {}, not {} - dropping the post",
                name,
                carries,
                std::any::type_name::<T>(),
            ),
        }
    }

    /// The stream of notifications named `name`.
    ///
    /// Observing `name` at the wrong type yields an always-empty stream,
    /// born closed, with a warning - never an error.
    pub fn changes<T: Transmission>(&self, name: &str) -> Receiver<T> {
        let (rx, carries) = self.slots.visit_mut(|slots| {
            let slot = slots.entry(name.to_string()).or_insert_with(Slot::of::<T>);
            (slot.receiver::<T>(), slot.carries)
        });
        match rx {
            Some(rx) => rx,
            None => {
                log::warn!(
                    "notification {:?} carries {}, observed at {} - the stream will stay empty",
                    name,
                    carries,
                    std::any::type_name::<T>(),
                );
                let (tx, rx) = channel::<T>();
                tx.close();
                rx
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(not(target_arch = "wasm32"))] {
        lazy_static::lazy_static! {
            static ref GLOBAL: Hub = Hub::new();
        }

        /// The process-wide default hub.
        pub fn global() -> &'static Hub {
            &GLOBAL
        }
    }
}
