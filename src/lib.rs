//! Reactive properties for plain owned objects.
//!
//! `tether` wraps a settable field of an object you already have as an
//! observable, drivable property - without taking ownership of the object
//! and without keeping it alive. It is the glue between "a struct with a
//! field" and "a stream of that field's values": read it live, replay it to
//! late subscribers, tie it to other streams, and let everything dissolve
//! on its own when the owner goes away.
//!
//! # Channels
//!
//! The base primitive is an instant channel. Sending runs every responder
//! immediately, on the sending context, and responding hands back a
//! [`Subscription`] that detaches on drop:
//!
//! ```rust
//! use tether::{channel, new_shared};
//!
//! let (tx, rx) = channel::<u32>();
//! let seen = new_shared(Vec::<u32>::new());
//! let _sub = rx.respond_shared(seen.clone(), |v, n| v.push(*n));
//! tx.send(&1);
//! tx.send(&2);
//! assert_eq!(seen.visit(|v| v.clone()), vec![1, 2]);
//! ```
//!
//! Channels close exactly once, and closing is observable after the fact,
//! which is what lets everything downstream complete instead of leaking.
//!
//! # Properties
//!
//! A [`MutableProperty`] ties together an owner (held weakly), an accessor,
//! a mutator, the field's change stream and the owner's [`Lifetime`]. The
//! [`WriteTarget`] it hands out applies incoming values to the field until
//! the lifetime ends, and silently drops them afterwards:
//!
//! ```rust
//! use tether::{channel, new_shared, Counted, LifetimeSource, Model, MutableProperty};
//!
//! struct Widget {
//!     name: Model<String>,
//!     life: LifetimeSource,
//! }
//!
//! let widget = Counted::new(Widget {
//!     name: Model::new("bar".to_string()),
//!     life: LifetimeSource::new(),
//! });
//!
//! let name = MutableProperty::new(
//!     &widget,
//!     widget.life.lifetime(),
//!     |w: &Widget| w.name.get(),
//!     |w: &Widget, v: String| {
//!         w.name.replace(v);
//!     },
//!     widget.name.changes(),
//!     None,
//! );
//!
//! assert_eq!(name.get().as_deref(), Some("bar"));
//!
//! // replay-then-follow: the snapshot first, then every change
//! let seen = new_shared(Vec::<String>::new());
//! let sink = seen.clone();
//! let _sub = name
//!     .replay()
//!     .subscribe(move |v| sink.visit_mut(|s| s.push(v.clone())));
//!
//! // drive the field from an external stream
//! let (tx, rx) = channel::<String>();
//! let _binding = name.write_target().bind(&rx);
//! tx.send(&"foo".to_string());
//! assert_eq!(name.get().as_deref(), Some("foo"));
//!
//! // releasing the owner ends its lifetime; the binding goes inert
//! drop(widget);
//! tx.send(&"baz".to_string());
//! assert_eq!(name.get(), None);
//! assert_eq!(
//!     seen.visit(|s| s.clone()),
//!     vec!["bar".to_string(), "foo".to_string()]
//! );
//! ```
//!
//! The owner embeds a [`Model`] for the field (so every mutation emits one
//! change message) and a [`LifetimeSource`] (so dropping the owner ends the
//! lifetime). Neither the property, nor its write target, nor any
//! subscription extends the owner's life.
//!
//! # Schedulers
//!
//! Delivery happens on the sending context unless a [`Scheduler`] says
//! otherwise - per property (write application) or per stream
//! ([`Receiver::branch_on`]):
//!
//! ```rust
//! use tether::{new_shared, Scheduler};
//!
//! let flag = new_shared(false);
//! let set = flag.clone();
//! Scheduler::Immediate.schedule(move || set.visit_mut(|f| *f = true));
//! assert!(flag.visit(|f| *f));
//! ```
//!
//! `Ui`, `Main`, `Background` and `BackgroundThenUi` deliver asynchronously;
//! see the [`scheduler`] module.
//!
//! # Notifications
//!
//! When an owner cannot hand its change stream around directly, a
//! [`hub::Hub`] bridges by name:
//!
//! ```rust
//! use tether::{hub::Hub, new_shared};
//!
//! let hub = Hub::new();
//! let seen = new_shared(0u32);
//! let _sub = hub
//!     .changes::<u32>("score.changed")
//!     .respond_shared(seen.clone(), |c, n| *c = *n);
//! hub.post("score.changed", &7u32);
//! assert_eq!(seen.visit(|c| *c), 7);
//! ```
mod channel;
pub mod hub;
pub mod lifetime;
pub mod model;
pub mod property;
pub mod scheduler;

pub use channel::*;
pub use lifetime::{Lifetime, LifetimeSource};
pub use model::Model;
pub use property::{MutableProperty, Property, Replay, WriteTarget};
pub use scheduler::{is_interactive_thread, Scheduler};
