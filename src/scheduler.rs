//! Named delivery contexts for responder callbacks.
//!
//! Everything in this library runs callbacks on the sending context unless
//! told otherwise. A [`Scheduler`] is how a call site says otherwise: it
//! names one of a closed set of delivery contexts and
//! [`Scheduler::schedule`] hands a closure to it. Scheduling never blocks
//! the caller.

/// The closed set of contexts that can run a scheduled closure.
///
/// Two process-global serial workers back the named contexts, each
/// started on first use. The interactive thread stands in for wherever
/// the embedding application handles its user interaction;
/// [`Scheduler::Ui`] and [`Scheduler::Main`] both target it, differing
/// only in whether a closure scheduled from the interactive thread
/// itself runs in place or goes to the back of the queue. The
/// background thread runs everything scheduled as
/// [`Scheduler::Background`], in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheduler {
    /// On the calling context, synchronously.
    Immediate,
    /// On the interactive thread; in place when already on it.
    Ui,
    /// On the interactive thread, always enqueued, FIFO.
    Main,
    /// On the background thread, always enqueued, FIFO.
    Background,
    /// A hop through the background thread, then delivery as
    /// [`Scheduler::Ui`].
    BackgroundThenUi,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        impl Scheduler {
            /// Run `f` on the named context.
            ///
            /// There is only one thread here, so every non-immediate
            /// context degrades to a local spawn.
            pub fn schedule<F>(self, f: F)
            where
                F: FnOnce() + 'static,
            {
                match self {
                    Scheduler::Immediate => f(),
                    _ => crate::channel::spawn(async move { f() }),
                }
            }
        }

        /// Whether the current thread is the interactive thread.
        pub fn is_interactive_thread() -> bool {
            true
        }
    } else {
        type Task = Box<dyn FnOnce() + Send>;

        struct SerialQueue {
            sender: std::sync::mpsc::Sender<Task>,
            thread_id: std::thread::ThreadId,
            label: &'static str,
        }

        impl SerialQueue {
            fn start(name: &'static str) -> SerialQueue {
                let (sender, receiver) = std::sync::mpsc::channel::<Task>();
                let handle = std::thread::Builder::new()
                    .name(name.into())
                    .spawn(move || {
                        for task in receiver.iter() {
                            // a panicking task must not take the worker
                            // down with it
                            let caught = std::panic::catch_unwind(
                                std::panic::AssertUnwindSafe(task),
                            );
                            if caught.is_err() {
                                log::error!("a task panicked on the {} thread", name);
                            }
                        }
                    })
                    .expect("could not spawn a scheduler thread");
                let thread_id = handle.thread().id();
                SerialQueue { sender, thread_id, label: name }
            }

            fn push(&self, task: Task) {
                if self.sender.send(task).is_err() {
                    log::error!("the {} thread is gone - dropping a scheduled task", self.label);
                }
            }
        }

        lazy_static::lazy_static! {
            static ref INTERACTIVE: SerialQueue = SerialQueue::start("tether-interactive");
            static ref BACKGROUND: SerialQueue = SerialQueue::start("tether-background");
        }

        /// Whether the current thread is the interactive thread.
        pub fn is_interactive_thread() -> bool {
            std::thread::current().id() == INTERACTIVE.thread_id
        }

        impl Scheduler {
            /// Run `f` on the named context.
            ///
            /// Never blocks. `Immediate` runs `f` before returning; every
            /// other context receives it asynchronously.
            pub fn schedule<F>(self, f: F)
            where
                F: FnOnce() + Send + 'static,
            {
                match self {
                    Scheduler::Immediate => f(),
                    Scheduler::Ui => {
                        if is_interactive_thread() {
                            f()
                        } else {
                            INTERACTIVE.push(Box::new(f));
                        }
                    }
                    Scheduler::Main => INTERACTIVE.push(Box::new(f)),
                    Scheduler::Background => BACKGROUND.push(Box::new(f)),
                    Scheduler::BackgroundThenUi => {
                        BACKGROUND.push(Box::new(move || Scheduler::Ui.schedule(f)))
                    }
                }
            }
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn immediate_runs_in_place() {
        let flag = crate::channel::new_shared(false);
        let set = flag.clone();
        Scheduler::Immediate.schedule(move || set.visit_mut(|f| *f = true));
        assert!(flag.visit(|f| *f));
    }

    #[test]
    fn main_is_fifo() {
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        for n in 0..5u32 {
            let tx = tx.clone();
            Scheduler::Main.schedule(move || {
                let _ = tx.send(n);
            });
        }
        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ui_runs_in_place_when_already_interactive() {
        let (tx, rx) = std::sync::mpsc::channel::<bool>();
        Scheduler::Main.schedule(move || {
            let ran = crate::channel::new_shared(false);
            let set = ran.clone();
            Scheduler::Ui.schedule(move || set.visit_mut(|f| *f = true));
            let _ = tx.send(ran.visit(|f| *f));
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn ui_is_delivered_from_any_thread() {
        let (tx, rx) = std::sync::mpsc::channel::<bool>();
        Scheduler::Ui.schedule(move || {
            let _ = tx.send(is_interactive_thread());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn background_runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let (tx, rx) = std::sync::mpsc::channel();
        Scheduler::Background.schedule(move || {
            let _ = tx.send(std::thread::current().id());
        });
        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(caller, ran_on);
    }

    #[test]
    fn background_is_fifo() {
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        for n in 0..5u32 {
            let tx = tx.clone();
            Scheduler::Background.schedule(move || {
                let _ = tx.send(n);
            });
        }
        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn background_then_ui_lands_on_the_interactive_thread() {
        let (tx, rx) = std::sync::mpsc::channel::<bool>();
        Scheduler::BackgroundThenUi.schedule(move || {
            let _ = tx.send(is_interactive_thread());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_worker() {
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        Scheduler::Background.schedule(|| panic!("boom"));
        Scheduler::Background.schedule(move || {
            let _ = tx.send(7);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }
}
