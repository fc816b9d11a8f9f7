//! Instant [`Transmitter`]s and [`Receiver`]s with drop-to-detach [`Subscription`]s.
use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use futures::StreamExt;

mod target;
pub use target::*;

use crate::{lifetime::Lifetime, scheduler::Scheduler};

/// The sending end of an instant channel.
pub struct Transmitter<A> {
    responders: Counted<Responders<A>>,
}

impl<A> Clone for Transmitter<A> {
    fn clone(&self) -> Self {
        Self {
            responders: self.responders.clone(),
        }
    }
}

impl<A> Default for Transmitter<A> {
    fn default() -> Self {
        Transmitter {
            responders: Default::default(),
        }
    }
}

impl<A: Transmission> Transmitter<A> {
    pub fn new() -> Transmitter<A> {
        Default::default()
    }

    /// Spawn a receiver for this transmitter.
    pub fn spawn_recv(&self) -> Receiver<A> {
        Receiver::from(self.responders.clone())
    }

    /// Send a message to any and all receivers of this transmitter.
    ///
    /// The responder closures of any downstream [`Receiver`]s are executed
    /// immediately, on the sending context. After [`Transmitter::close`] this
    /// is a no-op. A channel is expected to be fed from one context at a
    /// time; a responder still running on another context misses messages
    /// sent concurrently with its own run.
    pub fn send(&self, a: &A) {
        self.responders.send(a);
    }

    /// Send a bunch of messages.
    ///
    /// The responder closures of any downstream [`Receiver`]s are executed immediately.
    pub fn send_many(&self, msgs: &[A]) {
        msgs.iter().for_each(|msg| self.send(msg));
    }

    /// Close the channel. Terminal and idempotent.
    ///
    /// Every close hook registered through
    /// [`Receiver::respond_with_close`] runs exactly once, all responders are
    /// dropped (releasing whatever they captured), later sends are no-ops and
    /// later responders have their close hook run immediately.
    pub fn close(&self) {
        self.responders.close();
    }

    pub fn is_closed(&self) -> bool {
        self.responders.is_closed()
    }

    /// Drive a [`futures::Stream`] into this transmitter from a spawned task,
    /// closing the channel when the stream ends.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn send_stream<S>(&self, stream: S)
    where
        S: futures::Stream<Item = A> + Send + 'static,
    {
        let tx = self.clone();
        target::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(a) = stream.next().await {
                tx.send(&a);
            }
            tx.close();
        });
    }
    #[cfg(target_arch = "wasm32")]
    pub fn send_stream<S>(&self, stream: S)
    where
        S: futures::Stream<Item = A> + 'static,
    {
        let tx = self.clone();
        target::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(a) = stream.next().await {
                tx.send(&a);
            }
            tx.close();
        });
    }
}

/// A responder's handle on its registration: dropping it detaches the
/// responder from the channel.
///
/// Detaching stops further delivery from the holder's point of view. It does
/// not run the responder's close hook (detaching is not completion) and it
/// does not cancel work a responder already handed to another context.
#[must_use = "dropping a Subscription immediately detaches its responder"]
pub struct Subscription {
    remove: Option<Hook>,
}

impl Subscription {
    /// Create a subscription that runs `f` when dropped. For composing
    /// teardown that reaches beyond a single responder.
    pub fn new<F>(f: F) -> Subscription
    where
        F: FnOnce() + Transmission,
    {
        Subscription {
            remove: Some(Box::new(f)),
        }
    }

    /// Keep the responder attached for the remaining life of its channel
    /// without holding the subscription.
    pub fn forget(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

/// Receive messages instantly.
pub struct Receiver<A> {
    responders: Counted<Responders<A>>,
}

impl<A: Transmission> From<Counted<Responders<A>>> for Receiver<A> {
    fn from(responders: Counted<Responders<A>>) -> Receiver<A> {
        Receiver { responders }
    }
}

impl<A: Transmission> Clone for Receiver<A> {
    fn clone(&self) -> Self {
        Receiver::from(self.responders.clone())
    }
}

impl<A: Transmission> Default for Receiver<A> {
    fn default() -> Self {
        Receiver::from(Counted::new(Responders::default()))
    }
}

impl<A: Transmission> Receiver<A> {
    /// Create a new Receiver.
    pub fn new() -> Receiver<A> {
        Default::default()
    }

    /// Add a response to messages. Upon receiving a message the response
    /// runs immediately, on the sending context.
    pub fn respond<F>(&self, f: F) -> Subscription
    where
        F: FnMut(&A) + Transmission,
    {
        let k = self.responders.get_next_k();
        self.responders.insert(k, f);
        self.subscription(k)
    }

    /// Add a response to messages along with a hook that runs exactly once
    /// when the channel closes.
    ///
    /// If the channel has already closed, the hook runs immediately and the
    /// returned subscription is inert.
    pub fn respond_with_close<F, G>(&self, f: F, g: G) -> Subscription
    where
        F: FnMut(&A) + Transmission,
        G: FnOnce() + Transmission,
    {
        let k = self.responders.get_next_k();
        self.responders.insert_with_close(k, f, g);
        self.subscription(k)
    }

    /// Add a response that folds messages mutably over a shared variable.
    pub fn respond_shared<T, F>(&self, val: Counted<Shared<T>>, f: F) -> Subscription
    where
        T: 'static + Send,
        F: Fn(&mut T, &A) + Transmission,
    {
        self.respond(move |a: &A| {
            val.visit_mut(|t| f(t, a));
        })
    }

    fn subscription(&self, k: usize) -> Subscription {
        let responders = self.responders.downgrade();
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(responders) = responders.upgrade() {
                    responders.remove(k);
                }
            })),
        }
    }

    /// Spawn a new [`Transmitter`] that sends to this Receiver.
    pub fn new_trns(&self) -> Transmitter<A> {
        Transmitter {
            responders: self.responders.clone(),
        }
    }

    /// Branch a receiver off of the original.
    /// Each branch will receive from the same transmitter.
    pub fn branch(&self) -> Receiver<A> {
        Receiver::from(self.responders.clone())
    }

    /// Branch a new receiver off of an original using a stateless map
    /// function. All output of the map function is sent to the new receiver,
    /// and the new channel closes when the original does.
    pub fn branch_map<B, F>(&self, f: F) -> Receiver<B>
    where
        B: Transmission,
        F: Fn(&A) -> B + Transmission,
    {
        self.branch_filter_map(move |a| Some(f(a)))
    }

    /// Branch a new receiver off of an original using a stateless map
    /// function. `None` results are not sent to the new receiver.
    ///
    /// The new channel closes when the original does.
    pub fn branch_filter_map<B, F>(&self, f: F) -> Receiver<B>
    where
        B: Transmission,
        F: Fn(&A) -> Option<B> + Transmission,
    {
        let (tb, rb) = channel();
        let tx = tb.clone();
        self.respond_with_close(
            move |a| {
                if let Some(b) = f(a) {
                    tx.send(&b);
                }
            },
            move || tb.close(),
        )
        .forget();
        rb
    }

    /// Branch a new receiver that fires once per message with the payload
    /// erased.
    pub fn branch_void(&self) -> Receiver<()> {
        self.branch_map(|_| ())
    }

    /// Branch a new receiver that mirrors the original until `life` ends,
    /// then closes and detaches from the original.
    ///
    /// If `life` has already ended the new receiver is born closed.
    pub fn branch_until(&self, life: &Lifetime) -> Receiver<A> {
        let (tb, rb) = channel();
        if life.has_ended() {
            tb.close();
            return rb;
        }
        let tx = tb.clone();
        let tb_on_source_close = tb.clone();
        let sub = self.respond_with_close(move |a| tx.send(a), move || tb_on_source_close.close());
        life.on_end(move || {
            drop(sub);
            tb.close();
        })
        .forget();
        rb
    }

    /// Branch a new receiver whose messages are delivered through the given
    /// scheduler instead of on the sending context.
    ///
    /// Closing is delivered through the same scheduler, so on a serial
    /// scheduler it lands after every message sent before the close.
    pub fn branch_on(&self, scheduler: Scheduler) -> Receiver<A>
    where
        A: Clone,
    {
        let (tb, rb) = channel();
        let tx = tb.clone();
        self.respond_with_close(
            move |a| {
                let tx = tx.clone();
                let a = a.clone();
                scheduler.schedule(move || tx.send(&a));
            },
            move || scheduler.schedule(move || tb.close()),
        )
        .forget();
        rb
    }

    /// Merge all the receivers into one. Any time a message is received on
    /// any receiver, it will be sent to the returned receiver. The merged
    /// channel closes once every input has closed; merging no receivers
    /// yields a receiver that is born closed.
    pub fn merge<B>(rxs: Vec<Receiver<B>>) -> Receiver<B>
    where
        B: Transmission,
    {
        let (tx, rx) = channel();
        let total = rxs.len();
        if total == 0 {
            tx.close();
            return rx;
        }
        let closed = new_shared(0usize);
        for rx_inc in rxs.into_iter() {
            let tx_send = tx.clone();
            let tx_close = tx.clone();
            let closed = closed.clone();
            rx_inc
                .respond_with_close(
                    move |b| tx_send.send(b),
                    move || {
                        let all_closed = closed.visit_mut(|n| {
                            *n += 1;
                            *n == total
                        });
                        if all_closed {
                            tx_close.close();
                        }
                    },
                )
                .forget();
        }
        rx
    }

    pub fn is_closed(&self) -> bool {
        self.responders.is_closed()
    }

    /// Adapt this receiver into a pull-based [`futures::Stream`].
    ///
    /// Messages arriving between polls are buffered in order. The stream
    /// ends after the channel closes and the buffer drains. Dropping the
    /// stream detaches it from the channel.
    pub fn recv_stream(&self) -> ReceiverStream<A>
    where
        A: Clone,
    {
        let inner: Counted<Shared<StreamInner<A>>> = Counted::new(Shared::new(StreamInner {
            buffer: VecDeque::new(),
            waker: None,
            done: false,
        }));
        let on_msg = inner.clone();
        let on_close = inner.clone();
        let sub = self.respond_with_close(
            move |a: &A| {
                on_msg.visit_mut(|s| {
                    s.buffer.push_back(a.clone());
                    if let Some(waker) = s.waker.take() {
                        waker.wake();
                    }
                });
            },
            move || {
                on_close.visit_mut(|s| {
                    s.done = true;
                    if let Some(waker) = s.waker.take() {
                        waker.wake();
                    }
                });
            },
        );
        ReceiverStream { inner, _sub: sub }
    }
}

struct StreamInner<A> {
    buffer: VecDeque<A>,
    waker: Option<Waker>,
    done: bool,
}

/// A pull-based adapter over a [`Receiver`], created by
/// [`Receiver::recv_stream`].
pub struct ReceiverStream<A> {
    inner: Counted<Shared<StreamInner<A>>>,
    _sub: Subscription,
}

impl<A: Transmission> futures::Stream for ReceiverStream<A> {
    type Item = A;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.visit_mut(|s| match s.buffer.pop_front() {
            Some(a) => Poll::Ready(Some(a)),
            None if s.done => Poll::Ready(None),
            None => {
                s.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        })
    }
}

/// Create a linked `Transmitter<A>` and `Receiver<A>` pair.
pub fn channel<A>() -> (Transmitter<A>, Receiver<A>)
where
    A: Transmission,
{
    let trns: Transmitter<A> = Default::default();
    let recv = trns.spawn_recv();
    (trns, recv)
}

/// Helper for making thread-safe shared mutable variables.
pub fn new_shared<A: 'static>(init: A) -> Counted<Shared<A>> {
    Counted::new(Shared::new(init))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tx_sends_are_received_instantly() {
        let (tx, rx) = channel::<u32>();
        let seen = new_shared(Vec::<u32>::new());
        let _sub = rx.respond_shared(seen.clone(), |v, n| v.push(*n));
        tx.send(&1);
        tx.send_many(&[2, 3]);
        assert_eq!(seen.visit(|v| v.clone()), vec![1, 2, 3]);
    }

    #[test]
    fn dropping_a_subscription_detaches_its_responder() {
        let (tx, rx) = channel::<u32>();
        let count = new_shared(0u32);
        let sub = rx.respond_shared(count.clone(), |c, _| *c += 1);
        tx.send(&0);
        drop(sub);
        tx.send(&0);
        assert_eq!(count.visit(|c| *c), 1);
    }

    #[test]
    fn forgotten_subscriptions_live_as_long_as_the_channel() {
        let (tx, rx) = channel::<u32>();
        let count = new_shared(0u32);
        rx.respond_shared(count.clone(), |c, _| *c += 1).forget();
        tx.send(&0);
        tx.send(&0);
        assert_eq!(count.visit(|c| *c), 2);
    }

    #[test]
    fn close_is_terminal_and_idempotent() {
        let (tx, rx) = channel::<u32>();
        let count = new_shared(0u32);
        let closes = new_shared(0u32);
        let on_close = closes.clone();
        let seen = count.clone();
        let _sub = rx.respond_with_close(
            move |_| seen.visit_mut(|c| *c += 1),
            move || on_close.visit_mut(|c| *c += 1),
        );
        tx.send(&0);
        tx.close();
        tx.close();
        tx.send(&0);
        assert_eq!(count.visit(|c| *c), 1);
        assert_eq!(closes.visit(|c| *c), 1);
        assert!(tx.is_closed());
        assert!(rx.is_closed());
    }

    #[test]
    fn responding_after_close_fires_the_close_hook_immediately() {
        let (tx, rx) = channel::<u32>();
        tx.close();
        let flag = new_shared(false);
        let on_close = flag.clone();
        let _sub = rx.respond_with_close(|_| {}, move || on_close.visit_mut(|f| *f = true));
        assert!(flag.visit(|f| *f));
    }

    #[test]
    fn detaching_does_not_run_the_close_hook() {
        let (tx, rx) = channel::<u32>();
        let flag = new_shared(false);
        let on_close = flag.clone();
        let sub = rx.respond_with_close(|_| {}, move || on_close.visit_mut(|f| *f = true));
        drop(sub);
        tx.send(&0);
        assert!(!flag.visit(|f| *f));
    }

    #[test]
    fn detaching_then_closing_inside_the_callback_skips_the_close_hook() {
        let (tx, rx) = channel::<u32>();
        let hook_ran = new_shared(false);
        let on_close = hook_ran.clone();
        let slot = new_shared(None::<Subscription>);
        let held = slot.clone();
        let tx_inner = tx.clone();
        let sub = rx.respond_with_close(
            move |_| {
                held.visit_mut(|s| *s = None);
                tx_inner.close();
            },
            move || on_close.visit_mut(|f| *f = true),
        );
        slot.visit_mut(|s| *s = Some(sub));
        tx.send(&0);
        assert!(tx.is_closed());
        assert!(!hook_ran.visit(|f| *f));
    }

    #[test]
    fn responders_added_during_dispatch_see_only_later_messages() {
        let (tx, rx) = channel::<u32>();
        let seen = new_shared(Vec::<u32>::new());
        let held = new_shared(Vec::<Subscription>::new());
        let inner_seen = seen.clone();
        let inner_held = held.clone();
        let branch = rx.branch();
        let _outer = rx.respond(move |n| {
            if *n == 1 {
                let sub = branch.respond_shared(inner_seen.clone(), |v, m| v.push(*m));
                inner_held.visit_mut(|subs| subs.push(sub));
            }
        });
        tx.send(&1);
        tx.send(&2);
        assert_eq!(seen.visit(|v| v.clone()), vec![2]);
    }

    #[test]
    fn branch_map_transforms_and_propagates_close() {
        let (tx, rx) = channel::<u32>();
        let doubled = rx.branch_map(|n| n * 2);
        let seen = new_shared(Vec::<u32>::new());
        let ended = new_shared(false);
        let on_close = ended.clone();
        let sink = seen.clone();
        let _sub = doubled.respond_with_close(
            move |n| sink.visit_mut(|v| v.push(*n)),
            move || on_close.visit_mut(|e| *e = true),
        );
        tx.send(&2);
        tx.close();
        assert_eq!(seen.visit(|v| v.clone()), vec![4]);
        assert!(ended.visit(|e| *e));
    }

    #[test]
    fn branch_filter_map_drops_nones() {
        let (tx, rx) = channel::<u32>();
        let evens = rx.branch_filter_map(|n| if n % 2 == 0 { Some(*n) } else { None });
        let seen = new_shared(Vec::<u32>::new());
        let _sub = evens.respond_shared(seen.clone(), |v, n| v.push(*n));
        tx.send_many(&[1, 2, 3, 4]);
        assert_eq!(seen.visit(|v| v.clone()), vec![2, 4]);
    }

    #[test]
    fn branch_void_erases_the_payload() {
        let (tx, rx) = channel::<String>();
        let pings = rx.branch_void();
        let count = new_shared(0u32);
        let _sub = pings.respond_shared(count.clone(), |c, ()| *c += 1);
        tx.send(&"a".to_string());
        tx.send(&"b".to_string());
        assert_eq!(count.visit(|c| *c), 2);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn branch_on_background_keeps_order_past_a_slow_responder() {
        let (tx, rx) = channel::<u32>();
        let bg = rx.branch_on(Scheduler::Background);
        let (ack_tx, ack_rx) = std::sync::mpsc::channel::<u32>();
        let _sub = bg.respond(move |n| {
            if *n == 1 {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            let _ = ack_tx.send(*n);
        });
        tx.send(&1);
        tx.send(&2);
        let first = ack_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        let second = ack_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn merged_receivers_deliver_everything_and_close_together() {
        let (tx_a, rx_a) = channel::<u32>();
        let (tx_b, rx_b) = channel::<u32>();
        let merged = Receiver::<u32>::merge(vec![rx_a, rx_b]);
        let seen = new_shared(Vec::<u32>::new());
        let ended = new_shared(false);
        let on_close = ended.clone();
        let sink = seen.clone();
        let _sub = merged.respond_with_close(
            move |n| sink.visit_mut(|v| v.push(*n)),
            move || on_close.visit_mut(|e| *e = true),
        );
        tx_a.send(&1);
        tx_b.send(&2);
        tx_a.close();
        assert!(!ended.visit(|e| *e));
        tx_b.close();
        assert!(ended.visit(|e| *e));
        assert_eq!(seen.visit(|v| v.clone()), vec![1, 2]);
    }

    #[test]
    fn merging_nothing_yields_a_closed_receiver() {
        let merged: Receiver<u32> = Receiver::<u32>::merge(vec![]);
        assert!(merged.is_closed());
    }

    #[test]
    fn recv_stream_buffers_in_order_and_ends_at_close() {
        let (tx, rx) = channel::<u32>();
        let stream = rx.recv_stream();
        tx.send_many(&[1, 2, 3]);
        tx.close();
        let got: Vec<u32> = futures::executor::block_on(stream.collect());
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn new_shared_infers_its_type_from_the_initializer() {
        let count = new_shared(0usize);
        count.visit_mut(|c| *c += 1);
        assert_eq!(count.visit(|c| *c), 1);
    }

    #[cfg(all(feature = "async-smol", not(feature = "async-tokio")))]
    #[test]
    fn send_stream_drives_the_channel_and_closes_it() {
        let (tx, rx) = channel::<u32>();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let seen = new_shared(Vec::<u32>::new());
        let sink = seen.clone();
        let _sub = rx.respond_with_close(
            move |n| sink.visit_mut(|v| v.push(*n)),
            move || {
                let _ = done_tx.send(());
            },
        );
        tx.send_stream(futures::stream::iter(vec![1, 2, 3]));
        done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(seen.visit(|v| v.clone()), vec![1, 2, 3]);
    }
}
