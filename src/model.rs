//! Observable values for owner objects.
//!
//! A [`Model`] is a shared value linked to a channel: every mutation made
//! through it is followed by exactly one message carrying the new value.
//! Owner types embed models for the fields they want to expose as reactive
//! properties, which upholds the mutate-then-emit contract those properties
//! rely on without any further bookkeeping.
use crate::channel::{channel, new_shared, Counted, Receiver, Shared, Transmission, Transmitter};

/// A shared value that transmits itself on every change.
pub struct Model<T> {
    value: Counted<Shared<T>>,
    trns: Transmitter<T>,
    recv: Receiver<T>,
}

impl<T: Clone + Transmission> Clone for Model<T> {
    fn clone(&self) -> Self {
        Model {
            value: self.value.clone(),
            trns: self.trns.clone(),
            recv: self.recv.clone(),
        }
    }
}

impl<T: Clone + Transmission> Model<T> {
    /// Create a new model with an initial value.
    pub fn new(t: T) -> Model<T> {
        let (trns, recv) = channel();
        Model {
            value: new_shared(t),
            trns,
            recv,
        }
    }

    /// Clone the current value out.
    pub fn get(&self) -> T {
        self.value.visit(T::clone)
    }

    /// Visit the value with a closure that may return something.
    pub fn visit<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&T) -> A,
    {
        self.value.visit(f)
    }

    /// Mutate the value in place, then transmit the result.
    ///
    /// The mutation is visible to [`Model::get`] before any responder runs.
    pub fn visit_mut<F, A>(&self, f: F) -> A
    where
        A: 'static,
        F: FnOnce(&mut T) -> A,
    {
        let a = self.value.visit_mut(f);
        let now = self.value.visit(T::clone);
        self.trns.send(&now);
        a
    }

    /// Replace the value wholesale, transmitting the new value and returning
    /// the old one.
    pub fn replace(&self, t: T) -> T {
        let prev = self.value.visit_mut(|v| std::mem::replace(v, t));
        let now = self.value.visit(T::clone);
        self.trns.send(&now);
        prev
    }

    /// Replace the value with the result of a closure over the current
    /// value, transmitting the new value and returning the old one.
    pub fn replace_with<F>(&self, f: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let next = self.value.visit(|v| f(v));
        self.replace(next)
    }

    /// A receiver carrying every subsequent change, one message per
    /// mutation.
    pub fn changes(&self) -> Receiver<T> {
        self.recv.branch()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mutations_are_visible_before_any_subscriber_runs() {
        let model = Model::new("bar".to_string());
        model.replace("foo".to_string());
        assert_eq!(model.get(), "foo");
    }

    #[test]
    fn replace_transmits_the_new_value_and_returns_the_old() {
        let model = Model::new(1u32);
        let seen = new_shared(Vec::<u32>::new());
        let _sub = model.changes().respond_shared(seen.clone(), |v, n| v.push(*n));
        let old = model.replace(2);
        assert_eq!(old, 1);
        assert_eq!(seen.visit(|v| v.clone()), vec![2]);
    }

    #[test]
    fn visit_mut_transmits_exactly_once() {
        let model = Model::new(vec![1u32]);
        let count = new_shared(0u32);
        let _sub = model.changes().respond_shared(count.clone(), |c, _| *c += 1);
        model.visit_mut(|v| v.push(2));
        assert_eq!(count.visit(|c| *c), 1);
        assert_eq!(model.get(), vec![1, 2]);
    }

    #[test]
    fn replace_with_folds_over_the_current_value() {
        let model = Model::new(10u32);
        model.replace_with(|n| n + 1);
        assert_eq!(model.get(), 11);
    }

    #[test]
    fn every_branch_of_changes_hears_every_mutation() {
        let model = Model::new(0u32);
        let a = new_shared(0u32);
        let b = new_shared(0u32);
        let _sub_a = model.changes().respond_shared(a.clone(), |c, n| *c = *n);
        let _sub_b = model.changes().respond_shared(b.clone(), |c, n| *c = *n);
        model.replace(7);
        assert_eq!(a.visit(|c| *c), 7);
        assert_eq!(b.visit(|c| *c), 7);
    }
}
