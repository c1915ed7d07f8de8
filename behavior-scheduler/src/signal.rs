// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Named entity signals
//!
//! A signal is a named event addressed to specific entities. Consumers
//! subscribe once with the list of names they care about and receive their own
//! queue; a signal is copied into the queue of every subscriber of its name.
//! Queued signals stay there until the subscriber drains them, which is the
//! subscriber's next scheduling opportunity.
//!
//! Delayed signals are held in a min-heap keyed by due time and moved into the
//! queues by [`SignalBus::advance`]. Signals with equal due times are delivered
//! in the order they were scheduled.

use crate::ecs::Entity;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Name of a signal
pub type SignalName = &'static str;

/// Signals raised by the scheduler itself
pub mod signals {
    use super::SignalName;

    /// An entity finished cold start this frame
    pub const ACTIVATED: SignalName = "behavior.activated";

    /// An entity's machine did not settle and wants another evaluation
    pub const REEVALUATE: SignalName = "behavior.reevaluate";

    /// A delayed transition requested by a machine is due
    pub const DELAYED_TRANSITION_WAKEUP: SignalName = "behavior.delayed_transition_wakeup";
}

/// Handle to a subscriber queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    names: SmallVec<[SignalName; 4]>,
    queue: Vec<(Entity, SignalName)>,
}

struct DelayedSignal {
    due: f64,
    sequence: u64,
    name: SignalName,
    entity: Entity,
}

impl PartialEq for DelayedSignal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedSignal {}

impl PartialOrd for DelayedSignal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedSignal {
    // Reversed so the max-heap pops the earliest due time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Signal delivery with immediate and delayed sends
#[derive(Default)]
pub struct SignalBus {
    now: f64,
    subscribers: Vec<Subscriber>,
    delayed: BinaryHeap<DelayedSignal>,
    sequence: u64,
}

impl SignalBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for the given names
    pub fn subscribe(&mut self, names: &[SignalName]) -> SubscriberId {
        let mut unique: SmallVec<[SignalName; 4]> = SmallVec::new();
        for name in names {
            if !unique.contains(name) {
                unique.push(name);
            }
        }
        self.subscribers.push(Subscriber {
            names: unique,
            queue: Vec::new(),
        });
        SubscriberId(self.subscribers.len() - 1)
    }

    /// Names the subscriber listens to
    pub fn subscriptions(&self, id: SubscriberId) -> &[SignalName] {
        self.subscribers
            .get(id.0)
            .map(|s| s.names.as_slice())
            .unwrap_or(&[])
    }

    /// Current bus time, as last passed to [`advance`](Self::advance)
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move the clock to `now` and deliver every delayed signal that is due
    ///
    /// Returns the number of delayed signals delivered.
    pub fn advance(&mut self, now: f64) -> usize {
        self.now = now;
        let mut delivered = 0;
        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(signal) = self.delayed.pop() {
                self.signal_entity(signal.name, signal.entity);
                delivered += 1;
            }
        }
        delivered
    }

    /// Send `name` to one entity
    pub fn signal_entity(&mut self, name: SignalName, entity: Entity) {
        for subscriber in &mut self.subscribers {
            if subscriber.names.contains(&name) {
                subscriber.queue.push((entity, name));
            }
        }
    }

    /// Send `name` to every entity in `entities`
    pub fn signal_entities(&mut self, name: SignalName, entities: &[Entity]) {
        if entities.is_empty() {
            return;
        }
        for subscriber in &mut self.subscribers {
            if subscriber.names.contains(&name) {
                subscriber.queue.extend(entities.iter().map(|&e| (e, name)));
            }
        }
    }

    /// Send `name` to `entity` once `delay` seconds of bus time have passed
    ///
    /// Non-positive and NaN delays deliver immediately.
    pub fn delay_signal_entity(&mut self, name: SignalName, entity: Entity, delay: f64) {
        if delay.is_nan() || delay <= 0.0 {
            self.signal_entity(name, entity);
            return;
        }
        self.sequence += 1;
        self.delayed.push(DelayedSignal {
            due: self.now + delay,
            sequence: self.sequence,
            name,
            entity,
        });
    }

    /// Take every queued signal of a subscriber, in delivery order
    pub fn drain(&mut self, id: SubscriberId) -> Vec<(Entity, SignalName)> {
        self.subscribers
            .get_mut(id.0)
            .map(|s| std::mem::take(&mut s.queue))
            .unwrap_or_default()
    }

    /// Number of signals waiting in a subscriber's queue
    pub fn pending(&self, id: SubscriberId) -> usize {
        self.subscribers.get(id.0).map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Number of delayed signals not yet due
    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: SignalName = "test.ping";
    const PONG: SignalName = "test.pong";

    #[test]
    fn test_signals_reach_only_subscribers_of_name() {
        let mut bus = SignalBus::new();
        let pings = bus.subscribe(&[PING]);
        let both = bus.subscribe(&[PING, PONG, PING]);
        let e = Entity::new(1, 0);

        bus.signal_entity(PONG, e);
        bus.signal_entities(PING, &[e, Entity::new(2, 0)]);

        assert_eq!(bus.subscriptions(both), &[PING, PONG]);
        assert_eq!(bus.pending(pings), 2);
        assert_eq!(bus.drain(both).len(), 3);
        assert_eq!(bus.pending(both), 0);
        assert!(bus.drain(both).is_empty());
    }

    #[test]
    fn test_delayed_signal_waits_for_due_time() {
        let mut bus = SignalBus::new();
        let id = bus.subscribe(&[PING]);
        let e = Entity::new(4, 2);

        bus.advance(10.0);
        bus.delay_signal_entity(PING, e, 0.5);
        assert_eq!(bus.pending(id), 0);

        assert_eq!(bus.advance(10.25), 0);
        assert_eq!(bus.pending(id), 0);

        assert_eq!(bus.advance(10.5), 1);
        assert_eq!(bus.drain(id), vec![(e, PING)]);
        assert_eq!(bus.pending_delayed(), 0);
    }

    #[test]
    fn test_delayed_signals_deliver_in_due_order() {
        let mut bus = SignalBus::new();
        let id = bus.subscribe(&[PING]);
        let late = Entity::new(1, 0);
        let early = Entity::new(2, 0);
        let tie = Entity::new(3, 0);

        bus.delay_signal_entity(PING, late, 2.0);
        bus.delay_signal_entity(PING, early, 1.0);
        bus.delay_signal_entity(PING, tie, 1.0);
        bus.advance(5.0);

        let order: Vec<Entity> = bus.drain(id).into_iter().map(|(e, _)| e).collect();
        assert_eq!(order, vec![early, tie, late]);
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let mut bus = SignalBus::new();
        let id = bus.subscribe(&[PING]);
        bus.delay_signal_entity(PING, Entity::new(0, 0), 0.0);
        bus.delay_signal_entity(PING, Entity::new(0, 0), f64::NAN);
        assert_eq!(bus.pending(id), 2);
    }
}
