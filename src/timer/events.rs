//! Timer notifications and their registrations

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Payload of a countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Time left in the current run
    pub remaining_ms: u64,
    /// Time elapsed in the current run
    pub elapsed_ms: u64,
    /// Volume ratio in `(0.0, 1.0]` while inside the fade-out window
    pub fade_out: Option<f32>,
}

/// Events emitted by a running timer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimerEvent {
    /// One second of the countdown elapsed
    Tick(TickEvent),

    /// The countdown reached zero on its own. Never sent on cancellation.
    Finished {
        /// Whether the owner should stop playback
        auto_stop: bool,
    },
}

/// Identifies a listener added with `SleepTimer::add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type TickCallback = Box<dyn FnMut(u64)>;
pub(crate) type FinishCallback = Box<dyn FnMut()>;
pub(crate) type Listener = Box<dyn FnMut(&TimerEvent)>;

/// Callbacks lifted out of the registry while they run
pub(crate) struct Taken {
    epoch: u64,
    on_tick: Option<TickCallback>,
    on_finish: Option<FinishCallback>,
    listeners: Vec<(ListenerId, Listener)>,
}

impl Taken {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Invoke every callback, stopping early once `registered` reports a `clear`
    pub(crate) fn dispatch(&mut self, event: &TimerEvent, registered: impl Fn() -> bool) {
        match event {
            TimerEvent::Tick(tick) => {
                if let Some(on_tick) = self.on_tick.as_mut() {
                    on_tick(tick.remaining_ms);
                }
            }
            TimerEvent::Finished { .. } => {
                if let Some(on_finish) = self.on_finish.as_mut() {
                    on_finish();
                }
            }
        }
        for (_, listener) in self.listeners.iter_mut() {
            if !registered() {
                return;
            }
            listener(event);
        }
    }
}

/// Every registration the timer notifies
///
/// Callbacks are taken out while they run so they can call back into the
/// timer, then put back unless `clear` happened in between.
#[derive(Default)]
pub(crate) struct Notifier {
    on_tick: Option<TickCallback>,
    on_finish: Option<FinishCallback>,
    listeners: Vec<(ListenerId, Listener)>,
    removed_during_dispatch: Vec<ListenerId>,
    subscribers: Vec<mpsc::UnboundedSender<TimerEvent>>,
    next_id: u64,
    epoch: u64,
}

impl Notifier {
    pub(crate) fn set_on_tick(&mut self, callback: TickCallback) {
        self.on_tick = Some(callback);
    }

    pub(crate) fn set_on_finish(&mut self, callback: FinishCallback) {
        self.on_finish = Some(callback);
    }

    pub(crate) fn add_listener(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns true when the listener was found in the registry itself
    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        if self.listeners.len() != before {
            return true;
        }
        // The listener may be lifted out for a dispatch right now.
        if id.0 < self.next_id && !self.removed_during_dispatch.contains(&id) {
            self.removed_during_dispatch.push(id);
        }
        false
    }

    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TimerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Send to channel subscribers, dropping the ones whose receiver is gone
    pub(crate) fn send_to_subscribers(&mut self, event: &TimerEvent) {
        self.subscribers.retain(|tx| {
            let delivered = tx.send(*event).is_ok();
            if !delivered {
                warn!("Dropping closed timer event subscriber");
            }
            delivered
        });
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn take(&mut self) -> Taken {
        self.removed_during_dispatch.clear();
        Taken {
            epoch: self.epoch,
            on_tick: self.on_tick.take(),
            on_finish: self.on_finish.take(),
            listeners: std::mem::take(&mut self.listeners),
        }
    }

    /// Put callbacks back after a dispatch
    ///
    /// Registrations made during the dispatch win over the restored ones.
    pub(crate) fn restore(&mut self, taken: Taken) {
        if taken.epoch != self.epoch {
            return;
        }
        if self.on_tick.is_none() {
            self.on_tick = taken.on_tick;
        }
        if self.on_finish.is_none() {
            self.on_finish = taken.on_finish;
        }

        let removed = std::mem::take(&mut self.removed_during_dispatch);
        let added = std::mem::take(&mut self.listeners);
        self.listeners = taken
            .listeners
            .into_iter()
            .filter(|(id, _)| !removed.contains(id))
            .chain(added)
            .collect();
    }

    /// Drop every registration
    pub(crate) fn clear(&mut self) {
        self.on_tick = None;
        self.on_finish = None;
        self.listeners.clear();
        self.removed_during_dispatch.clear();
        self.subscribers.clear();
        self.epoch += 1;
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn tick(remaining_ms: u64) -> TimerEvent {
        TimerEvent::Tick(TickEvent {
            remaining_ms,
            elapsed_ms: 0,
            fade_out: None,
        })
    }

    #[test]
    fn dispatch_reaches_slots_and_listeners() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = Notifier::default();

        let l = Rc::clone(&log);
        notifier.set_on_tick(Box::new(move |ms: u64| l.borrow_mut().push(format!("tick {}", ms))));
        let l = Rc::clone(&log);
        notifier.set_on_finish(Box::new(move || l.borrow_mut().push("finish".to_string())));
        let l = Rc::clone(&log);
        notifier.add_listener(Box::new(move |event: &TimerEvent| l.borrow_mut().push(format!("{:?}", event))));

        let mut taken = notifier.take();
        taken.dispatch(&tick(2000), || true);
        taken.dispatch(&TimerEvent::Finished { auto_stop: true }, || true);
        notifier.restore(taken);

        let log = log.borrow();
        assert_eq!(log[0], "tick 2000");
        assert!(log[1].starts_with("Tick"));
        assert_eq!(log[2], "finish");
        assert_eq!(log[3], "Finished { auto_stop: true }");
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn clear_during_dispatch_wins() {
        let mut notifier = Notifier::default();
        notifier.set_on_tick(Box::new(|_: u64| {}));
        notifier.add_listener(Box::new(|_: &TimerEvent| {}));

        let taken = notifier.take();
        notifier.clear();
        notifier.restore(taken);

        assert_eq!(notifier.listener_count(), 0);
        assert!(notifier.on_tick.is_none());
    }

    #[test]
    fn dispatch_keeps_added_and_drops_removed_listeners() {
        let mut notifier = Notifier::default();
        let first = notifier.add_listener(Box::new(|_: &TimerEvent| {}));

        let taken = notifier.take();
        notifier.add_listener(Box::new(|_: &TimerEvent| {}));
        assert!(!notifier.remove_listener(first));
        notifier.restore(taken);

        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let mut notifier = Notifier::default();
        let mut open = notifier.subscribe();
        drop(notifier.subscribe());

        notifier.send_to_subscribers(&tick(1000));
        assert_eq!(notifier.subscribers.len(), 1);
        assert_eq!(open.try_recv().unwrap(), tick(1000));
    }
}
