//! Serialized callback dispatch
//!
//! Reactor events and the deliveries produced by application calls meet in
//! one place. Stream tables turn reactor events into deliveries while holding
//! their own lock and queue them here in the same critical section, so the
//! inbox holds each handle's deliveries in stream order.
//!
//! Only one dispatcher runs at a time and every callback runs under the
//! callback lock. `unregister` takes the same lock before it touches the
//! registration table: once it returns, no callback for the handle is running
//! and none will start.

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use reactor::{Reactor, ReactorEvent};
use crate::error::{OmmError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use watchlist::{Delivery, Effects, Violation};

/// Cadence of request timeout checks
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one `dispatch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one callback ran
    Dispatched,
    TimedOut,
}

pub(crate) enum Pending {
    Deliver(Delivery),
    Violation(Violation),
}

/// Stream tables and callbacks of one consumer or provider
pub(crate) trait DispatchTarget {
    fn reactor(&self) -> &Reactor;

    fn dispatcher(&self) -> &Dispatcher;

    /// Feed one reactor event into the stream tables
    fn on_event(&self, event: ReactorEvent);

    fn on_tick(&self, _now: Instant) {}

    /// Run the application callback for one queued item; false if it was dropped
    fn deliver(&self, pending: Pending) -> bool;
}

pub(crate) struct Dispatcher {
    inbox: Sender<Pending>,
    queued: Receiver<Pending>,
    running: Mutex<()>,
    callbacks: ReentrantMutex<()>,
    last_tick: Mutex<Instant>,
    stopped: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (inbox, queued) = crossbeam_channel::unbounded();
        Self {
            inbox,
            queued,
            running: Mutex::new(()),
            callbacks: ReentrantMutex::new(()),
            last_tick: Mutex::new(Instant::now()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Queue the deliveries and violations of `effects`
    ///
    /// Call while holding the lock of the stream table that produced them.
    pub fn enqueue(&self, effects: Effects) {
        for delivery in effects.deliveries {
            let _ = self.inbox.send(Pending::Deliver(delivery));
        }
        for violation in effects.violations {
            let _ = self.inbox.send(Pending::Violation(violation));
        }
    }

    /// Held while a callback runs; reentrant so callbacks can call back in
    pub fn callback_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.callbacks.lock()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Process events until a callback ran or `timeout` passed
    ///
    /// A second caller, a callback on the dispatching thread included, waits
    /// for the first and times out rather than dispatching concurrently.
    pub fn dispatch<T: DispatchTarget + ?Sized>(&self, target: &T, timeout: Duration) -> DispatchOutcome {
        let deadline = Instant::now() + timeout;
        let Some(_running) = self.running.try_lock_for(timeout) else {
            return DispatchOutcome::TimedOut;
        };
        let mut dispatched = false;
        while !self.is_stopped() {
            self.tick(target);
            while let Ok(pending) = self.queued.try_recv() {
                dispatched |= self.deliver(target, pending);
            }
            let now = Instant::now();
            if dispatched || now >= deadline {
                break;
            }
            let wait = (deadline - now).min(TICK_INTERVAL);
            select! {
                recv(target.reactor().events()) -> event => {
                    if let Ok(event) = event {
                        target.on_event(event);
                    }
                }
                recv(self.queued) -> pending => {
                    if let Ok(pending) = pending {
                        dispatched |= self.deliver(target, pending);
                    }
                }
                default(wait) => {}
            }
        }
        if dispatched {
            DispatchOutcome::Dispatched
        } else {
            DispatchOutcome::TimedOut
        }
    }

    fn deliver<T: DispatchTarget + ?Sized>(&self, target: &T, pending: Pending) -> bool {
        let _callbacks = self.callbacks.lock();
        if self.is_stopped() {
            trace!("Delivery after stop discarded");
            return false;
        }
        target.deliver(pending)
    }

    fn tick<T: DispatchTarget + ?Sized>(&self, target: &T) {
        let now = Instant::now();
        {
            let mut last = self.last_tick.lock();
            if now.duration_since(*last) < TICK_INTERVAL {
                return;
            }
            *last = now;
        }
        target.on_tick(now);
    }
}

/// Internal dispatch thread of `OperationModel::ApiDispatch`
pub(crate) fn spawn<T>(target: Arc<T>, timeout: Duration) -> Result<JoinHandle<()>>
where
    T: DispatchTarget + Send + Sync + 'static,
{
    thread::Builder::new()
        .name("omm-dispatch".into())
        .spawn(move || {
            let dispatcher = target.dispatcher();
            while !dispatcher.is_stopped() {
                dispatcher.dispatch(target.as_ref(), timeout);
            }
            debug!("Dispatch thread stopped");
        })
        .map_err(|e| OmmError::invalid_usage(format!("failed to start the dispatch thread: {e}")))
}

/// Join the dispatch thread unless called from it
pub(crate) fn join(worker: Option<JoinHandle<()>>) {
    let Some(worker) = worker else { return };
    if worker.thread().id() == thread::current().id() {
        return;
    }
    if worker.join().is_err() {
        warn!("Dispatch thread panicked");
    }
}
