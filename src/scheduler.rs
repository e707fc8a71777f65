//! Shared heartbeat for clock updates.
//!
//! Every clock registers its update callback with a [`TickScheduler`], which
//! drives all of them from a single timer running at the shortest requested
//! interval.

use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::debug;

use crate::error::Error;
use crate::svg::SuspendHandle;

/// Update callback of a registration.
pub type Callback<D> = Box<dyn FnMut(&mut D, Instant)>;

/// Unique identifier of a scheduler registration.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RegistrationId(u64);

impl Display for RegistrationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a redraw-batching surface owned by the scheduler's data.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SurfaceId(pub usize);

/// Underlying timer driving the scheduler.
pub trait Heartbeat {
    /// Start calling [`TickScheduler::tick`] every `period`.
    fn start(&mut self, period: Duration);

    /// Stop the timer.
    fn stop(&mut self);
}

/// Access to the surfaces referenced by registrations.
pub trait RedrawBatching {
    /// Suspend redraws of a surface, if it supports batching.
    fn suspend_redraw(&mut self, surface: SurfaceId) -> Option<SuspendHandle>;

    /// Resume redraws suspended through [`Self::suspend_redraw`].
    fn unsuspend_redraw(&mut self, surface: SurfaceId, handle: SuspendHandle);
}

/// Scheduled update callback.
struct Registration<D> {
    id: RegistrationId,
    callback: Callback<D>,
    interval: Duration,
    last: Option<Instant>,
    surface: Option<SurfaceId>,
}

/// Multiplexer of update callbacks onto one heartbeat.
pub struct TickScheduler<D> {
    registrations: Vec<Registration<D>>,
    heartbeat: Box<dyn Heartbeat>,
    period: Option<Duration>,
    next_id: u64,
}

impl<D: RedrawBatching> TickScheduler<D> {
    pub fn new(heartbeat: Box<dyn Heartbeat>) -> Self {
        Self { heartbeat, registrations: Default::default(), period: None, next_id: 0 }
    }

    /// Current heartbeat period, `None` while stopped.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register an update callback.
    ///
    /// The callback will be called at least every `interval`. Passing a
    /// surface batches its redraws with all other callbacks due in the same
    /// tick.
    pub fn register(
        &mut self,
        callback: Callback<D>,
        interval: Duration,
        surface: Option<SurfaceId>,
    ) -> Result<RegistrationId, Error> {
        let id = RegistrationId(self.next_id);

        // Guard against the counter ever reusing a live id.
        if self.registrations.iter().any(|registration| registration.id == id) {
            return Err(Error::DuplicateRegistration(id));
        }
        self.next_id += 1;

        self.registrations.push(Registration { id, callback, interval, surface, last: None });
        debug!("Registered update {id} every {interval:?}");

        self.update_period();

        Ok(id)
    }

    /// Remove a registration.
    ///
    /// Returns `false` if the registration did not exist.
    pub fn unregister(&mut self, id: RegistrationId) -> bool {
        let index = match self.registrations.iter().position(|registration| registration.id == id)
        {
            Some(index) => index,
            None => return false,
        };
        self.registrations.remove(index);
        debug!("Unregistered update {id}");

        self.update_period();

        true
    }

    /// Run all callbacks due at `now`.
    pub fn tick(&mut self, now: Instant, data: &mut D) {
        let period = match self.period {
            Some(period) => period,
            None => return,
        };

        // Include everything that would be late before the next tick.
        let horizon = now + period;
        let due: SmallVec<[usize; 8]> = self
            .registrations
            .iter()
            .enumerate()
            .filter(|(_, registration)| {
                registration.last.is_none_or(|last| last + registration.interval <= horizon)
            })
            .map(|(i, _)| i)
            .collect();

        // Hold back all redraws until every callback is done.
        let mut suspended: SmallVec<[(SurfaceId, SuspendHandle); 8]> = SmallVec::new();
        for &i in &due {
            let surface = self.registrations[i].surface;
            if let Some(surface) = surface
                && let Some(handle) = data.suspend_redraw(surface)
            {
                suspended.push((surface, handle));
            }
        }

        for &i in &due {
            let registration = &mut self.registrations[i];
            registration.last = Some(now);
            (registration.callback)(data, now);
        }

        for (surface, handle) in suspended.into_iter().rev() {
            data.unsuspend_redraw(surface, handle);
        }
    }

    /// Restart the heartbeat if the required period changed.
    fn update_period(&mut self) {
        let period = self.registrations.iter().map(|registration| registration.interval).min();
        if period == self.period {
            return;
        }

        if self.period.is_some() {
            self.heartbeat.stop();
        }

        self.period = period;

        match period {
            Some(period) => {
                debug!("Starting heartbeat every {period:?}");
                self.heartbeat.start(period);
            },
            None => debug!("Stopped idle heartbeat"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Heartbeat recording its lifecycle.
    #[derive(Clone, Default)]
    struct FakeHeartbeat {
        events: Rc<RefCell<Vec<Option<Duration>>>>,
        running: Rc<RefCell<Option<Duration>>>,
    }

    impl Heartbeat for FakeHeartbeat {
        fn start(&mut self, period: Duration) {
            assert!(self.running.borrow().is_none(), "heartbeat started twice");
            *self.running.borrow_mut() = Some(period);
            self.events.borrow_mut().push(Some(period));
        }

        fn stop(&mut self) {
            assert!(self.running.borrow_mut().take().is_some(), "stopped idle heartbeat");
            self.events.borrow_mut().push(None);
        }
    }

    /// Scheduler data tracking calls and redraw suspension.
    #[derive(Default)]
    struct Board {
        calls: Vec<&'static str>,
        suspended: Vec<SurfaceId>,
        log: Vec<String>,
        batching: bool,
    }

    impl RedrawBatching for Board {
        fn suspend_redraw(&mut self, surface: SurfaceId) -> Option<SuspendHandle> {
            if !self.batching {
                return None;
            }

            self.suspended.push(surface);
            self.log.push(format!("suspend {}", surface.0));
            Some(SuspendHandle::default())
        }

        fn unsuspend_redraw(&mut self, surface: SurfaceId, _handle: SuspendHandle) {
            self.suspended.retain(|suspended| *suspended != surface);
            self.log.push(format!("resume {}", surface.0));
        }
    }

    fn callback(name: &'static str) -> Callback<Board> {
        Box::new(move |board: &mut Board, _now: Instant| {
            board.calls.push(name);
            board.log.push(format!("call {name} suspended={}", board.suspended.len()));
        })
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn no_registrations_no_timer() {
        let heartbeat = FakeHeartbeat::default();
        let mut scheduler = TickScheduler::<Board>::new(Box::new(heartbeat.clone()));

        scheduler.tick(Instant::now(), &mut Board::default());
        assert_eq!(scheduler.period(), None);
        assert!(heartbeat.events.borrow().is_empty());
    }

    #[test]
    fn last_unregister_stops_timer() {
        let heartbeat = FakeHeartbeat::default();
        let mut scheduler = TickScheduler::<Board>::new(Box::new(heartbeat.clone()));

        let id = scheduler.register(callback("a"), ms(50), None).unwrap();
        assert_eq!(*heartbeat.running.borrow(), Some(ms(50)));

        assert!(scheduler.unregister(id));
        assert!(!scheduler.unregister(id));
        assert_eq!(*heartbeat.running.borrow(), None);
        assert_eq!(*heartbeat.events.borrow(), [Some(ms(50)), None]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn period_follows_shortest_interval() {
        let heartbeat = FakeHeartbeat::default();
        let mut scheduler = TickScheduler::<Board>::new(Box::new(heartbeat.clone()));

        let slow = scheduler.register(callback("slow"), ms(50), None).unwrap();
        let fast = scheduler.register(callback("fast"), ms(30), None).unwrap();
        assert_eq!(scheduler.period(), Some(ms(30)));

        // Longer intervals don't restart the timer.
        let slower = scheduler.register(callback("slower"), ms(60), None).unwrap();

        scheduler.unregister(fast);
        assert_eq!(scheduler.period(), Some(ms(50)));

        scheduler.unregister(slower);
        scheduler.unregister(slow);
        assert_eq!(scheduler.period(), None);

        let expected = [Some(ms(50)), None, Some(ms(30)), None, Some(ms(50)), None];
        assert_eq!(*heartbeat.events.borrow(), expected);
    }

    #[test]
    fn unique_ids() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        let first = scheduler.register(callback("a"), ms(50), None).unwrap();
        scheduler.unregister(first);
        let second = scheduler.register(callback("b"), ms(50), None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn reused_id_is_rejected() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        let first = scheduler.register(callback("a"), ms(50), None).unwrap();

        scheduler.next_id = 0;
        let result = scheduler.register(callback("b"), ms(20), None);
        assert_eq!(result, Err(Error::DuplicateRegistration(first)));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.period(), Some(ms(50)));
    }

    #[test]
    fn due_callbacks_fire_in_order() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        scheduler.register(callback("fast"), ms(50), None).unwrap();
        scheduler.register(callback("slow"), ms(200), None).unwrap();

        let mut board = Board::default();
        let start = Instant::now();

        // Everything fires on the first tick.
        scheduler.tick(start, &mut board);
        assert_eq!(board.calls, ["fast", "slow"]);

        // Slow callback becomes due one period before its interval elapses.
        board.calls.clear();
        for i in 1..=3 {
            scheduler.tick(start + ms(50 * i), &mut board);
        }
        assert_eq!(board.calls, ["fast", "fast", "fast", "slow"]);

        board.calls.clear();
        scheduler.tick(start + ms(200), &mut board);
        assert_eq!(board.calls, ["fast"]);
    }

    #[test]
    fn long_interval_waits_beyond_window() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        scheduler.register(callback("fast"), ms(10), None).unwrap();
        scheduler.register(callback("slow"), ms(100), None).unwrap();

        let mut board = Board::default();
        let start = Instant::now();
        scheduler.tick(start, &mut board);

        board.calls.clear();
        for i in 1..=10 {
            scheduler.tick(start + ms(10 * i), &mut board);
        }

        // Slow fires once its interval is within one period of elapsing.
        let slow_calls = board.calls.iter().filter(|call| **call == "slow").count();
        assert_eq!(slow_calls, 1);
        assert_eq!(board.calls.iter().filter(|call| **call == "fast").count(), 10);
    }

    #[test]
    fn redraw_suspended_around_batch() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        scheduler.register(callback("a"), ms(50), Some(SurfaceId(0))).unwrap();
        scheduler.register(callback("b"), ms(50), Some(SurfaceId(1))).unwrap();
        scheduler.register(callback("c"), ms(50), None).unwrap();

        let mut board = Board { batching: true, ..Default::default() };
        scheduler.tick(Instant::now(), &mut board);

        assert_eq!(board.log, [
            "suspend 0",
            "suspend 1",
            "call a suspended=2",
            "call b suspended=2",
            "call c suspended=2",
            "resume 1",
            "resume 0",
        ]);
    }

    #[test]
    fn surfaces_without_batching() {
        let mut scheduler = TickScheduler::<Board>::new(Box::new(FakeHeartbeat::default()));
        scheduler.register(callback("a"), ms(50), Some(SurfaceId(0))).unwrap();

        let mut board = Board::default();
        scheduler.tick(Instant::now(), &mut board);
        assert_eq!(board.log, ["call a suspended=0"]);
    }
}
