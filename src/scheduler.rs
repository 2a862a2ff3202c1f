//! Deterministic cooperative scheduler (`SPEC_FULL.md` §4.2).
//!
//! Grounded on `examples/original_source/src/hw/scheduler.c`: a fixed pool of timer records, a
//! free list and a live list kept sorted by ascending expiry, and a `tick` loop that advances the
//! base clock in steps bounded by the next expiring timer, running every executable device at
//! each step and then draining timers whose expiry has been reached.

use crate::device::{DeviceSlot, Execute};
use crate::error::{Error, Result};
use log::{debug, trace};

pub type TimerCallback = Box<dyn FnMut(&mut Scheduler)>;

pub type TimerHandle = usize;

struct Timer {
    expire: i64,
    callback: Option<TimerCallback>,
    active: bool,
}

/// Drives emulated time. Owns the timer pool; the set of devices it advances each tick is
/// supplied by the [`crate::machine::Machine`] that owns both.
pub struct Scheduler {
    base: i64,
    timers: Vec<Timer>,
    free: Vec<TimerHandle>,
    /// Live timer handles, kept sorted by ascending `expire` (ties broken by insertion order,
    /// matching the original's linear insertion scan).
    live: Vec<TimerHandle>,
    pub running: bool,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        let mut timers = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            timers.push(Timer {
                expire: 0,
                callback: None,
                active: false,
            });
            free.push(i);
        }
        free.reverse();
        Scheduler {
            base: 0,
            timers,
            free,
            live: Vec::new(),
            running: true,
        }
    }

    pub fn base_time(&self) -> i64 {
        self.base
    }

    pub fn start_timer(&mut self, delta_ns: i64, callback: TimerCallback) -> Result<TimerHandle> {
        let handle = self
            .free
            .pop()
            .ok_or(Error::TimerPoolFull(self.timers.len()))?;
        let expire = self.base + delta_ns;
        self.timers[handle] = Timer {
            expire,
            callback: Some(callback),
            active: true,
        };
        let pos = self.live.iter().position(|&h| self.timers[h].expire > expire).unwrap_or(self.live.len());
        self.live.insert(pos, handle);
        trace!("start_timer handle={} expire={}", handle, expire);
        Ok(handle)
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) {
        if !self.timers[handle].active {
            return;
        }
        self.timers[handle].active = false;
        self.timers[handle].callback = None;
        self.live.retain(|&h| h != handle);
        self.free.push(handle);
    }

    pub fn remaining_time(&self, handle: TimerHandle) -> i64 {
        self.timers[handle].expire - self.base
    }

    fn next_expiry(&self) -> Option<i64> {
        self.live.first().map(|&h| self.timers[h].expire)
    }

    /// Advances the base clock by `delta_ns`, running every executable device and firing every
    /// timer whose expiry is reached, in chronological order. Callbacks may start or cancel
    /// timers re-entrantly, including scheduling themselves again at the current base.
    pub fn tick(&mut self, delta_ns: i64, devices: &mut [DeviceSlot]) {
        let target = self.base + delta_ns;
        while self.base < target && self.running {
            let next = self.next_expiry().map(|e| e.min(target)).unwrap_or(target);
            let slice = next - self.base;
            self.base = next;
            for dev in devices.iter_mut() {
                if !dev.running {
                    continue;
                }
                if let Some(exec) = dev.execute.as_deref_mut() {
                    exec.run(slice, self);
                }
            }
            self.fire_expired();
        }
    }

    fn fire_expired(&mut self) {
        loop {
            let head = match self.live.first() {
                Some(&h) if self.timers[h].expire <= self.base => h,
                _ => break,
            };
            self.live.remove(0);
            self.timers[head].active = false;
            let mut cb = self.timers[head].callback.take();
            self.free.push(head);
            if let Some(cb) = cb.as_mut() {
                debug!("firing timer handle={} base={}", head, self.base);
                cb(self);
            }
        }
    }
}

/// A trivial [`Execute`] device used only by tests to assert call ordering.
#[cfg(test)]
pub struct CountingDevice {
    pub calls: std::cell::RefCell<Vec<i64>>,
}

#[cfg(test)]
impl Execute for CountingDevice {
    fn run(&mut self, slice_ns: i64, _scheduler: &mut Scheduler) {
        self.calls.borrow_mut().push(slice_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn timers_fire_in_expiry_order() {
        let mut sched = Scheduler::new(8);
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = order.clone();
        sched.start_timer(10, Box::new(move |_| o1.borrow_mut().push('A'))).unwrap();
        let o2 = order.clone();
        sched.start_timer(5, Box::new(move |_| o2.borrow_mut().push('B'))).unwrap();
        let o3 = order.clone();
        sched.start_timer(10, Box::new(move |_| o3.borrow_mut().push('C'))).unwrap();
        sched.tick(10, &mut []);
        assert_eq!(*order.borrow(), vec!['B', 'A', 'C']);
        assert_eq!(sched.base_time(), 10);
    }

    #[test]
    fn timer_reschedules_itself_from_callback() {
        let mut sched = Scheduler::new(8);
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        fn reschedule(sched: &mut Scheduler, count: Rc<RefCell<i32>>) {
            *count.borrow_mut() += 1;
            let c2 = count.clone();
            let _ = sched.start_timer(5, Box::new(move |s| reschedule(s, c2.clone())));
        }
        sched.start_timer(5, Box::new(move |s| reschedule(s, c.clone()))).unwrap();
        sched.tick(20, &mut []);
        assert_eq!(*count.borrow(), 4);
    }

    #[test]
    fn cancel_is_idempotent_and_prevents_fire() {
        let mut sched = Scheduler::new(4);
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handle = sched.start_timer(5, Box::new(move |_| *f.borrow_mut() = true)).unwrap();
        sched.cancel_timer(handle);
        sched.cancel_timer(handle);
        sched.tick(10, &mut []);
        assert!(!*fired.borrow());
    }
}
