//! Blocking delays backed by the OS scheduler

use embedded_hal::delay::DelayNs;
use std::thread;
use std::time::Duration;

/// `DelayNs` implementation that sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::DelayNs;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records requested delays instead of sleeping
    #[derive(Debug, Default, Clone)]
    pub struct RecordingDelay {
        pub calls_ns: Vec<u64>,
    }

    impl RecordingDelay {
        pub fn total_us(&self) -> u64 {
            self.calls_ns.iter().sum::<u64>() / 1000
        }
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls_ns.push(u64::from(ns));
        }

        fn delay_us(&mut self, us: u32) {
            self.calls_ns.push(u64::from(us) * 1000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.calls_ns.push(u64::from(ms) * 1_000_000);
        }
    }

    /// Records delays into a log that outlives the delay's owner
    #[derive(Debug, Default, Clone)]
    pub struct SharedDelay {
        calls_ns: Rc<RefCell<Vec<u64>>>,
    }

    impl SharedDelay {
        pub fn calls(&self) -> usize {
            self.calls_ns.borrow().len()
        }
    }

    impl DelayNs for SharedDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls_ns.borrow_mut().push(u64::from(ns));
        }

        fn delay_us(&mut self, us: u32) {
            self.calls_ns.borrow_mut().push(u64::from(us) * 1000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.calls_ns.borrow_mut().push(u64::from(ms) * 1_000_000);
        }
    }
}
