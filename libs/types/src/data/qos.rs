//! Quality of service: timeliness and rate

use std::fmt;

/// How current the data is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeliness {
    RealTime,
    DelayedUnknown,
    /// Delayed by the given number of seconds
    Delayed(u16),
}

/// How often the data is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rate {
    TickByTick,
    JitConflated,
    /// Conflated over the given number of milliseconds
    TimeConflated(u16),
}

/// Quality of service advertised by a service or requested by a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qos {
    pub timeliness: Timeliness,
    pub rate: Rate,
    pub dynamic: bool,
}

impl Qos {
    pub fn new(timeliness: Timeliness, rate: Rate) -> Self {
        Self {
            timeliness,
            rate,
            dynamic: false,
        }
    }

    /// RealTime / TickByTick
    pub fn realtime() -> Self {
        Self::new(Timeliness::RealTime, Rate::TickByTick)
    }

    /// Lower rank is better; used to pick the best QoS a service offers
    pub fn rank(&self) -> (u32, u32) {
        let timeliness = match self.timeliness {
            Timeliness::RealTime => 0,
            Timeliness::Delayed(secs) => 1 + secs as u32,
            Timeliness::DelayedUnknown => u32::MAX,
        };
        let rate = match self.rate {
            Rate::TickByTick => 0,
            Rate::JitConflated => 1,
            Rate::TimeConflated(ms) => 1 + ms as u32,
        };
        (timeliness, rate)
    }

    /// Whether `self` satisfies a request for `wanted` (no worse in either dimension)
    pub fn satisfies(&self, wanted: &Qos) -> bool {
        let (t, r) = self.rank();
        let (wt, wr) = wanted.rank();
        t <= wt && r <= wr
    }
}

impl Default for Qos {
    fn default() -> Self {
        Self::realtime()
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timeliness {
            Timeliness::RealTime => write!(f, "RealTime")?,
            Timeliness::DelayedUnknown => write!(f, "DelayedUnknown")?,
            Timeliness::Delayed(secs) => write!(f, "Delayed({secs}s)")?,
        }
        match self.rate {
            Rate::TickByTick => write!(f, "/TickByTick"),
            Rate::JitConflated => write!(f, "/JitConflated"),
            Rate::TimeConflated(ms) => write!(f, "/TimeConflated({ms}ms)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_satisfies_delayed_request() {
        let delayed = Qos::new(Timeliness::Delayed(900), Rate::TimeConflated(1000));
        assert!(Qos::realtime().satisfies(&delayed));
        assert!(!delayed.satisfies(&Qos::realtime()));
        assert_eq!(Qos::realtime().to_string(), "RealTime/TickByTick");
    }
}
