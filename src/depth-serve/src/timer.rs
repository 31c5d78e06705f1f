use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

/// Wall-clock stopwatch for one pipeline stage. Logs on start and stop.
pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
            duration: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    pub fn start(&mut self) {
        info!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
        self.duration = None;
    }

    /// Stop the timer and return the measured milliseconds
    pub fn stop(&mut self) -> i64 {
        match self.tstamp {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                self.tstamp = None;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }

        self.duration_ms()
    }

    /// Milliseconds measured by the last `stop`, 0 if never stopped
    pub fn duration_ms(&self) -> i64 {
        match self.duration {
            None => 0,
            Some(dur) => dur.num_milliseconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_timer_reports_zero() {
        let mut t = Timer::new("idle");
        assert_eq!(t.duration_ms(), 0);
        assert_eq!(t.stop(), 0);
    }

    #[test]
    fn stop_freezes_duration() {
        let mut t = Timer::new_start("sleep");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let ms = t.stop();

        assert!(ms >= 5);
        assert_eq!(t.duration_ms(), ms);
    }
}
