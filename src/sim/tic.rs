use std::time::{Duration, Instant};

use super::map::Map;

pub const SIM_FPS: u32 = 30;
pub const DT: f32 = 1.0 / SIM_FPS as f32;
const TIC: Duration = Duration::from_micros(1_000_000 / SIM_FPS as u64);

/// Fixed-rate driver: catches a map up with wall-clock time in whole tics.
///
/// The library surface stays "call [`Map::update`] yourself"; this is the
/// convenience loop for hosts that just want real-time simulation.
pub struct TickPump {
    last: Instant,
}

impl Default for TickPump {
    fn default() -> Self {
        Self::new()
    }
}

impl TickPump {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Advance enough tics to synchronise the map with real time; returns
    /// how many ran.
    pub fn pump(&mut self, map: &mut Map) -> u32 {
        let mut ran = 0;
        while self.last.elapsed() >= TIC {
            map.update(DT);
            self.last += TIC;
            ran += 1;
        }
        ran
    }
}
