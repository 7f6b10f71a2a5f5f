//! Load-based pulse estimation
//!
//! When no pulse meter is attached, pulses are synthesized from the
//! estimated draw of this machine, interpolated between idle and full
//! load power from the average CPU usage.

use crate::core::{Error, Result, PULSES_PER_KWH};
use crate::meter::PulseSource;
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::System;

struct EstimatorState {
    sys: System,
    last_read: Instant,
    /// Fractional pulse left over from the previous read
    carry: f64,
}

/// Pulse source driven by CPU load
pub struct EstimationSource {
    state: Mutex<EstimatorState>,
    idle_watts: f64,
    max_load_watts: f64,
}

impl EstimationSource {
    pub fn new(idle_watts: f64, max_load_watts: f64) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        Self {
            state: Mutex::new(EstimatorState {
                sys,
                last_read: Instant::now(),
                carry: 0.0,
            }),
            idle_watts,
            max_load_watts,
        }
    }

    fn estimated_watts(&self, sys: &System) -> f64 {
        let cpus = sys.cpus();
        if cpus.is_empty() {
            return self.idle_watts;
        }

        let avg_load: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32;
        let load_factor = (avg_load as f64 / 100.0).clamp(0.0, 1.0);

        self.idle_watts + load_factor * self.max_load_watts
    }
}

impl PulseSource for EstimationSource {
    fn take_pulses(&self) -> Result<u32> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Meter("Estimator state poisoned".to_string()))?;

        state.sys.refresh_cpu_all();
        let watts = self.estimated_watts(&state.sys);

        let now = Instant::now();
        let seconds = now.duration_since(state.last_read).as_secs_f64();
        state.last_read = now;

        Ok(pulses_for(watts, seconds, &mut state.carry))
    }

    fn name(&self) -> &str {
        "Estimation (no pulse meter)"
    }

    fn is_estimated(&self) -> bool {
        true
    }
}

/// Whole pulses for drawing `watts` over `seconds`.
///
/// The fractional remainder is kept in `carry` for the next call.
pub fn pulses_for(watts: f64, seconds: f64, carry: &mut f64) -> u32 {
    if watts <= 0.0 || seconds <= 0.0 {
        return 0;
    }

    let exact = watts * seconds * PULSES_PER_KWH / 3_600_000.0 + *carry;
    let whole = exact.floor();
    *carry = exact - whole;

    whole as u32
}
