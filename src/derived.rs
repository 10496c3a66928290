//! Metrics computed from samples rather than read from the frame.

use tokio::time::Instant;

/// Fixed description of the battery pack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackSpec {
    /// Rated energy of the pack in Wh
    pub rated_energy_wh: f64,
    /// Nominal cell voltage in V
    pub nominal_voltage_v: f64,
}

impl PackSpec {
    /// 20S LG INR18650-MJ1
    pub const DEFAULT: PackSpec = PackSpec {
        rated_energy_wh: 192.4,
        nominal_voltage_v: 3.7,
    };

    /// Total capacity in Ah
    pub fn capacity_ah(&self) -> f64 {
        self.rated_energy_wh / self.nominal_voltage_v
    }

    /// Capacity already drawn from the pack at the given state of charge, in Ah
    pub fn discharged_ah(&self, state_of_charge_pct: u8) -> f64 {
        self.capacity_ah() * (1.0 - f64::from(state_of_charge_pct) / 100.0)
    }
}

impl Default for PackSpec {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What a session remembers between samples in order to compute dV/dt.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionState {
    previous_voltage_v: Option<f64>,
    previous_at: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_voltage_v(&self) -> Option<f64> {
        self.previous_voltage_v
    }

    pub fn previous_at(&self) -> Option<Instant> {
        self.previous_at
    }

    /// Take a new voltage reading and return dV/dt in V/s relative to the
    /// previous one. The first reading, and a reading taken at the same
    /// instant as its predecessor, give `0.0`.
    pub fn advance(&mut self, voltage_v: f64, at: Instant) -> f64 {
        let dv_dt = match (self.previous_voltage_v, self.previous_at) {
            (Some(previous_v), Some(previous_at)) => {
                let elapsed = at.saturating_duration_since(previous_at).as_secs_f64();
                if elapsed > 0.0 {
                    (voltage_v - previous_v) / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        self.previous_voltage_v = Some(voltage_v);
        self.previous_at = Some(at);
        dv_dt
    }
}
