/// One decoded status frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    /// The pack voltage in V
    pub voltage_v: f64,
    /// The pack current in A. The device reports it unsigned.
    pub current_a: f64,
    /// The mean of the four temperature probes in °C
    pub temperature_c: f64,
    /// Lifetime number of battery cycles (count), as kept by the BMS
    pub cycle_index: u16,
    /// The state of charge of the battery in %
    pub state_of_charge_pct: u8,
}
