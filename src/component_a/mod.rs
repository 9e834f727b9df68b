// Component A: Acquisition
// Sensor query and frame parsing, process state, the per-cycle acquire → control → record
// sequence and the periodic DAQ worker that drives it.

pub mod sensor;
pub mod state;
pub mod acquisition;
pub mod scheduler;
