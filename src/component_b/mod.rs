// Component B: Heater control
// PID controller with Auto/Manual modes, the power supply worker it commands
// and the operator settings that tune it.
pub mod controller;
pub mod actuator;
pub mod operator;
