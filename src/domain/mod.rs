// Domain layer: plan/report models and the ports to external tools.

pub mod model;
pub mod ports;
