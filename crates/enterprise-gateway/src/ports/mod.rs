//! Ports (traits) connecting the gateway to external collaborators.

pub mod outbound;

pub use outbound::{
    Clock, HealthProbe, ManualClock, ProbeError, SecurityEvent, SecurityLogError,
    SecurityLogger, SessionValidator, SystemClock,
};
