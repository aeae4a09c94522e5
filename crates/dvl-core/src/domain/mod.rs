//! Domain entities for the DVL bridge.
//!
//! These are the typed values the bridge publishes on the message bus.  They
//! are deliberately independent of the wire structs in [`crate::protocol`]:
//! the wire format may grow fields, while the published schemas stay fixed.

/// Velocity frames, beam records, and position estimates.
pub mod telemetry;
