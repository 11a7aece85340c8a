//! Core library for the viewing-slot scheduling and booking subsystem.
//!
//! Slot management, invitations, capacity-enforced bookings, and the
//! reminder scheduler live under [`scheduling`]; the surrounding modules
//! carry configuration, telemetry, and the binary-facing error surface.

pub mod config;
pub mod error;
pub mod scheduling;
pub mod telemetry;
