//! The emergency-activation workflow.
//!
//! [`ActivationTrigger`] turns a sustained press into a single activation;
//! [`EmergencySessionController`] then locates the subject, records the
//! incident, alerts the emergency contacts and keeps the incident's location
//! current until the emergency is cancelled.
//!
//! All collaborators are reached through the traits in [`beacon_core`]; the
//! embedding application supplies the platform implementations.

pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod trigger;

mod tracking;

pub use config::SessionConfig;
pub use controller::{
  Activation, EmergencySessionController, NotificationOutcome, SessionSnapshot,
  SessionState,
};
pub use error::{Result, SessionError};
pub use feedback::{AlarmGuard, Feedback, ImpactStyle, NoFeedback};
pub use trigger::{ActivationTrigger, TriggerEvent};
