//! Credential protection and session lifecycle.
//!
//! `secrets` is the platform seam (OS-backed protection of one string),
//! `store` persists the single credential record, `session` owns the
//! authenticated/unauthenticated state machine.

pub mod secrets;
pub mod session;
pub mod store;
