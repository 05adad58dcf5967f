//! ghostmesh: peer exchange of guardian safety signals.
//!
//! Independent, offline deployments of a local guardian share evidence that
//! a risky action was halted, as signed packets of privacy-reduced "ghosts".
//! Imported evidence can only ever become a *stricter* suggestion, and no
//! suggestion takes effect without a human approving it and editing live
//! configuration by hand.
//!
//! Flow: runtime logs → [`ghost`] filter → [`export`] → manual transfer →
//! [`ingest`] (verify, [`policy`] admit, [`suggestion`] derive) →
//! [`store`] → [`apply`] → applied log.
//!
//! See `DESIGN.md` for the full architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod secret;

pub mod events;
pub mod ghost;
pub mod packet;

pub mod export;
pub mod ingest;
pub mod policy;
pub mod suggestion;

pub mod apply;
pub mod mesh;
pub mod store;
