//! patchroll: zero-downtime replacement rollouts for Deployments
//!
//! Finds every Deployment and Service sharing a label, creates a timestamped
//! copy of each Deployment, waits for the copies to become ready, points the
//! Services at them through a `patch=<timestamp>` selector, and optionally
//! deletes the superseded Deployments.

pub mod cluster;
pub mod config;
pub mod controller;
