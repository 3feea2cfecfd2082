//! Agent fleet core: drives a pool of CI agents against a remote job queue.
//!
//! Layers: `domain` (pure values), `application` (ports and services),
//! `infra` (production adapters).

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod application;
pub mod domain;
pub mod infra;
