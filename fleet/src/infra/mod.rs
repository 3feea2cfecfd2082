//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: the job-queue HTTP client,
//! the AWS parameter store and workflow engine, and the Valkey directory.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::application::services` are forbidden.

pub mod agent_directory;
pub mod aws;
pub mod job_queue;
pub mod secret_store;
pub mod workflow_engine;

pub use agent_directory::{TlsFiles, ValkeyAgentDirectory, ValkeySettings};
pub use job_queue::HttpJobQueueClient;
pub use secret_store::SsmSecretStore;
pub use workflow_engine::StepFunctionsEngine;
