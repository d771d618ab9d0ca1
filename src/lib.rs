//! railyard - provision, verify and equip Kubernetes clusters
//!
//! A cluster is described once in a YAML file. The selected platform renders
//! Terraform input into the cluster's asset directory, Terraform applies it,
//! readiness is polled, and configured components are installed in order.
pub mod components;
pub mod config;
pub mod error;
pub mod k8s;
pub mod monitoring;
pub mod platform;
pub mod report;
pub mod terraform;
pub mod utils;
pub mod verify;

pub use error::{Error, RenderError, Result};
