//! cloudconn
//!
//! Reconciliation-time credential and client resolver for controllers
//! managing many independently-configured external-cloud resources.
//!
//! A reconciler hands [`Resolver::get`] a configuration reference and
//! receives a ready-to-use, correctly-scoped client handle with valid
//! credentials. Resolution flattens the configuration's delegation
//! chain, credentials are materialized by the mechanism the resolved
//! spec names, and a fingerprint-keyed cache deduplicates
//! authentication traffic across every resource sharing the same
//! configuration.
#![deny(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod resolver;
pub mod stores;
pub mod types;

pub use cache::{CacheConfig, ClientCache};
pub use client::ClientHandle;
pub use config::ConfigResolver;
pub use error::ConnError;
pub use resolver::{Resolver, ResolverBuilder};
pub use types::{
    AuthMechanism, AuthSpec, ConfigReference, ConfigScope, Credentials, Fingerprint, RoleHop,
};
