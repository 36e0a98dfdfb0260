#![doc = "civic-dev-core: core logic library for civic-dev."]

//! This crate contains the documentation pipeline, the paginated GraphQL
//! fetcher and the project policy/layout helpers used by the `civic-dev` CLI.
//!
//! # Usage
//! The CLI is a thin layer over these modules; tests drive them directly.

pub mod checks;
pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod graphql;
pub mod layout;
pub mod logging;
pub mod policy;
pub mod reflect;
pub mod render;
pub mod report;
pub mod site;
pub mod version;
