// Copyright 2019 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Credential provisioning for OpenStack integration tests.
//!
//! Tests running against a live cloud need users, projects and networks to
//! act with. This crate provides them in two ways:
//!
//! * dynamically, by creating a fresh project and user (and optionally a
//!   network, subnet and router) with admin credentials, and deleting them
//!   afterwards;
//! * from a pool of pre-provisioned accounts described in a YAML file,
//!   leased exclusively across concurrently running test processes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tempest::config::Config;
//! use tempest::credentials::{get_credentials_provider, CredentialProvider};
//!
//! # fn main() -> tempest::Result<()> {
//! let config = Config::from_env()?;
//! let provider = get_credentials_provider(
//!     &config,
//!     "ServersTest",
//!     None,
//!     false,
//!     config.identity.auth_version,
//! )?;
//! let primary = provider.get_primary_creds()?;
//! println!("Running as {:?}", primary.username());
//! provider.clear_creds()?;
//! # Ok(()) }
//! ```
//!
//! Servers booted by tests can be reached using the resources from the
//! [validation](validation/index.html) module.

#![crate_name = "tempest"]
#![crate_type = "lib"]
// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
#![deny(
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unsafe_code,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod auth;
pub mod clients;
pub mod config;
pub mod credentials;
mod error;
pub mod session;
pub mod utils;
pub mod validation;

pub use crate::error::{Error, ErrorKind, Result};
