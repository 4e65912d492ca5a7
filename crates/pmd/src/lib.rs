// SPDX-License-Identifier: MIT

//! Port Mapper Daemon (§4.3): a single-host registry of NodeIDs, aliases,
//! and listening addresses, with socket-tied liveness and watcher fan-out.

pub mod env;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod server;

pub use error::PmdError;
pub use lifecycle::LockFile;
pub use registry::{Registry, RegisterOutcome, RegistryError};
pub use server::Server;
