//! Everything that leaves the plugin's own process: running the
//! kaniko executor, resolving tags from the CI environment, and
//! exchanging cloud credentials for registry logins.

use std::future::Future;

use miette::{IntoDiagnostic, Result};

pub mod auth;
pub mod drivers;
pub mod logging;
pub mod signal_handler;

/// Runs a future to completion on a new runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    Ok(runtime.block_on(future))
}
