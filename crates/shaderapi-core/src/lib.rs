// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fmt::Display;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Logs the full error chain and aborts the process.
///
/// Used at the host boundary for conditions that leave the device unusable
/// (device loss, unsupported surface, failed object creation). Nothing is
/// unwound: GPU objects are reclaimed by the driver with the process.
pub fn fatal(what: impl Display, err: &anyhow::Error) -> ! {
    tracing::error!("fatal: {what}: {err:#}");
    eprintln!("fatal: {what}: {err:#}");
    std::process::abort()
}

pub trait OrFatal<T> {
    /// Unwraps the value or takes the process down through [`fatal`].
    fn or_fatal(self, what: &str) -> T;
}

impl<T> OrFatal<T> for anyhow::Result<T> {
    fn or_fatal(self, what: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => fatal(what, &e),
        }
    }
}
