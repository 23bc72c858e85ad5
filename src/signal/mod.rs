//! Signal hooks shared by every interruptible wait in the process.
//!
//! ```ignore
//! let signals = SignalRegistry::global();
//! signals.register(libc::SIGTERM, SignalDisposition::Interrupt)?;
//! // ... later, outside the select loop
//! if signals.check(libc::SIGTERM) { shutdown(); }
//! ```

mod action;
mod registry;

pub use registry::*;

#[cfg(test)]
mod registry_test;
