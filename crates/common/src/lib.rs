//! Common types shared by the payments gateway crates

mod clock;
mod error;
mod secret;

pub use clock::{unix_now_millis, unix_now_secs};
pub use error::{Error, Result};
pub use secret::Secret;
