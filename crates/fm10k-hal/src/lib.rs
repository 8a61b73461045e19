//! Hardware access boundary for the FM10000 family.
//!
//! Everything the table-maintenance crates need from the device goes
//! through the seams defined here:
//!
//! - [`SwitchStatus`] / [`HalError`]: the status-code contract
//! - [`SwitchId`]: typed switch index
//! - [`RegisterIo`]: word-level register access
//! - [`Clock`]: time source for aging arithmetic
//!
//! [`SimRegisterFile`] and [`ManualClock`] are in-memory implementations
//! used by tests and the simulation daemon.

mod clock;
mod error;
mod registers;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HalError, HalResult, SwitchStatus};
pub use registers::{RegisterIo, SimRegisterFile};
pub use types::SwitchId;
