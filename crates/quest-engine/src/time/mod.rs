//! Time subsystem.
//!
//! - [`FrameClock`] produces one [`FrameTime`] per host frame; the driver is
//!   ticked with it.
//! - [`Clock`] is the wall-clock seam game rules read from (pond cannon
//!   reload). Tests substitute a [`ManualClock`].

mod clock;
mod frame_clock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame_clock::{FrameClock, FrameTime};
