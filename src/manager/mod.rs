//! # Radio manager: scheduler owner, device registry and external drivers.
//!
//! The [`Manager`] owns the single [`Scheduler`](crate::scheduler::Scheduler)
//! shared by every device on the radio, the device registry and the radio
//! state tracker. Applications feed it the three external inputs and read
//! outcomes through listeners and the event bus.
//!
//! ```text
//!  native callback ──► Manager::on_native_event ──► Device ──► Scheduler::deliver
//!  tick(dt)        ──► Manager::tick ──► Scheduler::tick ──► Device::update
//!  power change    ──► Manager::on_radio_state ──► cancel all (RadioOff)
//!                                   │
//!                                   ▼
//!                              Core::settle
//!                     ├─► route reports to devices / response listeners
//!                     └─► flush outbox ──► listeners (inline or CallbackPump)
//! ```
//!
//! ## Rules
//! - Locks are taken device first, scheduler second, never the reverse.
//! - Listeners never run while a device or scheduler lock is held.
//! - A listener may call back into the manager or a device; its effects are
//!   settled by the drain already in progress.
//! - With [`Config::post_callbacks`](crate::Config::post_callbacks) the
//!   listeners run wherever the [`CallbackPump`] is drained.

mod builder;
mod core;
#[allow(clippy::module_inception)]
mod manager;
mod pump;

pub use builder::ManagerBuilder;
pub(crate) use self::core::{Core, panic_message};
pub use self::core::ResponseListener;
pub use manager::Manager;
pub use pump::CallbackPump;
