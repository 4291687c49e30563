//! Driver Layer: consumer context berbasis mio
//!
//! Menyediakan kolaborator eksternal untuk scheduler:
//! - `schedule()` dipetakan ke `mio::Waker`
//! - `disable_source()`/`enable_source()` dipetakan ke `IrqLine` simulasi
//!
//! Consumer thread tidur di `Poll::poll` selama mode Interrupt dan
//! berputar per ronde budget selama mode Poll.

mod consumer_loop;
mod irq;

pub use consumer_loop::{ConsumerLoop, LoopStats, ShutdownHandle, WakerHooks, DEFAULT_IDLE_TIMEOUT};
pub use irq::IrqLine;
