//! Shared items for driving an on/off LED matrix from many writer modules at once.
//!
//! A [`Matrix`] owns the pixel grid and the device. Writer modules ([`MatrixModule`])
//! never touch either; they enqueue [`ChangeEvent`]s and ask for a flush.

mod change;
mod device;
mod error;
mod matrix;
mod pixel_grid;
pub mod shared_constants;
mod stop_signal;
mod virtual_device;
mod writer;
pub mod writers;

// Re-export commonly used items
pub use change::{ChangeChannel, ChangeEvent, Enqueued};
pub use device::LedDevice;
pub use error::{Error, Result};
pub use matrix::{Matrix, MatrixBuilder, StopReport, WriterHandle};
pub use pixel_grid::PixelGrid;
pub use stop_signal::StopSignal;
pub use virtual_device::{DeviceRecord, VirtualDevice, VirtualDeviceLog};
pub use writer::{ChangeSink, MatrixModule, ModuleConfig, ModuleRegion, WriterContext};
