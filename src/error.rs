use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The matrix was built without a device.
    #[display("No device specified")]
    NoDevice,

    /// A supplied grid does not match the device's dimensions.
    #[display(
        "Invalid matrix dimensions {width}x{height}. Must be {expected_width}x{expected_height}."
    )]
    GridDimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    /// A supplied grid holds a cell that is neither the device's ON nor OFF value.
    #[display("Invalid pixel value at ({x}, {y})")]
    InvalidPixelValue { x: usize, y: usize },

    #[display("Writers were already started")]
    AlreadyStarted,

    #[display("Matrix is stopped")]
    Stopped,

    #[display("Could not spawn writer thread: {_0}")]
    WriterSpawn(#[error(not(source))] String),

    #[display("Device connection failed: {_0}")]
    DeviceConnection(#[error(not(source))] String),

    #[display("Device I/O failed: {_0}")]
    DeviceIo(#[error(not(source))] String),

    /// Writers still running when a bounded stop gave up on them.
    #[display("Writers did not stop in time: {names:?}")]
    WriterStopTimeout {
        #[error(not(source))]
        names: Vec<String>,
    },

    #[display("Writer {_0} panicked")]
    WriterPanicked(#[error(not(source))] String),

    #[display("Memory probe failed: {_0}")]
    MemoryProbe(#[error(not(source))] String),

    #[display("Format error")]
    FormatError,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::FormatError
    }
}
