//! The hardware side of the matrix: anything that can show a full [`PixelGrid`].

use core::fmt::Debug;

use crate::{PixelGrid, Result};

/// A physical (or virtual) LED matrix.
///
/// The device chooses its own on/off encoding; the coordinator never assumes the
/// pixel type is `bool`. Rendering is synchronous and may be slow.
pub trait LedDevice: Send {
    /// Pixel encoding used by [`render_matrix`](Self::render_matrix).
    type Pixel: Copy + PartialEq + Debug + Send + 'static;

    /// Value of a lit cell.
    const ON: Self::Pixel;
    /// Value of a dark cell.
    const OFF: Self::Pixel;

    /// Number of columns.
    fn width(&self) -> usize;

    /// Number of rows.
    fn height(&self) -> usize;

    fn is_open(&self) -> bool;

    /// Open the connection to the hardware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceConnection`](crate::Error::DeviceConnection) if the hardware
    /// cannot be reached.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection to the hardware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceIo`](crate::Error::DeviceIo) if closing fails.
    fn close(&mut self) -> Result<()>;

    /// Transmit the whole grid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceIo`](crate::Error::DeviceIo) if the transfer fails.
    fn render_matrix(&mut self, grid: &PixelGrid<Self::Pixel>) -> Result<()>;

    /// Encode an on/off intent.
    #[must_use]
    fn encode(on: bool) -> Self::Pixel {
        if on { Self::ON } else { Self::OFF }
    }

    /// An all-OFF grid of this device's size.
    #[must_use]
    fn blank_grid(&self) -> PixelGrid<Self::Pixel> {
        PixelGrid::filled(self.width(), self.height(), Self::OFF)
    }
}
