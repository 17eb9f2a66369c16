//! The contract between the coordinator and the writer modules that feed it.
//!
//! A writer never touches the grid. It gets a [`WriterContext`] holding two capabilities,
//! [`enqueue`](WriterContext::enqueue) and [`flush`](WriterContext::flush), plus its own
//! [`StopSignal`]. Static writers run once during [`Matrix::start`](crate::Matrix::start);
//! the rest each get a thread and loop until their signal is stopped.

use core::{convert::Infallible, time::Duration};
use std::sync::Arc;

use embedded_graphics::{
    Pixel,
    draw_target::DrawTarget,
    pixelcolor::BinaryColor,
    prelude::{OriginDimensions, Size},
};

use crate::{ChangeEvent, Result, StopSignal, shared_constants::DEFAULT_REFRESH_INTERVAL};

/// What the coordinator hands out to writers, independent of the device type.
pub(crate) trait Capabilities: Send + Sync {
    fn enqueue(&self, event: ChangeEvent);
    fn flush(&self) -> Result<()>;
    fn width(&self) -> usize;
    fn height(&self) -> usize;
}

/// The enqueue/flush handle shared by every writer of one matrix.
///
/// Also an [`embedded_graphics`] draw target: drawing [`BinaryColor::On`] enqueues a
/// lit cell and [`BinaryColor::Off`] a dark one. Nothing reaches the device until
/// [`flush`](Self::flush).
#[derive(Clone)]
pub struct ChangeSink(Arc<dyn Capabilities>);

impl ChangeSink {
    pub(crate) fn new(capabilities: Arc<dyn Capabilities>) -> Self {
        Self(capabilities)
    }

    /// Queue a change. Never blocks and never fails; after shutdown this does nothing.
    pub fn enqueue(&self, x: usize, y: usize, on: bool) {
        self.0.enqueue(ChangeEvent::new(x, y, on));
    }

    /// Apply every queued change and send one frame to the device.
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn flush(&self) -> Result<()> {
        self.0.flush()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.0.width()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.0.height()
    }
}

impl core::fmt::Debug for ChangeSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeSink")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl OriginDimensions for ChangeSink {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "LED matrices are far smaller than u32::MAX cells across"
    )]
    fn size(&self) -> Size {
        Size::new(self.width() as u32, self.height() as u32)
    }
}

impl DrawTarget for ChangeSink {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            // Negative coordinates are off the matrix; the far edges are checked on enqueue.
            if let (Ok(x), Ok(y)) = (usize::try_from(point.x), usize::try_from(point.y)) {
                self.enqueue(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

/// Everything a writer gets for one run.
#[derive(Clone, Debug)]
pub struct WriterContext {
    sink: ChangeSink,
    stop_signal: StopSignal,
    execute_callback: bool,
}

impl WriterContext {
    #[must_use]
    pub fn new(sink: ChangeSink, stop_signal: StopSignal) -> Self {
        Self {
            sink,
            stop_signal,
            execute_callback: true,
        }
    }

    /// Whether [`finish_iteration`](Self::finish_iteration) flushes. Defaults to `true`.
    #[must_use]
    pub const fn with_execute_callback(mut self, execute_callback: bool) -> Self {
        self.execute_callback = execute_callback;
        self
    }

    #[must_use]
    pub const fn execute_callback(&self) -> bool {
        self.execute_callback
    }

    pub fn enqueue(&self, x: usize, y: usize, on: bool) {
        self.sink.enqueue(x, y, on);
    }

    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn flush(&self) -> Result<()> {
        self.sink.flush()
    }

    /// End of one write pass: flush if this context asks for it.
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn finish_iteration(&self) -> Result<()> {
        if self.execute_callback {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Turn off every cell of `region` and flush.
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn clear_region(&self, region: ModuleRegion) -> Result<()> {
        for (x, y) in region.cells() {
            self.enqueue(x, y, false);
        }
        self.flush()
    }

    /// Stop this writer and remove its contribution from the matrix.
    ///
    /// This is what a writer does when its own work fails.
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn stop_and_clear(&self, region: ModuleRegion) -> Result<()> {
        self.stop_signal.stop();
        self.clear_region(region)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.stop_signal.is_running()
    }

    /// Wait between iterations. Returns `false` as soon as the writer is asked to stop.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.stop_signal.sleep(duration)
    }

    #[must_use]
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }

    /// A draw target for [`embedded_graphics`] drawing.
    #[must_use]
    pub fn draw_target(&self) -> ChangeSink {
        self.sink.clone()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.sink.width()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.sink.height()
    }

    /// Whether `region` lies entirely on the matrix.
    #[must_use]
    pub fn fits(&self, region: ModuleRegion) -> bool {
        region.fits_within(self.width(), self.height())
    }
}

/// A rectangle of cells a writer owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl ModuleRegion {
    #[must_use]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Every `(x, y)` in the region, column by column.
    pub fn cells(self) -> impl Iterator<Item = (usize, usize)> {
        let columns = self.x..self.x.saturating_add(self.width);
        let rows = self.y..self.y.saturating_add(self.height);
        columns.flat_map(move |x| rows.clone().map(move |y| (x, y)))
    }

    /// The part of the region that lies on a `width` × `height` matrix.
    #[must_use]
    pub fn clipped_to(self, width: usize, height: usize) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width.saturating_sub(x)),
            height: self.height.min(height.saturating_sub(y)),
        }
    }

    #[must_use]
    pub fn fits_within(self, width: usize, height: usize) -> bool {
        self.x.checked_add(self.width).is_some_and(|right| right <= width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= height)
    }
}

/// Placement and cadence of one writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Column of the writer's top-left cell.
    pub x: usize,
    /// Row of the writer's top-left cell.
    pub y: usize,
    pub refresh_interval: Duration,
}

impl ModuleConfig {
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self {
            x,
            y,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// The `width` × `height` region anchored at this config's position.
    #[must_use]
    pub const fn region(&self, width: usize, height: usize) -> ModuleRegion {
        ModuleRegion::new(self.x, self.y, width, height)
    }
}

/// A producer of pixel changes.
///
/// [`write`](Self::write) enqueues zero or more changes, then calls
/// [`WriterContext::finish_iteration`], then either returns (static writers) or repeats
/// until [`WriterContext::is_running`] turns false. A writer whose own work fails should
/// log it and call [`WriterContext::stop_and_clear`]; the coordinator never restarts it.
pub trait MatrixModule: Send {
    /// Display name, also used as the writer thread's name.
    fn name(&self) -> &str;

    /// Static writers run once, inline, before [`Matrix::start`](crate::Matrix::start)
    /// returns.
    fn is_static(&self) -> bool {
        false
    }

    /// Produce changes.
    ///
    /// # Errors
    ///
    /// Returns device errors passed through from [`WriterContext::flush`].
    fn write(&mut self, ctx: &WriterContext) -> Result<()>;

    /// Forget any state carried between iterations.
    fn reset(&mut self) {}
}

impl core::fmt::Debug for dyn MatrixModule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MatrixModule")
            .field("name", &self.name())
            .field("is_static", &self.is_static())
            .finish()
    }
}
