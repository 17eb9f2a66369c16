//! An in-memory [`LedDevice`] that records every frame it is asked to show.
//!
//! Useful for headless runs and tests. The device itself is moved into the
//! [`Matrix`](crate::Matrix); keep a [`VirtualDeviceLog`] to look at what it saw.

use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::{Error, LedDevice, PixelGrid, Result};

/// Frames and lifecycle calls seen by a [`VirtualDevice`].
#[derive(Debug, Default)]
pub struct DeviceRecord {
    pub frames: Vec<PixelGrid<u8>>,
    pub connect_calls: usize,
    pub close_calls: usize,
    pub open: bool,
    pub fail_connect: bool,
    pub fail_render: bool,
}

/// Shared view of a [`VirtualDevice`]'s record.
#[derive(Clone, Debug, Default)]
pub struct VirtualDeviceLog(Arc<Mutex<DeviceRecord>>);

impl VirtualDeviceLog {
    fn record(&self) -> MutexGuard<'_, DeviceRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every frame rendered so far, oldest first.
    #[must_use]
    pub fn frames(&self) -> Vec<PixelGrid<u8>> {
        self.record().frames.clone()
    }

    #[must_use]
    pub fn render_count(&self) -> usize {
        self.record().frames.len()
    }

    #[must_use]
    pub fn last_frame(&self) -> Option<PixelGrid<u8>> {
        self.record().frames.last().cloned()
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.record().connect_calls
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.record().close_calls
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.record().open
    }

    /// Make the next `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.record().fail_connect = fail;
    }

    /// Make the next `render_matrix` calls fail.
    pub fn set_fail_render(&self, fail: bool) {
        self.record().fail_render = fail;
    }
}

/// A matrix that lives in memory. Lit cells are `0xFF`, dark cells `0x00`.
#[derive(Debug)]
pub struct VirtualDevice {
    width: usize,
    height: usize,
    render_delay: Duration,
    log: VirtualDeviceLog,
}

impl VirtualDevice {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            render_delay: Duration::ZERO,
            log: VirtualDeviceLog::default(),
        }
    }

    /// Sleep this long inside every render, like slow hardware would.
    #[must_use]
    pub const fn with_render_delay(mut self, render_delay: Duration) -> Self {
        self.render_delay = render_delay;
        self
    }

    /// Start out already connected.
    #[must_use]
    pub fn opened(self) -> Self {
        self.log.record().open = true;
        self
    }

    /// A handle that stays valid after the device is moved into a matrix.
    #[must_use]
    pub fn log(&self) -> VirtualDeviceLog {
        self.log.clone()
    }
}

impl LedDevice for VirtualDevice {
    type Pixel = u8;

    const ON: u8 = 0xFF;
    const OFF: u8 = 0x00;

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_open(&self) -> bool {
        self.log.is_open()
    }

    fn connect(&mut self) -> Result<()> {
        let mut record = self.log.record();
        record.connect_calls = record.connect_calls.saturating_add(1);
        if record.fail_connect {
            return Err(Error::DeviceConnection("virtual device unreachable".to_owned()));
        }
        record.open = true;
        debug!("virtual device {}x{} connected", self.width, self.height);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut record = self.log.record();
        record.close_calls = record.close_calls.saturating_add(1);
        record.open = false;
        debug!("virtual device closed");
        Ok(())
    }

    fn render_matrix(&mut self, grid: &PixelGrid<u8>) -> Result<()> {
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        let mut record = self.log.record();
        if record.fail_render {
            return Err(Error::DeviceIo("virtual device rejected frame".to_owned()));
        }
        if !record.open {
            return Err(Error::DeviceIo("virtual device is closed".to_owned()));
        }
        trace!("virtual device frame #{}", record.frames.len());
        record.frames.push(grid.clone());
        Ok(())
    }
}
