//! The coordinator: owns the grid, serializes writer updates, and drives the device.
//!
//! Writers enqueue [`ChangeEvent`]s without waiting on anything. A flush drains the
//! queue under the grid lock, then renders the result with the grid lock released, so a
//! slow device never holds up a writer that is only enqueuing.
//!
//! ```text
//!  writer thread ──enqueue──▶ ChangeChannel ──drain (grid lock)──▶ PixelGrid
//!  writer thread ──flush──────────────────────────────────────────▶ LedDevice::render_matrix
//! ```

use core::{cell::RefCell, fmt, time::Duration};
use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Instant,
};

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use itertools::Itertools;
use log::{debug, error, info, trace, warn};
use portable_atomic::{AtomicBool, Ordering};

use crate::{
    ChangeChannel, ChangeEvent, Error, LedDevice, PixelGrid, Result, StopSignal,
    change::Enqueued,
    shared_constants::{BORDER_CHAR, OFF_CHAR, ON_CHAR},
    writer::{Capabilities, ChangeSink, MatrixModule, WriterContext},
};

// How often a bounded stop checks whether stragglers have finished.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// State shared between the coordinator and every writer thread.
struct Shared<D: LedDevice> {
    width: usize,
    height: usize,
    grid: Mutex<CriticalSectionRawMutex, RefCell<PixelGrid<D::Pixel>>>,
    changes: ChangeChannel,
    device: StdMutex<D>,
    // Set once the device is closed. Nothing renders after that.
    closed: AtomicBool,
}

impl<D: LedDevice> Shared<D> {
    fn device(&self) -> MutexGuard<'_, D> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pop until empty (or shut down), applying each change. Caller holds the grid lock.
    fn drain_into(&self, grid: &mut PixelGrid<D::Pixel>) -> usize {
        let mut applied = 0_usize;
        while let Some(event) = self.changes.try_pop() {
            grid.set(event.x, event.y, D::encode(event.on));
            applied = applied.saturating_add(1);
        }
        applied
    }

    fn apply_backlog(&self) -> usize {
        self.grid.lock(|cell| self.drain_into(&mut cell.borrow_mut()))
    }

    fn snapshot(&self) -> PixelGrid<D::Pixel> {
        self.grid.lock(|cell| cell.borrow().clone())
    }

    fn replace_grid(&self, grid: PixelGrid<D::Pixel>) {
        self.grid.lock(|cell| *cell.borrow_mut() = grid);
    }

    fn enqueue(&self, event: ChangeEvent) {
        if event.x >= self.width || event.y >= self.height {
            warn!(
                "dropping change at ({}, {}): outside the {}x{} matrix",
                event.x, event.y, self.width, self.height
            );
            return;
        }
        let mut event = event;
        loop {
            match self.changes.try_enqueue(event) {
                Enqueued::Queued | Enqueued::Closed => return,
                Enqueued::Full(returned) => {
                    // Make room by applying what is already queued; order is preserved.
                    let applied = self.apply_backlog();
                    trace!("change channel full, applied {applied} queued changes early");
                    event = returned;
                }
            }
        }
    }

    fn flush(&self) -> Result<()> {
        if self.is_closed() {
            trace!("flush after stop ignored");
            return Ok(());
        }
        // Holding the device lock keeps renders in drain order.
        let mut device = self.device();
        if self.is_closed() {
            return Ok(());
        }
        let (applied, frame) = self.grid.lock(|cell| {
            let mut grid = cell.borrow_mut();
            let applied = self.drain_into(&mut grid);
            (applied, grid.clone())
        });
        debug!("flush: applied {applied} changes, rendering");
        device.render_matrix(&frame)
    }
}

impl<D: LedDevice> Capabilities for Shared<D> {
    fn enqueue(&self, event: ChangeEvent) {
        Self::enqueue(self, event);
    }

    fn flush(&self) -> Result<()> {
        Self::flush(self)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }
}

/// The coordinator's record of one writer.
pub struct WriterHandle {
    name: String,
    is_static: bool,
    stop_signal: StopSignal,
    thread: Option<JoinHandle<Box<dyn MatrixModule>>>,
    // Static writers stay here; threaded writers come back here once joined.
    module: Option<Box<dyn MatrixModule>>,
}

impl WriterHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }

    /// Whether the writer's thread is still alive. Static writers never are.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Join the thread, if any, taking the module back. Records a panic by name.
    fn join(&mut self, panicked: &mut Vec<String>) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match thread.join() {
            Ok(module) => {
                debug!("writer {} joined", self.name);
                self.module = Some(module);
            }
            Err(_) => {
                error!("{}", Error::WriterPanicked(self.name.clone()));
                panicked.push(self.name.clone());
            }
        }
    }
}

impl fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterHandle")
            .field("name", &self.name)
            .field("is_static", &self.is_static)
            .field("stopped", &self.stop_signal.is_stopped())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// What [`Matrix::stop`] found while shutting writers down.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Writers whose threads were joined.
    pub joined: Vec<String>,
    /// Writers whose threads panicked.
    pub panicked: Vec<String>,
    /// Writers still running when a bounded stop gave up and detached them.
    pub timed_out: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Ready,
    Running,
    Stopped,
}

/// Owns the pixel grid and the writers that update it.
///
/// # Example
///
/// ```
/// use matrix_kit::{Matrix, VirtualDevice};
///
/// let device = VirtualDevice::new(3, 2);
/// let log = device.log();
/// let mut matrix = Matrix::builder().device(device).build()?;
/// matrix.start()?;
/// matrix.stop()?;
/// assert_eq!(log.close_calls(), 1);
/// # Ok::<(), matrix_kit::Error>(())
/// ```
pub struct Matrix<D: LedDevice + 'static> {
    shared: Arc<Shared<D>>,
    pending: Vec<Box<dyn MatrixModule>>,
    writers: Vec<WriterHandle>,
    lifecycle: Lifecycle,
}

impl<D: LedDevice + 'static> Matrix<D> {
    /// Create a coordinator for `device`, connecting it if it is not already open.
    ///
    /// `initial_grid` defaults to all OFF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GridDimensionMismatch`] or [`Error::InvalidPixelValue`] for a bad
    /// `initial_grid`, or the device's connection error.
    pub fn new(
        mut device: D,
        modules: Vec<Box<dyn MatrixModule>>,
        initial_grid: Option<PixelGrid<D::Pixel>>,
    ) -> Result<Self> {
        let width = device.width();
        let height = device.height();
        let grid = match initial_grid {
            Some(grid) => {
                validate_grid::<D>(&grid, width, height)?;
                grid
            }
            None => device.blank_grid(),
        };
        if !device.is_open() {
            device.connect()?;
        }
        info!(
            "matrix {width}x{height} ready with {} writer(s)",
            modules.len()
        );
        Ok(Self {
            shared: Arc::new(Shared {
                width,
                height,
                grid: Mutex::new(RefCell::new(grid)),
                changes: ChangeChannel::new(),
                device: StdMutex::new(device),
                closed: AtomicBool::new(false),
            }),
            pending: modules,
            writers: Vec::new(),
            lifecycle: Lifecycle::Ready,
        })
    }

    #[must_use]
    pub fn builder() -> MatrixBuilder<D> {
        MatrixBuilder::default()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.shared.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.shared.height
    }

    /// True between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// A copy of the current grid.
    #[must_use]
    pub fn grid(&self) -> PixelGrid<D::Pixel> {
        self.shared.snapshot()
    }

    /// The enqueue/flush handle writers get. Hosts may use it too.
    #[must_use]
    pub fn sink(&self) -> ChangeSink {
        ChangeSink::new(Arc::clone(&self.shared) as Arc<dyn Capabilities>)
    }

    /// Names of every started writer, in start order.
    pub fn writer_names(&self) -> impl Iterator<Item = &str> {
        self.writers.iter().map(WriterHandle::name)
    }

    #[must_use]
    pub fn writers(&self) -> &[WriterHandle] {
        &self.writers
    }

    /// Launch every writer, in configuration order.
    ///
    /// Static writers run to completion right here; the others each get a thread named
    /// after the writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] or [`Error::Stopped`] when called out of turn,
    /// [`Error::WriterSpawn`] if a thread cannot be created, or a device error passed
    /// through from a static writer. Writers launched before the failure keep running
    /// until [`stop`](Self::stop).
    pub fn start(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Running => return Err(Error::AlreadyStarted),
            Lifecycle::Stopped => return Err(Error::Stopped),
            Lifecycle::Ready => {}
        }
        self.lifecycle = Lifecycle::Running;
        info!("starting {} writer(s)", self.pending.len());

        let mut modules = core::mem::take(&mut self.pending).into_iter();
        let mut failure = None;
        for module in modules.by_ref() {
            if let Err(err) = self.launch(module) {
                failure = Some(err);
                break;
            }
        }
        match failure {
            Some(err) => {
                self.pending.extend(modules);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn launch(&mut self, mut module: Box<dyn MatrixModule>) -> Result<()> {
        let name = module.name().to_owned();
        let is_static = module.is_static();
        let stop_signal = StopSignal::new();
        let ctx = WriterContext::new(self.sink(), stop_signal.clone());

        if is_static {
            debug!("running static writer {name}");
            let result = module.write(&ctx);
            self.writers.push(WriterHandle {
                name,
                is_static,
                stop_signal,
                thread: None,
                module: Some(module),
            });
            return result;
        }

        debug!("spawning writer {name}");
        // std rejects thread names with interior NULs; the handle keeps the real name.
        let thread = thread::Builder::new()
            .name(name.replace('\0', "\u{fffd}"))
            .spawn(move || {
                if let Err(err) = module.write(&ctx) {
                    error!("writer {} exited: {err}", module.name());
                }
                module
            })
            .map_err(|err| Error::WriterSpawn(err.to_string()))?;
        self.writers.push(WriterHandle {
            name,
            is_static,
            stop_signal,
            thread: Some(thread),
            module: None,
        });
        Ok(())
    }

    /// Drain queued changes into the grid and render once. A no-op after [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }

    /// Replace the whole grid and render it.
    ///
    /// This bypasses the change queue and competes with running writers; prefer writers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GridDimensionMismatch`] or [`Error::InvalidPixelValue`] (leaving the
    /// current grid untouched), [`Error::Stopped`] after [`stop`](Self::stop), or the
    /// device's render error.
    pub fn set_matrix(&self, grid: PixelGrid<D::Pixel>) -> Result<()> {
        validate_grid::<D>(&grid, self.width(), self.height())?;
        if self.lifecycle == Lifecycle::Stopped {
            return Err(Error::Stopped);
        }
        self.shared.replace_grid(grid);
        self.shared.flush()
    }

    /// Shut the change queue for good, blank the grid, and render it.
    ///
    /// # Errors
    ///
    /// Passes through the device's render error.
    pub fn reset_matrix(&self) -> Result<()> {
        info!("resetting matrix");
        self.shared.changes.shut_down();
        self.shared
            .replace_grid(PixelGrid::filled(self.width(), self.height(), D::OFF));
        self.shared.flush()
    }

    /// Stop every writer, wait for all of them, blank the display, and close the device.
    ///
    /// Calling it again does nothing. Blocks for as long as the slowest writer takes to
    /// notice its [`StopSignal`]; see [`stop_within`](Self::stop_within) for a bound.
    ///
    /// # Errors
    ///
    /// Passes through the device's render or close error. The device is closed either way.
    pub fn stop(&mut self) -> Result<StopReport> {
        self.shut_down(None)
    }

    /// Like [`stop`](Self::stop), but gives writers at most `timeout` to exit.
    ///
    /// Writers still running at the deadline are detached. Their later enqueues and
    /// flushes do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriterStopTimeout`] naming the detached writers, or a device error.
    /// The device is closed either way.
    pub fn stop_within(&mut self, timeout: Duration) -> Result<StopReport> {
        // A timeout too large to represent is no bound at all.
        let report = self.shut_down(Instant::now().checked_add(timeout))?;
        if report.timed_out.is_empty() {
            Ok(report)
        } else {
            Err(Error::WriterStopTimeout {
                names: report.timed_out,
            })
        }
    }

    fn shut_down(&mut self, deadline: Option<Instant>) -> Result<StopReport> {
        let mut report = StopReport::default();
        if self.lifecycle == Lifecycle::Stopped {
            debug!("stop: already stopped");
            return Ok(report);
        }
        self.lifecycle = Lifecycle::Stopped;
        info!("stopping {} writer(s)", self.writers.len());

        for writer in &self.writers {
            writer.stop_signal.stop();
        }

        for writer in &mut self.writers {
            if writer.thread.is_none() {
                continue;
            }
            if let Some(deadline) = deadline {
                while writer.is_alive() && Instant::now() < deadline {
                    thread::sleep(JOIN_POLL_INTERVAL);
                }
                if writer.is_alive() {
                    warn!("writer {} did not stop in time, detaching it", writer.name);
                    writer.thread = None;
                    report.timed_out.push(writer.name.clone());
                    continue;
                }
            }
            writer.join(&mut report.panicked);
            if writer.module.is_some() {
                report.joined.push(writer.name.clone());
            }
        }

        for module in self.writers.iter_mut().filter_map(|writer| writer.module.as_mut()) {
            module.reset();
        }

        if !report.panicked.is_empty() {
            error!("panicked writers: {}", report.panicked.iter().join(", "));
        }

        let reset = self.reset_matrix();
        self.shared.closed.store(true, Ordering::Release);
        let close = self.shared.device().close();
        info!("matrix stopped");
        reset?;
        close?;
        Ok(report)
    }

    /// A bordered text picture of the current grid.
    #[must_use]
    pub fn describe(&self) -> String {
        let grid = self.grid();
        let border: String =
            core::iter::repeat_n(BORDER_CHAR, self.width().saturating_mul(2).saturating_sub(2))
                .collect();
        let mut text = String::new();
        text.push_str(&border);
        text.push('\n');
        for y in 0..self.height() {
            text.push(BORDER_CHAR);
            text.push(' ');
            for x in 0..self.width() {
                text.push(if grid.get(x, y) == Some(D::ON) {
                    ON_CHAR
                } else {
                    OFF_CHAR
                });
                text.push(' ');
            }
            text.push(BORDER_CHAR);
            text.push('\n');
        }
        text.push_str(&border);
        text
    }
}

impl<D: LedDevice + 'static> fmt::Display for Matrix<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<D: LedDevice + 'static> fmt::Debug for Matrix<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("lifecycle", &self.lifecycle)
            .field("changes", &self.shared.changes)
            .field("writers", &self.writers)
            .finish_non_exhaustive()
    }
}

impl<D: LedDevice + 'static> Drop for Matrix<D> {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Stopped {
            if let Err(err) = self.stop() {
                error!("stop on drop failed: {err}");
            }
        }
    }
}

fn validate_grid<D: LedDevice>(
    grid: &PixelGrid<D::Pixel>,
    width: usize,
    height: usize,
) -> Result<()> {
    if !grid.same_dimensions(width, height) {
        return Err(Error::GridDimensionMismatch {
            expected_width: width,
            expected_height: height,
            width: grid.width(),
            height: grid.height(),
        });
    }
    match grid
        .iter()
        .find(|&(_, _, pixel)| pixel != D::ON && pixel != D::OFF)
    {
        Some((x, y, _)) => Err(Error::InvalidPixelValue { x, y }),
        None => Ok(()),
    }
}

/// Step-by-step construction of a [`Matrix`].
pub struct MatrixBuilder<D: LedDevice> {
    device: Option<D>,
    modules: Vec<Box<dyn MatrixModule>>,
    initial_grid: Option<PixelGrid<D::Pixel>>,
}

impl<D: LedDevice> Default for MatrixBuilder<D> {
    fn default() -> Self {
        Self {
            device: None,
            modules: Vec::new(),
            initial_grid: None,
        }
    }
}

impl<D: LedDevice + 'static> MatrixBuilder<D> {
    #[must_use]
    pub fn device(mut self, device: D) -> Self {
        self.device = Some(device);
        self
    }

    #[must_use]
    pub fn module(mut self, module: impl MatrixModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    #[must_use]
    pub fn modules(mut self, modules: impl IntoIterator<Item = Box<dyn MatrixModule>>) -> Self {
        self.modules.extend(modules);
        self
    }

    #[must_use]
    pub fn initial_grid(mut self, grid: PixelGrid<D::Pixel>) -> Self {
        self.initial_grid = Some(grid);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::NoDevice`] without a device, otherwise whatever [`Matrix::new`]
    /// returns.
    pub fn build(self) -> Result<Matrix<D>> {
        let device = self.device.ok_or(Error::NoDevice)?;
        Matrix::new(device, self.modules, self.initial_grid)
    }
}

impl<D: LedDevice> fmt::Debug for MatrixBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixBuilder")
            .field("has_device", &self.device.is_some())
            .field("modules", &self.modules.len())
            .field("has_initial_grid", &self.initial_grid.is_some())
            .finish()
    }
}
