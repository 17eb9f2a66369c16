//! Used system memory, in GB, as two digits plus a hundredths bar.
//!
//! ```text
//!  col: 0 1 2 3 4 5 6 7 8
//!  row 0  [tens] [ones]  ▮   hundredths > 0
//!  ...                   ▮   ... > 40 (rows 0-4)
//!  row 6  ▮                  hundredths > 50
//!  row 7  ▮  g       b       ... > 90 (rows 6-10)
//! ```

use core::fmt::Write as _;
use std::path::PathBuf;

use log::{debug, error};

use crate::{Error, MatrixModule, ModuleConfig, ModuleRegion, Result, WriterContext};

use super::{GLYPH_WIDTH, write_text};

const WIDTH: usize = 9;
const HEIGHT: usize = 11;
const BYTES_PER_HUNDREDTH_GB: u64 = 10_000_000;

/// Where a [`RamModule`] gets its numbers.
pub trait MemoryProbe: Send {
    /// Bytes of memory currently in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryProbe`] when the figure cannot be read.
    fn used_bytes(&mut self) -> Result<u64>;
}

impl<F> MemoryProbe for F
where
    F: FnMut() -> Result<u64> + Send,
{
    fn used_bytes(&mut self) -> Result<u64> {
        self()
    }
}

/// Reads `MemTotal - MemAvailable` from Linux's `/proc/meminfo`.
#[derive(Clone, Debug)]
pub struct ProcMeminfo {
    path: PathBuf,
}

impl ProcMeminfo {
    #[must_use]
    pub fn new() -> Self {
        Self::at("/proc/meminfo")
    }

    /// Read a meminfo-formatted file somewhere else.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// # Errors
    ///
    /// Returns [`Error::MemoryProbe`] if either field is missing or malformed.
    pub fn parse(text: &str) -> Result<u64> {
        let total = meminfo_kib(text, "MemTotal")?;
        let available = meminfo_kib(text, "MemAvailable")?;
        Ok(total.saturating_sub(available).saturating_mul(1024))
    }
}

impl Default for ProcMeminfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcMeminfo {
    fn used_bytes(&mut self) -> Result<u64> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|err| Error::MemoryProbe(format!("{}: {err}", self.path.display())))?;
        Self::parse(&text)
    }
}

fn meminfo_kib(text: &str, field: &str) -> Result<u64> {
    text.lines()
        .find_map(|line| {
            line.strip_prefix(field)?
                .strip_prefix(':')?
                .trim()
                .strip_suffix("kB")?
                .trim()
                .parse()
                .ok()
        })
        .ok_or_else(|| Error::MemoryProbe(format!("{field} missing from meminfo")))
}

/// Memory usage split for display: whole GB (capped at 99) and hundredths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GbReading {
    pub whole: u8,
    pub hundredths: u8,
}

impl GbReading {
    /// Round `bytes` to the nearest hundredth of a (decimal) GB.
    #[must_use]
    #[expect(
        clippy::integer_division_remainder_used,
        clippy::cast_possible_truncation,
        reason = "Both parts are clamped below 100 before narrowing."
    )]
    pub fn from_bytes(bytes: u64) -> Self {
        let hundredths =
            bytes.saturating_add(BYTES_PER_HUNDREDTH_GB / 2) / BYTES_PER_HUNDREDTH_GB;
        Self {
            whole: (hundredths / 100).min(99) as u8,
            hundredths: (hundredths % 100) as u8,
        }
    }

    /// The whole part as two zero-padded digits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormatError`] if the digits do not fit, which a whole part capped at
    /// 99 never does.
    pub fn digits(self) -> Result<heapless::String<2>> {
        let mut digits = heapless::String::new();
        write!(digits, "{:02}", self.whole)?;
        Ok(digits)
    }
}

/// A continuous writer showing used memory in a 9x11 region.
#[derive(Debug)]
pub struct RamModule<P = ProcMeminfo> {
    config: ModuleConfig,
    probe: P,
    previous: Option<heapless::String<2>>,
}

impl RamModule<ProcMeminfo> {
    #[must_use]
    pub fn new(config: ModuleConfig) -> Self {
        Self::with_probe(config, ProcMeminfo::new())
    }
}

impl<P: MemoryProbe> RamModule<P> {
    pub const NAME: &'static str = "RAM Module";

    #[must_use]
    pub const fn with_probe(config: ModuleConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            previous: None,
        }
    }

    #[must_use]
    pub const fn region(&self) -> ModuleRegion {
        self.config.region(WIDTH, HEIGHT)
    }

    fn draw_labels(&self, ctx: &WriterContext) {
        let row = self.config.y.saturating_add(7);
        write_text(ctx, "g", self.config.x.saturating_add(2), row);
        write_text(ctx, "b", self.config.x.saturating_add(6), row);
    }

    /// Enqueue the changes for one reading. Digits already showing are skipped.
    fn draw_reading(&mut self, ctx: &WriterContext, reading: GbReading) -> Result<()> {
        let digits = reading.digits()?;
        let previous = self.previous.as_ref().map(heapless::String::as_str);
        for (index, digit) in digits.char_indices() {
            let unchanged = previous
                .and_then(|previous| previous.get(index..=index))
                .is_some_and(|old| old.starts_with(digit));
            if unchanged {
                continue;
            }
            let column = self
                .config
                .x
                .saturating_add(index.saturating_mul(GLYPH_WIDTH.saturating_add(1)));
            let mut glyph = [0_u8; 4];
            write_text(ctx, digit.encode_utf8(&mut glyph), column, self.config.y);
        }

        for (threshold, x_offset, y_offset) in bar_cells() {
            ctx.enqueue(
                self.config.x.saturating_add(x_offset),
                self.config.y.saturating_add(y_offset),
                reading.hundredths > threshold,
            );
        }
        self.previous = Some(digits);
        Ok(())
    }
}

/// `(threshold, column offset, row offset)` for each of the ten bar cells.
fn bar_cells() -> impl Iterator<Item = (u8, usize, usize)> {
    let upper = (0..5_u8).map(|step| (step.saturating_mul(10), 8, usize::from(step)));
    let lower = (0..5_u8).map(|step| {
        (
            step.saturating_add(5).saturating_mul(10),
            0,
            usize::from(step).saturating_add(6),
        )
    });
    upper.chain(lower)
}

impl<P: MemoryProbe> MatrixModule for RamModule<P> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn write(&mut self, ctx: &WriterContext) -> Result<()> {
        let region = self.region();
        if !ctx.fits(region) {
            error!(
                "Error while running {}: {region:?} does not fit the {}x{} matrix",
                Self::NAME,
                ctx.width(),
                ctx.height()
            );
            return ctx.stop_and_clear(region.clipped_to(ctx.width(), ctx.height()));
        }

        self.draw_labels(ctx);
        while ctx.is_running() {
            let used = match self.probe.used_bytes() {
                Ok(used) => used,
                Err(err) => {
                    error!("Error while running {}: {err}", Self::NAME);
                    return ctx.stop_and_clear(region);
                }
            };
            let reading = GbReading::from_bytes(used);
            debug!("{}: {reading:?}", Self::NAME);
            self.draw_reading(ctx, reading)?;
            ctx.finish_iteration()?;
            if !ctx.sleep(self.config.refresh_interval) {
                break;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{GbReading, ProcMeminfo, RamModule, bar_cells};
    use crate::{
        LedDevice, Matrix, MatrixModule, ModuleConfig, PixelGrid, Result, StopSignal,
        VirtualDevice, WriterContext,
    };

    const READING_12_35: GbReading = GbReading {
        whole: 12,
        hundredths: 35,
    };
    const READING_13_35: GbReading = GbReading {
        whole: 13,
        hundredths: 35,
    };

    fn ram_module() -> RamModule<fn() -> Result<u64>> {
        RamModule::with_probe(ModuleConfig::new(0, 0), || Ok(0))
    }

    fn matrix_and_context() -> (Matrix<VirtualDevice>, WriterContext) {
        let matrix = Matrix::builder()
            .device(VirtualDevice::new(9, 11))
            .build()
            .expect("build");
        let ctx = WriterContext::new(matrix.sink(), StopSignal::new());
        (matrix, ctx)
    }

    fn drawn_from_scratch(reading: GbReading) -> PixelGrid<u8> {
        let (matrix, ctx) = matrix_and_context();
        ram_module().draw_reading(&ctx, reading).expect("draw");
        ctx.flush().expect("flush");
        matrix.grid()
    }

    #[test]
    fn only_changed_digits_are_redrawn_until_reset() {
        let (matrix, ctx) = matrix_and_context();
        let mut module = ram_module();
        module.draw_reading(&ctx, READING_12_35).expect("draw");
        ctx.flush().expect("flush");
        assert_eq!(matrix.grid(), drawn_from_scratch(READING_12_35));

        // Flip one cell of the tens digit so a redraw would be visible.
        let tens_cell = matrix.grid().get(0, 0) == Some(VirtualDevice::ON);
        ctx.enqueue(0, 0, !tens_cell);
        ctx.flush().expect("flush");
        let flipped = VirtualDevice::encode(!tens_cell);

        module.draw_reading(&ctx, READING_13_35).expect("draw");
        ctx.flush().expect("flush");
        let grid = matrix.grid();
        let fresh = drawn_from_scratch(READING_13_35);
        assert_eq!(grid.get(0, 0), Some(flipped), "tens digit must be skipped");
        for x in 4..7 {
            for y in 0..4 {
                assert_eq!(grid.get(x, y), fresh.get(x, y), "ones digit at ({x}, {y})");
            }
        }

        module.draw_reading(&ctx, READING_13_35).expect("draw");
        ctx.flush().expect("flush");
        assert_eq!(matrix.grid().get(0, 0), Some(flipped));

        module.reset();
        module.draw_reading(&ctx, READING_13_35).expect("draw");
        ctx.flush().expect("flush");
        assert_eq!(matrix.grid(), fresh);
    }

    #[test]
    fn reading_rounds_to_hundredths() {
        assert_eq!(
            GbReading::from_bytes(12_345_000_000),
            GbReading {
                whole: 12,
                hundredths: 35
            }
        );
        assert_eq!(
            GbReading::from_bytes(4_994_999_999),
            GbReading {
                whole: 4,
                hundredths: 99
            }
        );
        assert_eq!(GbReading::from_bytes(4_995_000_000).whole, 5);
    }

    #[test]
    fn reading_caps_whole_part_at_two_digits() {
        let reading = GbReading::from_bytes(250_000_000_000);
        assert_eq!(reading.whole, 99);
        assert_eq!(reading.digits().expect("two digits").as_str(), "99");
        assert_eq!(
            GbReading::from_bytes(3_000_000_000)
                .digits()
                .expect("two digits")
                .as_str(),
            "03"
        );
    }

    #[test]
    fn bar_has_ten_distinct_cells() {
        let cells: Vec<_> = bar_cells().collect();
        assert_eq!(cells.len(), 10);
        assert_eq!(cells.first(), Some(&(0, 8, 0)));
        assert_eq!(cells.get(4), Some(&(40, 8, 4)));
        assert_eq!(cells.get(5), Some(&(50, 0, 6)));
        assert_eq!(cells.last(), Some(&(90, 0, 10)));
    }

    #[test]
    fn meminfo_used_is_total_minus_available() {
        let text = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    6000000 kB\n";
        assert_eq!(ProcMeminfo::parse(text), Ok(10_000_000 * 1024));
    }

    #[test]
    fn meminfo_without_available_is_an_error() {
        assert!(ProcMeminfo::parse("MemTotal: 100 kB\n").is_err());
    }
}
