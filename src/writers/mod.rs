//! Ready-made writer modules.

mod font;
mod line;
mod ram;

pub use font::{GLYPH_HEIGHT, GLYPH_WIDTH, font3x4};
pub use line::{LineModule, LineStyle};
pub use ram::{GbReading, MemoryProbe, ProcMeminfo, RamModule};

use embedded_graphics::{
    mono_font::MonoTextStyleBuilder,
    pixelcolor::BinaryColor,
    prelude::{Drawable, Point},
    text::{Baseline, Text},
};

use crate::WriterContext;

/// Draw `text` in the 3x4 font with its top-left corner at `(x, y)`.
///
/// Whole glyph cells are written, so the text replaces whatever was there.
pub fn write_text(ctx: &WriterContext, text: &str, x: usize, y: usize) {
    let font = font3x4();
    let style = MonoTextStyleBuilder::new()
        .font(&font)
        .text_color(BinaryColor::On)
        .background_color(BinaryColor::Off)
        .build();
    let origin = Point::new(to_coordinate(x), to_coordinate(y));
    let mut target = ctx.draw_target();
    match Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut target) {
        Ok(_) => {}
        Err(never) => match never {},
    }
}

// Anything this large is off the matrix anyway and gets dropped on enqueue.
fn to_coordinate(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
