use embedded_graphics::{
    Pixel,
    pixelcolor::BinaryColor,
    prelude::{DrawTarget, Point},
    primitives::{Line, PointsIter},
};
use log::{debug, error};

use crate::{MatrixModule, ModuleConfig, ModuleRegion, Result, WriterContext};

use super::to_coordinate;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineStyle {
    #[default]
    Solid,
    /// Only cells in even columns are lit.
    Dashed,
}

/// A static horizontal line, `width` cells long, starting at the config's position.
#[derive(Clone, Debug)]
pub struct LineModule {
    config: ModuleConfig,
    width: usize,
    style: LineStyle,
}

impl LineModule {
    pub const NAME: &'static str = "Line Module";

    #[must_use]
    pub const fn new(config: ModuleConfig, width: usize) -> Self {
        Self {
            config,
            width,
            style: LineStyle::Solid,
        }
    }

    #[must_use]
    pub const fn with_style(mut self, style: LineStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub const fn region(&self) -> ModuleRegion {
        self.config.region(self.width, 1)
    }
}

impl MatrixModule for LineModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_static(&self) -> bool {
        true
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

        if let Some(last) = self.width.checked_sub(1) {
            let y = to_coordinate(self.config.y);
            let start = Point::new(to_coordinate(self.config.x), y);
            let end = Point::new(to_coordinate(self.config.x.saturating_add(last)), y);
            let style = self.style;
            let pixels = Line::new(start, end)
                .points()
                .filter(|point| style == LineStyle::Solid || point.x.rem_euclid(2) == 0)
                .map(|point| Pixel(point, BinaryColor::On));
            let mut target = ctx.draw_target();
            match target.draw_iter(pixels) {
                Ok(()) => {}
                Err(never) => match never {},
            }
            debug!("{}: drew {:?} line {region:?}", Self::NAME, self.style);
        }

        ctx.finish_iteration()
    }
}
