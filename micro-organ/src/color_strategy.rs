use alloc::vec::Vec;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

/// What a color strategy knows about the light it is coloring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorContext {
    pub light_index: usize,
    pub light_count: usize,
    /// Normalized level, 0..1.
    pub level: f32,
}

pub trait ColorStrategy {
    fn get_color(&mut self, context: &ColorContext) -> Rgb888;
}

/// Color every light of a row.
pub fn colorize<S: ColorStrategy + ?Sized>(strategy: &mut S, levels: &[f32]) -> Vec<Rgb888> {
    levels
        .iter()
        .enumerate()
        .map(|(light_index, &level)| {
            strategy.get_color(&ColorContext {
                light_index,
                light_count: levels.len(),
                level,
            })
        })
        .collect()
}

fn lerp_channel(from: u8, to: u8, t: f32) -> u8 {
    let v = from as f32 + (to as f32 - from as f32) * t;
    libm::roundf(v).clamp(0.0, 255.0) as u8
}

/// Clamped linear gradient from `from` at level 0 to `to` at level 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientColor {
    from: Rgb888,
    to: Rgb888,
}

impl Default for GradientColor {
    /// Dark red to warm white.
    fn default() -> Self {
        Self::new(Rgb888::new(0x60, 0x20, 0x20), Rgb888::new(0xFF, 0xFB, 0xE8))
    }
}

impl GradientColor {
    pub const fn new(from: Rgb888, to: Rgb888) -> Self {
        Self { from, to }
    }

    pub fn at(&self, level: f32) -> Rgb888 {
        let t = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        Rgb888::new(
            lerp_channel(self.from.r(), self.to.r(), t),
            lerp_channel(self.from.g(), self.to.g(), t),
            lerp_channel(self.from.b(), self.to.b(), t),
        )
    }
}

impl ColorStrategy for GradientColor {
    fn get_color(&mut self, context: &ColorContext) -> Rgb888 {
        self.at(context.level)
    }
}

fn wheel(pos: u8) -> Rgb888 {
    let pos = pos % 255;
    if pos < 85 {
        Rgb888::new(pos * 3, 255 - pos * 3, 0)
    } else if pos < 170 {
        let pos = pos - 85;
        Rgb888::new(255 - pos * 3, 0, pos * 3)
    } else {
        let pos = pos - 170;
        Rgb888::new(0, pos * 3, 255 - pos * 3)
    }
}

/// Hue follows the light's position across the row, brightness follows its level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpectrumColor;

impl ColorStrategy for SpectrumColor {
    fn get_color(&mut self, context: &ColorContext) -> Rgb888 {
        let pos = (context.light_index * 255 / context.light_count.max(1)) as u8;
        let hue = wheel(pos);
        let t = if context.level.is_nan() {
            0.0
        } else {
            context.level.clamp(0.0, 1.0)
        };
        Rgb888::new(
            lerp_channel(0, hue.r(), t),
            lerp_channel(0, hue.g(), t),
            lerp_channel(0, hue.b(), t),
        )
    }
}
