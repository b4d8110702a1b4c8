// Watermark renderer module
// Shapes the mark text with cosmic-text, draws one rotated tile and repeats
// it across a canvas

use crate::color::Rgba;
use crate::config::WatermarkProps;
use crate::error::ColorError;
use crate::form::{FontFamily, FontWeight};
use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache, Weight};
use image::RgbaImage;
use log::{debug, warn};

/// Line height relative to font size
const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Largest text mask, in pixels (one coverage byte each)
const MAX_MASK_SIZE: usize = 64 * 1024 * 1024;

/// Coverage mask of the shaped mark text, before rotation
#[derive(Debug, Clone)]
pub struct TextMask {
    pub width: u32,
    pub height: u32,
    /// One byte of coverage per pixel, row-major
    pub coverage: Vec<u8>,
}

impl TextMask {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            coverage: Vec::new(),
        }
    }

    fn get(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        self.coverage[(y as u64 * self.width as u64 + x as u64) as usize] as f32
    }

    /// Bilinear sample at a continuous position (pixel centers at +0.5)
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x - 0.5;
        let y = y - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let v00 = self.get(x0, y0);
        let v10 = self.get(x0 + 1, y0);
        let v01 = self.get(x0, y0 + 1);
        let v11 = self.get(x0 + 1, y0 + 1);

        let v0 = v00 * (1.0 - fx) + v10 * fx;
        let v1 = v01 * (1.0 - fx) + v11 * fx;
        v0 * (1.0 - fy) + v1 * fy
    }
}

/// Placement of the repeating tile inside a canvas, in output pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub tile_width: u32,
    pub tile_height: u32,
    /// Position of the first tile; may be negative
    pub origin_x: f32,
    pub origin_y: f32,
    /// Nothing is drawn left of / above this point
    pub clip_x: f32,
    pub clip_y: f32,
}

impl TileGrid {
    /// Grid start folded into the first period, in whole pixels
    fn phase(&self) -> (i64, i64) {
        let fold = |origin: f32, period: u32| {
            (origin as f64).round().rem_euclid(period.max(1) as f64) as i64
        };
        (
            fold(self.origin_x, self.tile_width),
            fold(self.origin_y, self.tile_height),
        )
    }

    fn clip_start(&self) -> (i64, i64) {
        (
            (self.clip_x.round() as i64).max(0),
            (self.clip_y.round() as i64).max(0),
        )
    }
}

/// Work out the tile grid for a mark of the given size.
///
/// Each tile is the mark plus one gap on each axis. Without an explicit
/// offset the mark sits half a gap in, which puts the first tile at the
/// container's corner. A positive start leaves the strip before it bare; a
/// negative one repeats tiles back across the edge.
pub fn tile_grid(props: &WatermarkProps, mark_width: f32, mark_height: f32, scale: f32) -> TileGrid {
    let gap_x = props.gap[0].max(0.0) * scale;
    let gap_y = props.gap[1].max(0.0) * scale;
    let center_x = gap_x / 2.0;
    let center_y = gap_y / 2.0;
    let offset_x = props.offset[0].map_or(center_x, |v| v * scale);
    let offset_y = props.offset[1].map_or(center_y, |v| v * scale);

    let origin_x = offset_x - center_x;
    let origin_y = offset_y - center_y;

    TileGrid {
        tile_width: (mark_width + gap_x).round().max(1.0) as u32,
        tile_height: (mark_height + gap_y).round().max(1.0) as u32,
        origin_x,
        origin_y,
        clip_x: origin_x.max(0.0),
        clip_y: origin_y.max(0.0),
    }
}

/// Renders watermark tiles. Holds the font database, which is slow to build,
/// so one renderer should be reused across exports.
pub struct WatermarkRenderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl Default for WatermarkRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl WatermarkRenderer {
    pub fn new() -> Self {
        Self::with_font_system(FontSystem::new())
    }

    pub fn with_font_system(font_system: FontSystem) -> Self {
        Self {
            font_system,
            swash_cache: SwashCache::new(),
        }
    }

    /// Shape and rasterize the mark text at `scale` times its CSS size
    pub fn rasterize_text(&mut self, props: &WatermarkProps, scale: f32) -> TextMask {
        self.rasterize_text_within(props, scale, MAX_MASK_SIZE)
    }

    fn rasterize_text_within(
        &mut self,
        props: &WatermarkProps,
        scale: f32,
        max_pixels: usize,
    ) -> TextMask {
        if props.content.is_empty() {
            return TextMask::empty();
        }

        let font_px = props.font_style.font_size_px() * scale;
        let line_height = font_px * LINE_HEIGHT_FACTOR;
        let attrs = Attrs::new()
            .family(family(props.font_style.font_family))
            .weight(weight(props.font_style.font_weight));

        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(font_px, line_height));
        buffer.set_size(&mut self.font_system, None, None);
        buffer.set_text(&mut self.font_system, &props.content, attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        let (text_width, lines) = buffer
            .layout_runs()
            .fold((0.0f32, 0usize), |(w, n), run| (w.max(run.line_w), n + 1));
        let measured_width = text_width.ceil() as u32;
        let measured_height = (lines as f32 * line_height).ceil() as u32;
        let (width, height) = mask_size(measured_width, measured_height, max_pixels);
        if width == 0 || height == 0 {
            return TextMask::empty();
        }
        if (width, height) != (measured_width, measured_height) {
            warn!(
                "Watermark text {}x{} is too large, cut to {}x{}",
                measured_width, measured_height, width, height
            );
        }

        let stride = width as usize;
        let mut coverage = vec![0u8; stride * height as usize];
        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            Color::rgba(0, 0, 0, 255),
            |x, y, w, h, color| {
                for py in y..y.saturating_add(h as i32) {
                    for px in x..x.saturating_add(w as i32) {
                        if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                            continue;
                        }
                        let idx = py as usize * stride + px as usize;
                        coverage[idx] = coverage[idx].max(color.a());
                    }
                }
            },
        );

        TextMask {
            width,
            height,
            coverage,
        }
    }

    /// Paint the watermark over `canvas`
    pub fn paint(
        &mut self,
        canvas: &mut RgbaImage,
        props: &WatermarkProps,
        scale: f32,
    ) -> Result<(), ColorError> {
        if props.content.is_empty() {
            return Ok(());
        }

        let color: Rgba = props.font_style.color.parse()?;
        let mask = self.rasterize_text(props, scale);
        let grid = tile_grid(props, mask.width as f32, mask.height as f32, scale);
        debug!(
            "Watermark tile {}x{} at ({:.1}, {:.1})",
            grid.tile_width, grid.tile_height, grid.origin_x, grid.origin_y
        );

        // A tile never outgrows the canvas; wide gaps draw each mark in place
        let (tile_width, tile_height) = (grid.tile_width, grid.tile_height);
        if tile_width <= canvas.width() && tile_height <= canvas.height() {
            let tile = rotate_mask_into_tile(&mask, color, props.rotate, tile_width, tile_height);
            stamp_tiles(canvas, &tile, &grid);
        } else {
            stamp_marks(canvas, &mask, color, props.rotate, &grid);
        }
        Ok(())
    }
}

/// Fit a mask into `max_pixels`, keeping full line height where possible
fn mask_size(width: u32, height: u32, max_pixels: usize) -> (u32, u32) {
    let max_pixels = max_pixels.max(1);
    let height = (height as usize).min(max_pixels);
    if height == 0 {
        return (width, 0);
    }
    let width = (width as usize).min(max_pixels / height);
    (width as u32, height as u32)
}

fn family(f: FontFamily) -> Family<'static> {
    match f {
        FontFamily::SansSerif => Family::SansSerif,
        FontFamily::Serif => Family::Serif,
    }
}

fn weight(w: FontWeight) -> Weight {
    match w {
        FontWeight::Lighter => Weight::LIGHT,
        FontWeight::Normal => Weight::NORMAL,
        FontWeight::Bold => Weight::BOLD,
    }
}

/// Maps tile pixels back into mask space for a mark rotated about the
/// tile center
struct MarkTransform {
    sin: f32,
    cos: f32,
    center_x: f64,
    center_y: f64,
    half_w: f32,
    half_h: f32,
}

impl MarkTransform {
    fn new(mask: &TextMask, degrees: f32, tile_width: u32, tile_height: u32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            sin,
            cos,
            center_x: tile_width as f64 / 2.0,
            center_y: tile_height as f64 / 2.0,
            half_w: mask.width as f32 / 2.0,
            half_h: mask.height as f32 / 2.0,
        }
    }

    /// Alpha of the mark at tile pixel (x, y)
    fn alpha_at(&self, mask: &TextMask, alpha: u8, x: u64, y: u64) -> u8 {
        let dx = (x as f64 + 0.5 - self.center_x) as f32;
        let dy = (y as f64 + 0.5 - self.center_y) as f32;

        // Inverse rotation back into mask space
        let sx = dx * self.cos + dy * self.sin + self.half_w;
        let sy = -dx * self.sin + dy * self.cos + self.half_h;

        let coverage = mask.sample(sx, sy);
        if coverage <= 0.0 {
            return 0;
        }
        (alpha as f32 * coverage / 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// Distance from the tile center beyond which the mark has no coverage
    fn reach(&self) -> f64 {
        let w = self.half_w as f64 + 2.0;
        let h = self.half_h as f64 + 2.0;
        (w * w + h * h).sqrt()
    }
}

/// Rotate the text mask clockwise by `degrees` around the tile center
pub fn rotate_mask_into_tile(
    mask: &TextMask,
    color: Rgba,
    degrees: f32,
    tile_width: u32,
    tile_height: u32,
) -> RgbaImage {
    let mut tile = RgbaImage::new(tile_width, tile_height);
    if mask.width == 0 || mask.height == 0 || color.a == 0 {
        return tile;
    }

    let transform = MarkTransform::new(mask, degrees, tile_width, tile_height);
    let stride = tile_width as usize;
    let canvas: &mut [u8] = &mut tile;
    for y in 0..tile_height {
        for x in 0..tile_width {
            let alpha = transform.alpha_at(mask, color.a, x as u64, y as u64);
            if alpha == 0 {
                continue;
            }

            let idx = (y as usize * stride + x as usize) * 4;
            canvas[idx] = color.r;
            canvas[idx + 1] = color.g;
            canvas[idx + 2] = color.b;
            canvas[idx + 3] = alpha;
        }
    }

    tile
}

/// Repeat `tile` across `canvas` following `grid`, compositing source-over
pub fn stamp_tiles(canvas: &mut RgbaImage, tile: &RgbaImage, grid: &TileGrid) {
    let (width, height) = canvas.dimensions();
    let tw = tile.width().max(1) as i64;
    let th = tile.height().max(1) as i64;
    let (phase_x, phase_y) = grid.phase();
    let (clip_x, clip_y) = grid.clip_start();

    for y in clip_y..height as i64 {
        let ty = (y - phase_y).rem_euclid(th) as u32;
        for x in clip_x..width as i64 {
            let tx = (x - phase_x).rem_euclid(tw) as u32;
            let src = tile.get_pixel(tx, ty).0;
            if src[3] == 0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(x as u32, y as u32);
            dst.0 = blend_over(dst.0, src);
        }
    }
}

/// Draw every mark of `grid` that reaches `canvas` straight onto it, one
/// grid cell at a time. Same pixels as [`stamp_tiles`] with a rendered tile,
/// without ever holding a tile.
pub fn stamp_marks(
    canvas: &mut RgbaImage,
    mask: &TextMask,
    color: Rgba,
    degrees: f32,
    grid: &TileGrid,
) {
    if mask.width == 0 || mask.height == 0 || color.a == 0 {
        return;
    }

    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let tw = grid.tile_width.max(1) as i64;
    let th = grid.tile_height.max(1) as i64;
    let (phase_x, phase_y) = grid.phase();
    let (clip_x, clip_y) = grid.clip_start();
    let transform = MarkTransform::new(mask, degrees, grid.tile_width, grid.tile_height);
    let reach = transform.reach();

    // Pixel span of one cell that the mark can touch, clipped to the canvas
    let span = |cell: i64, period: i64, clip: i64, limit: i64| -> (i64, i64) {
        let center = cell as f64 + period as f64 / 2.0;
        let start = ((center - reach).floor() as i64).max(cell).max(clip);
        let end = ((center + reach).ceil() as i64).min(cell.saturating_add(period)).min(limit);
        (start, end)
    };

    let mut cell_y = first_cell(phase_y, clip_y, th);
    while cell_y < height {
        let (y0, y1) = span(cell_y, th, clip_y, height);
        let mut cell_x = first_cell(phase_x, clip_x, tw);
        while cell_x < width {
            let (x0, x1) = span(cell_x, tw, clip_x, width);
            for y in y0..y1 {
                for x in x0..x1 {
                    let alpha =
                        transform.alpha_at(mask, color.a, (x - cell_x) as u64, (y - cell_y) as u64);
                    if alpha == 0 {
                        continue;
                    }
                    let dst = canvas.get_pixel_mut(x as u32, y as u32);
                    dst.0 = blend_over(dst.0, [color.r, color.g, color.b, alpha]);
                }
            }
            cell_x += tw;
        }
        cell_y += th;
    }
}

/// Start of the grid cell containing `clip`
fn first_cell(phase: i64, clip: i64, period: i64) -> i64 {
    phase + (clip - phase).div_euclid(period) * period
}

/// Source-over compositing of straight-alpha RGBA
pub fn blend_over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let channel = |c: usize| -> u8 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };

    [
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}
