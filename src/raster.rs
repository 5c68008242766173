/**
 * Rasterization of Blob Scenes
 *
 * Blob outlines are handed to the Anti-Grain Geometry pipeline and painted
 * into an 8-bit grayscale image:
 *
 * 1. The blob path's cubic segments are flattened by `ConvCurve`
 * 2. The flattened outline is filled with the nonzero winding rule
 * 3. The outline is stroked with a 2 pixel pen (round joins) in the same
 *    color, so shapes come out slightly fuller than their control points
 *    suggest
 *
 * Shapes are painted in call order onto a dark background, later shapes
 * covering earlier ones. Coverage is thresholded at one half instead of being
 * blended, so every pixel is exactly background, track or pore gray, which
 * keeps porosity thresholds stable.
 *
 * BORDER CORRECTION
 * =================
 * Rendering backends may leave a one pixel black frame around the canvas. A
 * black pixel never occurs in a scene (the darkest color is pore gray), so
 * every pure black pixel is replaced by its diagonal inner neighbour before
 * the image is measured.
 */

use agg_rust::color::Gray8;
use agg_rust::conv_curve::ConvCurve;
use agg_rust::conv_stroke::ConvStroke;
use agg_rust::gamma::{GammaFunction, GammaThreshold};
use agg_rust::math_stroke::LineJoin;
use agg_rust::path_storage::PathStorage;
use agg_rust::pixfmt_gray::PixfmtGray8;
use agg_rust::rasterizer_scanline_aa::{RasterizerScanlineAa, Scanline};
use agg_rust::renderer_base::RendererBase;
use agg_rust::rendering_buffer::RowAccessor;
use agg_rust::scanline_u::ScanlineU8;
use image::{GrayImage, Luma};

use crate::shape::{Blob, PORE_GRAY};

/// Canvas color before anything is drawn
pub const BACKGROUND_GRAY: u8 = PORE_GRAY;
/// Pen width of the outline stroke in pixels
pub const OUTLINE_WIDTH: f64 = 2.0;
/// Value of spurious border pixels
pub const BORDER_SENTINEL: u8 = 0;

type GrayRenderer<'a> = RendererBase<PixfmtGray8<'a>>;

/// A grayscale drawing surface that shapes are layered onto
#[derive(Debug, Clone)]
pub struct Canvas {
    image: GrayImage,
}

impl Canvas {
    /// Create a canvas filled with the background color
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([BACKGROUND_GRAY])),
        }
    }

    /// Canvas width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Canvas height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Paint shapes on top of everything drawn so far
    pub fn draw(&mut self, shapes: &[Blob]) {
        self.with_renderer(|renderer, painter| {
            for shape in shapes {
                let mut path = shape.path();
                let gray = shape.kind().gray();
                painter.fill(renderer, &mut path, gray);
                painter.stroke(renderer, &mut path, OUTLINE_WIDTH, gray);
            }
        });
    }

    /// Fill and stroke a single blob in its kind's color
    pub fn draw_blob(&mut self, blob: &Blob) {
        self.draw(std::slice::from_ref(blob));
    }

    /// Fill an arbitrary path (nonzero winding) without outline
    pub fn fill_path(&mut self, path: &mut PathStorage, gray: u8) {
        self.with_renderer(|renderer, painter| painter.fill(renderer, path, gray));
    }

    /// Stroke an arbitrary path with round joins
    pub fn stroke_path(&mut self, path: &mut PathStorage, width: f64, gray: u8) {
        self.with_renderer(|renderer, painter| painter.stroke(renderer, path, width, gray));
    }

    /// Border-corrected copy of the current canvas
    pub fn render(&self) -> GrayImage {
        let mut image = self.image.clone();
        correct_border(&mut image);
        image
    }

    /// Border-corrected canvas, consuming it
    pub fn into_image(self) -> GrayImage {
        let mut image = self.image;
        correct_border(&mut image);
        image
    }

    fn with_renderer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut GrayRenderer<'_>, &mut Painter),
    {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let mut rows = RowAccessor::new();
        // SAFETY: the image buffer holds width * height bytes with a stride of
        // `width`, and it is only accessed through `rows` until they are
        // dropped at the end of this call.
        unsafe { rows.attach(self.image.as_mut_ptr(), width, height, width as i32) };

        let mut renderer = RendererBase::new(PixfmtGray8::new(&mut rows));
        let mut painter = Painter::new(width, height);
        f(&mut renderer, &mut painter);
    }
}

/// Render shapes in order onto a fresh canvas
pub fn rasterize(shapes: &[Blob], width: u32, height: u32) -> GrayImage {
    let mut canvas = Canvas::new(width, height);
    canvas.draw(shapes);
    canvas.into_image()
}

/// Rasterizer state reused across the shapes of one draw call
struct Painter {
    rasterizer: RasterizerScanlineAa,
    scanline: ScanlineU8,
    threshold: GammaThreshold,
    covers: Vec<u8>,
}

impl Painter {
    fn new(width: u32, height: u32) -> Self {
        let mut rasterizer = RasterizerScanlineAa::new();
        rasterizer.clip_box(0.0, 0.0, width as f64, height as f64);
        Self {
            rasterizer,
            scanline: ScanlineU8::new(),
            threshold: GammaThreshold::default(),
            covers: Vec::new(),
        }
    }

    fn fill(&mut self, renderer: &mut GrayRenderer<'_>, path: &mut PathStorage, gray: u8) {
        let mut curve = ConvCurve::new(path);
        self.rasterizer.reset();
        self.rasterizer.add_path(&mut curve, 0);
        self.sweep(renderer, gray);
    }

    fn stroke(
        &mut self,
        renderer: &mut GrayRenderer<'_>,
        path: &mut PathStorage,
        width: f64,
        gray: u8,
    ) {
        let mut stroke = ConvStroke::new(ConvCurve::new(path));
        stroke.set_width(width);
        stroke.set_line_join(LineJoin::Round);
        self.rasterizer.reset();
        self.rasterizer.add_path(&mut stroke, 0);
        self.sweep(renderer, gray);
    }

    /// Paint every pixel covered at least halfway, leave the rest untouched
    fn sweep(&mut self, renderer: &mut GrayRenderer<'_>, gray: u8) {
        let Self {
            rasterizer,
            scanline,
            threshold,
            covers,
        } = self;

        if !rasterizer.rewind_scanlines() {
            return;
        }

        let color = Gray8::new(gray as u32, 255);
        scanline.reset(rasterizer.min_x(), rasterizer.max_x());
        while rasterizer.sweep_scanline(scanline) {
            let y = scanline.y();
            let all_covers = scanline.covers();
            for span in scanline.begin() {
                if span.len <= 0 {
                    continue;
                }
                let start = span.cover_offset;
                let end = start + span.len as usize;
                covers.clear();
                covers.extend(all_covers[start..end].iter().map(|&c| {
                    if threshold.call(c as f64 / 255.0) >= 0.5 {
                        255
                    } else {
                        0
                    }
                }));
                renderer.blend_solid_hspan(span.x, y, span.len, &color, &covers[..]);
            }
        }
    }
}

/**
 * Replace border sentinel pixels by their diagonal inner neighbour
 *
 * Pixels are visited row by row. A sentinel pixel takes the value one row
 * down and one column right, or the second to last row / column when it sits
 * on the far edge. A neighbour that is itself a sentinel may only be fixed
 * later in the pass, so passes repeat until nothing changes. Afterwards a
 * further call is a no-op.
 */
pub fn correct_border(image: &mut GrayImage) {
    let (cols, rows) = (image.width() as usize, image.height() as usize);
    if cols < 2 || rows < 2 {
        return;
    }

    let pixels: &mut [u8] = &mut *image;
    let source = |idx: usize| {
        let (row, col) = (idx / cols, idx % cols);
        let src_row = if row == rows - 1 { rows - 2 } else { row + 1 };
        let src_col = if col == cols - 1 { cols - 2 } else { col + 1 };
        src_row * cols + src_col
    };

    let mut pending: Vec<usize> = pixels
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p == BORDER_SENTINEL)
        .map(|(idx, _)| idx)
        .collect();

    loop {
        let before = pending.len();
        pending.retain(|&idx| {
            let value = pixels[source(idx)];
            if value == BORDER_SENTINEL {
                return true;
            }
            pixels[idx] = value;
            false
        });
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }
}
