/**
 * Irregular Blob Shapes
 *
 * Every track and every foam pore in a synthesized image is a "blob": a closed
 * cubic Bezier curve that wobbles around an ellipse. The construction follows
 * the classic random-contour trick:
 *
 * 1. Sample N angles evenly over a full turn (both ends included)
 * 2. Push each sample off the unit circle by a random radius in [1-r, 1+r)
 * 3. Close the loop by copying the first point over the last one
 * 4. Read the points as a cubic Bezier path: one start point, then triples of
 *    (control, control, end), so only every third point lies on the curve.
 *    Points left over after the last full triple are joined with lines
 * 5. Stretch each axis so its span equals the requested width / height
 * 6. Move the shape to its center
 *
 * Closing by repeating the first point (instead of adding a closing segment)
 * keeps the outline free of a straight edge where the loop meets.
 */

use agg_rust::basics::PointD;
use agg_rust::path_storage::PathStorage;
use rand::Rng;
use std::f64::consts::TAU;

/// Default perturbation magnitude around the unit circle
pub const DEFAULT_ROUGHNESS: f64 = 0.2;
/// Default number of potentially sharp edges
pub const DEFAULT_SHARP_EDGES: usize = 2;
/// Default number of points sampled per sharp edge
pub const DEFAULT_COARSE_POINTS: usize = 7;
/// Default number of additional sampled points
pub const DEFAULT_FINE_POINTS: usize = 5;

/// Gray value used to paint tracks (light gray)
pub const TRACK_GRAY: u8 = 211;
/// Gray value used to paint foam pores and the background (30% gray)
pub const PORE_GRAY: u8 = 77;

/// What a blob represents in the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Solid printed material, drawn light
    Track,
    /// Void inside a track, drawn dark
    Pore,
}

impl ShapeKind {
    /// Gray value the shape is painted with
    pub fn gray(self) -> u8 {
        match self {
            ShapeKind::Track => TRACK_GRAY,
            ShapeKind::Pore => PORE_GRAY,
        }
    }
}

/// Axis selector for rescaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal axis
    X,
    /// Vertical axis
    Y,
}

/// Construction options for a blob
#[derive(Debug, Clone, Copy)]
pub struct BlobOptions {
    /// Perturbation magnitude, should be in [0, 1)
    pub roughness: f64,
    /// Number of potentially sharp edges
    pub sharp_edges: usize,
    /// Points sampled per sharp edge
    pub coarse_points: usize,
    /// Additional sampled points
    pub fine_points: usize,
}

impl Default for BlobOptions {
    fn default() -> Self {
        Self {
            roughness: DEFAULT_ROUGHNESS,
            sharp_edges: DEFAULT_SHARP_EDGES,
            coarse_points: DEFAULT_COARSE_POINTS,
            fine_points: DEFAULT_FINE_POINTS,
        }
    }
}

/// An irregular closed shape, immutable once built
#[derive(Debug, Clone)]
pub struct Blob {
    center: PointD,
    width: f64,
    height: f64,
    roughness: f64,
    kind: ShapeKind,
    vertices: Vec<PointD>,
}

impl Blob {
    /// Create a blob with default roughness and point counts
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        center: PointD,
        width: f64,
        height: f64,
        kind: ShapeKind,
    ) -> Self {
        Self::with_options(rng, center, width, height, kind, BlobOptions::default())
    }

    /// Create a blob with explicit construction options
    pub fn with_options<R: Rng + ?Sized>(
        rng: &mut R,
        center: PointD,
        width: f64,
        height: f64,
        kind: ShapeKind,
        options: BlobOptions,
    ) -> Self {
        let mut vertices = perturbed_circle(rng, &options);

        scale_to_length(&mut vertices, Axis::X, width);
        scale_to_length(&mut vertices, Axis::Y, height);

        for v in vertices.iter_mut() {
            v.x += center.x;
            v.y += center.y;
        }

        Self {
            center,
            width,
            height,
            roughness: options.roughness,
            kind,
            vertices,
        }
    }

    /// Center the blob was built around
    pub fn center(&self) -> PointD {
        self.center
    }

    /// Requested width
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Requested height
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Perturbation magnitude used during construction
    pub fn roughness(&self) -> f64 {
        self.roughness
    }

    /// Track or pore
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// All control points, first and last are identical
    pub fn vertices(&self) -> &[PointD] {
        &self.vertices
    }

    /// First point of the outline
    pub fn start(&self) -> PointD {
        self.vertices[0]
    }

    /// Closed outline as a vector path, ready for rasterization
    pub fn path(&self) -> PathStorage {
        let mut path = PathStorage::new();
        let start = self.start();
        path.move_to(start.x, start.y);

        let mut chunks = self.vertices[1..].chunks_exact(3);
        for c in chunks.by_ref() {
            path.curve4(c[0].x, c[0].y, c[1].x, c[1].y, c[2].x, c[2].y);
        }
        for p in chunks.remainder() {
            path.line_to(p.x, p.y);
        }

        path.close_polygon(0);
        path
    }

    /// Axis-aligned bounds as (min, max)
    pub fn bounds(&self) -> (PointD, PointD) {
        let mut min = PointD::new(f64::INFINITY, f64::INFINITY);
        let mut max = PointD::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        (min, max)
    }
}

/// Sample the closed, randomly perturbed unit circle
fn perturbed_circle<R: Rng + ?Sized>(rng: &mut R, options: &BlobOptions) -> Vec<PointD> {
    let n = options.sharp_edges * options.coarse_points + options.fine_points;
    let n = n.max(2);
    let r = options.roughness;

    let mut vertices: Vec<PointD> = (0..n)
        .map(|i| {
            let angle = TAU * i as f64 / (n - 1) as f64;
            let radius = 2.0 * r * rng.random::<f64>() + 1.0 - r;
            PointD::new(angle.cos() * radius, angle.sin() * radius)
        })
        .collect();

    vertices[n - 1] = vertices[0];
    vertices
}

/**
 * Stretch one axis so that max - min equals `length`
 *
 * Coordinates keep their sign relative to the origin, each one becomes
 * `length * |v| / (max + |min|)`. The points surround the origin, so the
 * span after scaling is exactly `length`.
 */
pub fn scale_to_length(vertices: &mut [PointD], axis: Axis, length: f64) {
    let coord = |p: &PointD| match axis {
        Axis::X => p.x,
        Axis::Y => p.y,
    };

    let max = vertices.iter().map(coord).fold(f64::NEG_INFINITY, f64::max);
    let min = vertices.iter().map(coord).fold(f64::INFINITY, f64::min);
    let actual_length = max + min.abs();
    if actual_length <= 0.0 || !actual_length.is_finite() {
        return;
    }

    for v in vertices.iter_mut() {
        let value = match axis {
            Axis::X => &mut v.x,
            Axis::Y => &mut v.y,
        };
        let scaled = length * value.abs() / actual_length;
        *value = if *value < 0.0 { -scaled } else { scaled };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agg_rust::basics::{PATH_CMD_CURVE4, PATH_CMD_LINE_TO, PATH_CMD_MOVE_TO};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn span(blob: &Blob) -> (f64, f64) {
        let (min, max) = blob.bounds();
        (max.x - min.x, max.y - min.y)
    }

    #[test]
    fn test_rescale_matches_requested_size() {
        let mut rng = StdRng::seed_from_u64(7);

        for &(w, h) in &[(50.0, 40.0), (5.0, 9.0), (120.0, 3.0), (1.0, 1.0)] {
            let blob = Blob::new(&mut rng, PointD::new(100.0, 80.0), w, h, ShapeKind::Track);
            let (sw, sh) = span(&blob);
            assert!((sw - w).abs() < 1e-9, "width {} != {}", sw, w);
            assert!((sh - h).abs() < 1e-9, "height {} != {}", sh, h);
        }
    }

    #[test]
    fn test_loop_is_closed() {
        let mut rng = StdRng::seed_from_u64(42);
        let blob = Blob::new(&mut rng, PointD::new(0.0, 0.0), 30.0, 20.0, ShapeKind::Pore);

        let vertices = blob.vertices();
        assert_eq!(vertices.first(), vertices.last());
        assert_eq!(vertices.len(), 19);
    }

    #[test]
    fn test_default_outline_is_all_cubics() {
        let mut rng = StdRng::seed_from_u64(1);
        let blob = Blob::new(&mut rng, PointD::new(0.0, 0.0), 10.0, 10.0, ShapeKind::Track);
        let path = blob.path();

        // move_to, 6 cubics of 3 vertices each, close
        assert_eq!(path.total_vertices(), 1 + 6 * 3 + 1);
        assert_eq!(path.command(0), PATH_CMD_MOVE_TO);
        assert!((1..19).all(|i| path.command(i) == PATH_CMD_CURVE4));

        // the last cubic ends on the start point
        let (mut x, mut y) = (0.0, 0.0);
        path.vertex_idx(18, &mut x, &mut y);
        assert_eq!(PointD::new(x, y), blob.start());
    }

    #[test]
    fn test_leftover_points_become_lines() {
        let mut rng = StdRng::seed_from_u64(3);
        let options = BlobOptions {
            sharp_edges: 1,
            coarse_points: 3,
            fine_points: 2,
            ..Default::default()
        };
        let blob = Blob::with_options(
            &mut rng,
            PointD::new(0.0, 0.0),
            10.0,
            10.0,
            ShapeKind::Track,
            options,
        );

        // 5 points: start + one cubic + one line
        let path = blob.path();
        assert_eq!(path.total_vertices(), 1 + 3 + 1 + 1);
        assert_eq!(path.command(3), PATH_CMD_CURVE4);
        assert_eq!(path.command(4), PATH_CMD_LINE_TO);
    }

    #[test]
    fn test_centered_on_requested_point() {
        let mut rng = StdRng::seed_from_u64(11);
        let blob = Blob::new(&mut rng, PointD::new(300.0, -40.0), 60.0, 30.0, ShapeKind::Track);
        let (min, max) = blob.bounds();

        // the origin lies inside the sampled circle, so the center lies inside the bounds
        assert!(min.x < 300.0 && 300.0 < max.x);
        assert!(min.y < -40.0 && -40.0 < max.y);
        assert_eq!(blob.center(), PointD::new(300.0, -40.0));
    }

    #[test]
    fn test_zero_roughness_is_an_ellipse() {
        let mut rng = StdRng::seed_from_u64(5);
        let options = BlobOptions {
            roughness: 0.0,
            ..Default::default()
        };
        let blob = Blob::with_options(
            &mut rng,
            PointD::new(0.0, 0.0),
            20.0,
            20.0,
            ShapeKind::Track,
            options,
        );

        // first sample sits at angle 0 on the unit circle
        assert_eq!(blob.start(), PointD::new(10.0, 0.0));
        for v in blob.vertices() {
            assert!(v.x.abs() <= 10.0 + 1e-9);
            assert!(v.y.abs() <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn test_scale_degenerate_span_is_noop() {
        let mut points = vec![PointD::new(0.0, 1.0), PointD::new(0.0, -1.0)];
        scale_to_length(&mut points, Axis::X, 10.0);
        assert!(points.iter().all(|p| p.x == 0.0));

        scale_to_length(&mut points, Axis::Y, 10.0);
        assert_eq!(points[0].y, 5.0);
        assert_eq!(points[1].y, -5.0);
    }

    #[test]
    fn test_kind_colors() {
        assert_eq!(ShapeKind::Track.gray(), TRACK_GRAY);
        assert_eq!(ShapeKind::Pore.gray(), PORE_GRAY);
        assert!(TRACK_GRAY > PORE_GRAY);
    }
}
