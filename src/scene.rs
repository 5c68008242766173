/**
 * Scene Generation
 *
 * Lays out one image worth of blobs. The extrusion grid is spanned by the
 * layer width (columns) and layer height (rows). Every grid point gets one
 * light track, jittered around the grid point, and a random cluster of dark
 * foam pores around the same grid point.
 *
 * Nothing here is drawn: the result is two shape lists that the rasterizer
 * consumes. A new scene is a completely new shape population, so two scenes
 * from the same parameters differ and only agree statistically.
 */

use agg_rust::basics::PointD;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::{ConfigError, Parameters, Result, UserConfig};
use crate::shape::{Blob, ShapeKind};

/// Normal samples are clipped to this many standard deviations
const CLIP_SIGMA: f64 = 3.0;

/// Shapes of one image, in drawing order
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Light tracks, drawn first
    pub tracks: Vec<Blob>,
    /// Dark foam pores, drawn on top of the tracks
    pub pores: Vec<Blob>,
}

/**
 * Generate track and foam pore shapes for the current parameters
 *
 * Fails when the grid pitch (layer height or the derived layer width) is not
 * positive. Foam pores are skipped entirely when the user wants no foam
 * porosity.
 */
pub fn generate<R: Rng + ?Sized>(
    parameters: &Parameters,
    user_config: &UserConfig,
    rng: &mut R,
) -> Result<Scene> {
    let layer_width = user_config.layer_width();
    if layer_width <= 0 {
        return Err(ConfigError::InvalidLayerWidth(layer_width));
    }
    if user_config.layer_height <= 0 {
        return Err(ConfigError::InvalidLayerHeight(user_config.layer_height));
    }

    let with_pores = user_config.desired_porosities.by_foam_pores != 0.0;
    let mut scene = Scene::default();

    for x in (0..parameters.image_width).step_by(layer_width as usize) {
        for y in (0..parameters.image_height).step_by(user_config.layer_height as usize) {
            let grid_x = (parameters.x_offset as i64 + x as i64) as f64;
            let grid_y = (parameters.y_offset as i64 + y as i64) as f64;

            scene.tracks.push(track(parameters, rng, grid_x, grid_y));

            if with_pores {
                let count = pore_count(parameters, rng);
                scene
                    .pores
                    .extend((0..count).map(|_| pore(parameters, rng, grid_x, grid_y)));
            }
        }
    }

    Ok(scene)
}

fn track<R: Rng + ?Sized>(parameters: &Parameters, rng: &mut R, grid_x: f64, grid_y: f64) -> Blob {
    let width = uniform_size(
        rng,
        parameters.track_mean_width,
        parameters.track_width_variation,
    );
    let height = uniform_size(
        rng,
        parameters.track_mean_height,
        parameters.track_height_variation,
    );

    let center = PointD::new(
        grid_x + normal(rng) * parameters.randomized_track_x_factor,
        grid_y + normal(rng) * parameters.randomized_track_y_factor,
    );

    Blob::new(rng, center, width, height, ShapeKind::Track)
}

fn pore<R: Rng + ?Sized>(parameters: &Parameters, rng: &mut R, grid_x: f64, grid_y: f64) -> Blob {
    let mean = parameters.mean_diameter_of_foam_pores as f64;
    let deviation = (mean * parameters.foam_pore_variation_of_diameter).round();
    let (low, high) = (mean - deviation, mean + deviation);

    let width = draw_clipped_normal_int(rng, low, high);
    let height = draw_clipped_normal_int(rng, low, high);

    let spread = parameters.foam_pores_center_scaling_factor;
    let center = PointD::new(
        grid_x + normal(rng) * spread,
        grid_y + normal(rng) * spread,
    );

    Blob::new(rng, center, width, height, ShapeKind::Pore)
}

/// Number of foam pores for one track, never negative
fn pore_count<R: Rng + ?Sized>(parameters: &Parameters, rng: &mut R) -> usize {
    let low = parameters.mean_foam_pores_per_track - parameters.variation_of_foam_pores_per_track;
    let high = parameters.mean_foam_pores_per_track + parameters.variation_of_foam_pores_per_track;
    let count = if low < high {
        rng.random_range(low..high)
    } else {
        low
    };
    count.max(0) as usize
}

/// Integer size drawn uniformly from [floor(m - m*v), ceil(m + m*v))
fn uniform_size<R: Rng + ?Sized>(rng: &mut R, mean: f64, variation: f64) -> f64 {
    let spread = mean * variation;
    let low = (mean - spread).floor() as i64;
    let high = (mean + spread).ceil() as i64;
    if low < high {
        rng.random_range(low..high) as f64
    } else {
        low as f64
    }
}

fn normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.sample(StandardNormal)
}

/**
 * Roughly normally distributed integer in [low, high]
 *
 * A standard normal sample is clipped to ±3 sigma, where the bell curve is
 * nearly zero, then mapped linearly onto the range and rounded.
 */
pub fn draw_clipped_normal_int<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    let sample = normal(rng).clamp(-CLIP_SIGMA, CLIP_SIGMA);
    let scale = (high - low) / (2.0 * CLIP_SIGMA);
    (sample * scale + low + (high - low) / 2.0).round()
}
