/**
 * Porosity-Matched Image Generator
 *
 * Synthesizes images of foam-filled printed tracks whose porosity matches a
 * user's targets. There is no closed form linking the generation parameters
 * to the resulting porosity, so the generator searches for it:
 *
 * FEEDBACK LOOP
 * =============
 *
 *   generate scene -> draw tracks -> measure -> draw pores -> measure
 *        ^                                                      |
 *        |                                                      v
 *   adapt parameters <------------- no ------------- within margins?
 *                                                               | yes
 *                                                               v
 *                                                      save and return
 *
 * 1. A fresh scene of tracks and foam pores is generated
 * 2. Tracks alone are rasterized and measured (porosity by tracks)
 * 3. Pores are layered on top and the image is measured again (total)
 * 4. The foam pore porosity is the difference of both measurements
 * 5. If both total and foam pore porosity are within their margins the image
 *    is accepted, otherwise the parameters are nudged and the loop repeats
 *
 * Every iteration draws a completely new scene, so convergence is a matter of
 * probability and not monotonic. The loop has no built-in iteration limit;
 * set `GenerationOptions::max_iterations` to bound it.
 */

use image::GrayImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::config::{ConfigError, Parameters, UserConfig};
use crate::output::{self, OutputError, SavedFiles};
use crate::porosity::{measure_with_report, porosity_in_margin, Porosities};
use crate::raster::Canvas;
use crate::scene;

/// Options of a generation run
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Optional random seed for reproducible results
    pub seed: Option<u64>,
    /// Give up after this many iterations (unbounded when `None`)
    pub max_iterations: Option<usize>,
    /// Save the accepted image and its config into the output folder
    pub save: bool,
    /// Show progress and measurement details
    pub verbose: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            seed: None,
            max_iterations: None,
            save: true,
            verbose: false,
        }
    }
}

/// Result of an accepted generation run
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The accepted image, tracks and pores
    pub image: GrayImage,
    /// Porosities measured on the accepted image
    pub porosities: Porosities,
    /// Number of images generated, the accepted one included
    pub iterations: usize,
    /// Where the result was saved, if saving was requested
    pub saved: Option<SavedFiles>,
}

/// Error types for image generation
#[derive(Error, Debug)]
pub enum GenerationError {
    /// User config or parameters are invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Saving the accepted result failed
    #[error(transparent)]
    Output(#[from] OutputError),

    /// No image matched within the allowed number of iterations
    #[error("No image within the porosity margins after {iterations} iterations (last: {last})")]
    IterationLimit {
        /// Iterations run
        iterations: usize,
        /// Porosities of the last rejected image
        last: Porosities,
    },
}

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Measurements of a single iteration
struct Attempt {
    image: GrayImage,
    porosities: Porosities,
}

/**
 * Runs the generate-measure-adapt loop for one user config
 */
pub struct PorosityGenerator {
    user_config: UserConfig,
    options: GenerationOptions,
    rng: StdRng,
    progress: Option<ProgressBar>,
}

impl PorosityGenerator {
    /// Create a new generator for the given user config
    pub fn new(user_config: UserConfig, options: GenerationOptions) -> Result<Self> {
        user_config.validate()?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let progress = if options.verbose {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] {spinner:.cyan} iteration {pos} {msg}")
            {
                pb.set_style(style);
            }
            Some(pb)
        } else {
            None
        };

        Ok(Self {
            user_config,
            options,
            rng,
            progress,
        })
    }

    /// The user config this generator works towards
    pub fn user_config(&self) -> &UserConfig {
        &self.user_config
    }

    /**
     * Generate images until one matches the desired porosities
     *
     * `parameters` is adapted in place after every rejected image and holds
     * the parameters of the accepted image on return.
     */
    pub fn generate(&mut self, parameters: &mut Parameters) -> Result<GenerationResult> {
        parameters.validate()?;

        let desired = self.user_config.desired_porosities;
        let mut iterations = 0;

        loop {
            iterations += 1;
            let attempt = self.attempt(parameters)?;
            let actual = attempt.porosities;

            let total_ok =
                porosity_in_margin(desired.total, actual.total, parameters.total_porosity_margin);
            let foam_ok = porosity_in_margin(
                desired.by_foam_pores,
                actual.by_foam_pores,
                parameters.porosity_foam_pore_margin,
            );

            if total_ok && foam_ok {
                return self.accept(attempt, parameters, iterations);
            }

            if let Some(pb) = &self.progress {
                pb.set_position(iterations as u64);
                pb.set_message(format!(
                    "total: is {:.2}, should {:.2}, foam pores: is {:.2}, should {:.2}",
                    actual.total, desired.total, actual.by_foam_pores, desired.by_foam_pores
                ));
            }

            if self.options.max_iterations.is_some_and(|max| iterations >= max) {
                if let Some(pb) = &self.progress {
                    pb.abandon_with_message("no matching image");
                }
                return Err(GenerationError::IterationLimit {
                    iterations,
                    last: actual,
                });
            }

            parameters.adapt(&desired, &actual);
        }
    }

    /// Render and measure one fresh scene
    fn attempt(&mut self, parameters: &Parameters) -> Result<Attempt> {
        let scene = scene::generate(parameters, &self.user_config, &mut self.rng)?;
        let rule = parameters.porosity_rule;

        let mut canvas = Canvas::new(parameters.image_width, parameters.image_height);
        canvas.draw(&scene.tracks);
        let by_tracks = measure_with_report(canvas.render().as_raw(), rule);

        canvas.draw(&scene.pores);
        let image = canvas.into_image();
        let total = measure_with_report(image.as_raw(), rule);

        if let Some(pb) = &self.progress {
            pb.println(format!("tracks: {}", by_tracks));
            pb.println(format!("total:  {}", total));
        }

        Ok(Attempt {
            image,
            porosities: Porosities::measured(by_tracks.porosity, total.porosity),
        })
    }

    fn accept(
        &mut self,
        attempt: Attempt,
        parameters: &Parameters,
        iterations: usize,
    ) -> Result<GenerationResult> {
        let desired = self.user_config.desired_porosities;
        let porosities = attempt.porosities;

        if let Some(pb) = &self.progress {
            pb.set_position(iterations as u64);
            pb.finish_with_message(format!(
                "accepted: total {:.2} (should {:.2}), foam pores {:.2} (should {:.2})",
                porosities.total, desired.total, porosities.by_foam_pores, desired.by_foam_pores
            ));
        }

        let saved = if self.options.save {
            let files = output::save_result(
                &mut self.rng,
                &attempt.image,
                &self.user_config,
                parameters,
                &porosities,
            )?;
            if self.options.verbose {
                println!(
                    "Saved {} and {}",
                    files.image.display(),
                    files.config.display()
                );
            }
            Some(files)
        } else {
            None
        };

        Ok(GenerationResult {
            image: attempt.image,
            porosities,
            iterations,
            saved,
        })
    }
}

/// Spread of the porosities reached by repeated runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationReport {
    /// Porosities the runs aimed for
    pub desired: Porosities,
    /// Number of runs
    pub runs: usize,
    /// Mean total porosity
    pub total_mean: f64,
    /// Population variance of the total porosity
    pub total_variance: f64,
    /// Mean foam pore porosity
    pub foam_mean: f64,
    /// Population variance of the foam pore porosity
    pub foam_variance: f64,
}

/**
 * Generate `runs` images without saving and report how much they scatter
 *
 * Useful to pick margins for a config: the same parameters (threaded through
 * all runs, so they keep adapting) rarely reproduce identical porosities.
 */
pub fn porosity_deviation(
    user_config: &UserConfig,
    parameters: &mut Parameters,
    runs: usize,
    options: GenerationOptions,
) -> Result<DeviationReport> {
    let options = GenerationOptions {
        save: false,
        ..options
    };
    let mut generator = PorosityGenerator::new(user_config.clone(), options)?;

    let mut totals = Vec::with_capacity(runs);
    let mut foams = Vec::with_capacity(runs);
    for _ in 0..runs {
        let result = generator.generate(parameters)?;
        totals.push(result.porosities.total);
        foams.push(result.porosities.by_foam_pores);
    }

    let (total_mean, total_variance) = mean_and_variance(&totals);
    let (foam_mean, foam_variance) = mean_and_variance(&foams);

    Ok(DeviationReport {
        desired: user_config.desired_porosities,
        runs,
        total_mean,
        total_variance,
        foam_mean,
        foam_variance,
    })
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seed: u64) -> GenerationOptions {
        GenerationOptions {
            seed: Some(seed),
            max_iterations: Some(500),
            save: false,
            verbose: false,
        }
    }

    fn user_config(total: f64, foam: f64) -> UserConfig {
        UserConfig::new(40, 1.25, Porosities::new(total, foam), "output").unwrap()
    }

    fn small_parameters() -> Parameters {
        Parameters {
            image_width: 400,
            image_height: 320,
            ..Default::default()
        }
    }

    #[test]
    fn test_converges_without_foam() {
        let config = user_config(50.0, 0.0);
        let mut parameters = Parameters::default();
        let mut generator = PorosityGenerator::new(config, options(42)).unwrap();

        let result = generator.generate(&mut parameters).unwrap();
        let p = result.porosities;

        assert!((49.0..=51.0).contains(&p.total), "total {}", p.total);
        assert_eq!(p.by_tracks, Some(p.total));
        assert_eq!(p.by_foam_pores, 0.0);
        assert_eq!(result.image.dimensions(), (1360, 1024));
        assert!(result.saved.is_none());
    }

    #[test]
    fn test_converges_with_foam() {
        let config = user_config(45.0, 8.0);
        let mut parameters = Parameters::adapted_to(&config);
        parameters.image_width = 600;
        parameters.image_height = 480;
        parameters.total_porosity_margin = 4.0;
        parameters.porosity_foam_pore_margin = 4.0;

        let mut generator = PorosityGenerator::new(config, options(7)).unwrap();
        let result = generator.generate(&mut parameters).unwrap();
        let p = result.porosities;

        assert!((41.0..=49.0).contains(&p.total), "total {}", p.total);
        assert!((4.0..=12.0).contains(&p.by_foam_pores), "foam {}", p.by_foam_pores);
        assert_eq!(p.by_foam_pores, p.total - p.by_tracks.unwrap());
    }

    #[test]
    fn test_iteration_limit() {
        // margins of zero are practically unreachable
        let config = user_config(50.0, 10.0);
        let mut parameters = Parameters {
            total_porosity_margin: 0.0,
            porosity_foam_pore_margin: 0.0,
            ..small_parameters()
        };
        let opts = GenerationOptions {
            max_iterations: Some(3),
            ..options(1)
        };

        let mut generator = PorosityGenerator::new(config, opts).unwrap();
        let err = generator.generate(&mut parameters).unwrap_err();
        match err {
            GenerationError::IterationLimit { iterations, last } => {
                assert_eq!(iterations, 3);
                assert_eq!(last.by_foam_pores, last.total - last.by_tracks.unwrap());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parameters_are_adapted_in_place() {
        // huge margin on total, impossible foam target: every iteration adapts
        let config = user_config(50.0, 95.0);
        let mut parameters = Parameters {
            total_porosity_margin: 100.0,
            ..small_parameters()
        };
        let before = parameters.clone();
        let opts = GenerationOptions {
            max_iterations: Some(2),
            ..options(3)
        };

        let mut generator = PorosityGenerator::new(config, opts).unwrap();
        assert!(generator.generate(&mut parameters).is_err());
        assert_ne!(parameters, before);
        assert_eq!(
            parameters.foam_pores_center_scaling_factor,
            (parameters.track_mean_width / 3.0).round()
        );
    }

    #[test]
    fn test_wide_margins_accept_first_image() {
        let config = user_config(50.0, 10.0);
        let mut parameters = Parameters {
            total_porosity_margin: 100.0,
            porosity_foam_pore_margin: 100.0,
            ..small_parameters()
        };
        let before = parameters.clone();

        let mut generator = PorosityGenerator::new(config, options(5)).unwrap();
        let result = generator.generate(&mut parameters).unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(parameters, before);
    }

    #[test]
    fn test_saves_accepted_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig::new(
            40,
            1.25,
            Porosities::new(50.0, 10.0),
            dir.path().join("out").to_string_lossy(),
        )
        .unwrap();
        let mut parameters = Parameters {
            total_porosity_margin: 100.0,
            porosity_foam_pore_margin: 100.0,
            ..small_parameters()
        };
        let opts = GenerationOptions {
            save: true,
            ..options(9)
        };

        let mut generator = PorosityGenerator::new(config, opts).unwrap();
        let result = generator.generate(&mut parameters).unwrap();
        let saved = result.saved.expect("result should be saved");
        assert!(saved.image.is_file());
        assert!(saved.config.is_file());
    }

    #[test]
    fn test_invalid_parameters_fail_before_rendering() {
        let config = user_config(50.0, 10.0);
        let mut parameters = Parameters {
            image_width: 0,
            ..Default::default()
        };

        let mut generator = PorosityGenerator::new(config, options(1)).unwrap();
        let err = generator.generate(&mut parameters).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Config(ConfigError::InvalidDimensions { width: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_user_config_is_rejected() {
        let mut config = user_config(50.0, 10.0);
        config.layer_height = -1;
        assert!(PorosityGenerator::new(config, options(1)).is_err());
    }

    #[test]
    fn test_deviation_report() {
        let config = user_config(50.0, 10.0);
        let mut parameters = Parameters {
            total_porosity_margin: 100.0,
            porosity_foam_pore_margin: 100.0,
            ..small_parameters()
        };

        let report = porosity_deviation(&config, &mut parameters, 3, options(11)).unwrap();
        assert_eq!(report.runs, 3);
        assert_eq!(report.desired, config.desired_porosities);
        assert!(report.total_mean > 0.0 && report.total_mean < 100.0);
        assert!(report.total_variance >= 0.0);
        assert!(report.foam_variance >= 0.0);
    }

    #[test]
    fn test_mean_and_variance() {
        assert_eq!(mean_and_variance(&[]), (0.0, 0.0));
        assert_eq!(mean_and_variance(&[2.0, 4.0, 6.0]), (4.0, 8.0 / 3.0));
    }
}
