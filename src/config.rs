/**
 * User Intent and Generation Parameters
 *
 * `UserConfig` holds what the user asked for: the extrusion grid (layer height
 * and width ratio), the target porosities and where to put the results. It is
 * validated once and never changes.
 *
 * `Parameters` holds the knobs of the image synthesis. They start from
 * defaults, from a rough estimate based on the user config, or from a saved
 * config file, and are then nudged by the feedback loop after every image that
 * misses the targets.
 *
 * Both are stored together in a JSON config document:
 *
 * ```json
 * {
 *   "user_config": { "layer_height": 40, ... },
 *   "parameters": { "image_width": 1360, ..., "porosity_rule": "mean" },
 *   "porosity_results": { "total": 50.3, "by_foam_pores": 0.0, "by_tracks": 50.3 }
 * }
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use thiserror::Error;

use crate::porosity::{Porosities, PorosityRule};

/// Error types for configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Layer height is zero or negative
    #[error("Layer height must be positive, got {0}")]
    InvalidLayerHeight(i32),

    /// Derived layer width is zero or negative
    #[error("Layer width must be positive, got {0} (check layer_width_to_layer_height_ratio)")]
    InvalidLayerWidth(i64),

    /// A desired porosity lies outside 0..100
    #[error("Desired porosity `{name}` must be between 0 and 100, got {value}")]
    InvalidPorosity {
        /// Field name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Image width or height is zero
    #[error("Image width and height must be positive, got {width}x{height}")]
    InvalidDimensions {
        /// Image width in pixels
        width: u32,
        /// Image height in pixels
        height: u32,
    },

    /// Config path is missing or not a .json file
    #[error("The given file name {} is not a valid json file", .0.display())]
    NotAJsonFile(PathBuf),

    /// Output override is not a directory
    #[error("The given directory name {} is not a valid directory", .0.display())]
    NotADirectory(PathBuf),

    /// Reading the config file failed
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The config document is malformed or misses a field
    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        /// Config file
        path: PathBuf,
        /// Underlying error, names the missing field or unknown value
        source: serde_json::Error,
    },
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Immutable user intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Distance between track centers on the y-axis, in pixels
    pub layer_height: i32,
    /// Layer width divided by layer height, spans the extrusion grid together with the height
    pub layer_width_to_layer_height_ratio: f64,
    /// Target porosities
    pub desired_porosities: Porosities,
    /// Directory where generated images are saved
    pub output_folder: String,
}

impl UserConfig {
    /// Create and validate a user config
    pub fn new(
        layer_height: i32,
        layer_width_to_layer_height_ratio: f64,
        desired_porosities: Porosities,
        output_folder: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            layer_height,
            layer_width_to_layer_height_ratio,
            desired_porosities,
            output_folder: output_folder.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Grid column pitch in pixels
    pub fn layer_width(&self) -> i64 {
        (self.layer_height as f64 * self.layer_width_to_layer_height_ratio).round() as i64
    }

    /// Check the grid pitches and the porosity targets
    pub fn validate(&self) -> Result<()> {
        if self.layer_height <= 0 {
            return Err(ConfigError::InvalidLayerHeight(self.layer_height));
        }
        let layer_width = self.layer_width();
        if layer_width <= 0 {
            return Err(ConfigError::InvalidLayerWidth(layer_width));
        }
        let targets = [
            ("total", self.desired_porosities.total),
            ("by_foam_pores", self.desired_porosities.by_foam_pores),
        ];
        for (name, value) in targets {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidPorosity { name, value });
            }
        }
        Ok(())
    }

    /**
     * Load the `user_config` section of a config document
     *
     * `output_directory`, when given, must be an existing directory and
     * replaces the folder stored in the file. A path separator is always
     * appended to the resulting folder.
     */
    pub fn load_from_file<P: AsRef<Path>>(
        filename: P,
        output_directory: Option<&Path>,
    ) -> Result<Self> {
        let filename = filename.as_ref();
        let is_json = filename.extension().is_some_and(|ext| ext == "json");
        if !filename.is_file() || !is_json {
            return Err(ConfigError::NotAJsonFile(filename.to_path_buf()));
        }

        if let Some(dir) = output_directory {
            if !dir.is_dir() {
                return Err(ConfigError::NotADirectory(dir.to_path_buf()));
            }
        }

        #[derive(Deserialize)]
        struct Section {
            user_config: UserConfig,
        }

        let mut user_config = read_document::<Section>(filename)?.user_config;
        if let Some(dir) = output_directory {
            user_config.output_folder = dir.to_string_lossy().into_owned();
        }
        user_config.output_folder.push(MAIN_SEPARATOR);
        user_config.validate()?;

        Ok(user_config)
    }
}

impl fmt::Display for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "UserConfig:")?;
        writeln!(f, "layer_height: {}", self.layer_height)?;
        writeln!(
            f,
            "layer_width_to_layer_height_ratio: {}",
            self.layer_width_to_layer_height_ratio
        )?;
        writeln!(f, "desired_porosities: {}", self.desired_porosities)?;
        write!(f, "output_folder: {}", self.output_folder)
    }
}

/// Porosities predicted from the grid geometry alone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PorosityEstimate {
    /// Expected porosity of the tracks alone
    pub by_tracks: f64,
    /// Expected porosity of the foam pores
    pub by_foam_pores: f64,
    /// Expected overall porosity
    pub total: f64,
}

/// Mutable knobs of the image synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Image width in pixels
    pub image_width: u32,
    /// Image height in pixels
    pub image_height: u32,

    /// Allowed deviation of the total porosity, in percent points
    pub total_porosity_margin: f64,
    /// Allowed deviation of the foam pore porosity, in percent points
    pub porosity_foam_pore_margin: f64,
    /// Foam pore deviation above which the pore count is adapted instead of the pore size
    pub foam_pore_amount_adaption_threshold: f64,

    /// Threshold rule used to measure porosity
    #[serde(alias = "porosity_function")]
    pub porosity_rule: PorosityRule,

    /// Moves all track centers away from the left border, in pixels
    pub x_offset: i32,
    /// Moves all track centers away from the top border, in pixels
    pub y_offset: i32,

    /// Mean track width in pixels
    pub track_mean_width: f64,
    /// Relative track width variation (0..1)
    pub track_width_variation: f64,
    /// Mean track height in pixels
    pub track_mean_height: f64,
    /// Relative track height variation (0..1)
    pub track_height_variation: f64,

    /// Horizontal jitter of track centers around the grid points
    pub randomized_track_x_factor: f64,
    /// Vertical jitter of track centers around the grid points
    pub randomized_track_y_factor: f64,

    /// Jitter of foam pore centers around the grid points
    pub foam_pores_center_scaling_factor: f64,
    /// Mean foam pore diameter in pixels
    pub mean_diameter_of_foam_pores: i32,
    /// Mean number of foam pores per track
    pub mean_foam_pores_per_track: i32,
    /// Spread of the number of foam pores per track
    pub variation_of_foam_pores_per_track: i32,
    /// Relative foam pore diameter variation in each direction
    #[serde(default = "legacy_diameter_variation")]
    pub foam_pore_variation_of_diameter: f64,
}

/// Files written before the diameter variation existed used the full range
fn legacy_diameter_variation() -> f64 {
    1.0
}

impl Default for Parameters {
    fn default() -> Self {
        let track_mean_width = 50.0;
        Self {
            image_width: 1360,
            image_height: 1024,
            total_porosity_margin: 1.0,
            porosity_foam_pore_margin: 2.0,
            foam_pore_amount_adaption_threshold: 3.0,
            porosity_rule: PorosityRule::Mean,
            x_offset: 25,
            y_offset: 10,
            track_mean_width,
            track_width_variation: 0.2,
            track_mean_height: 40.0,
            track_height_variation: 0.08,
            randomized_track_x_factor: 5.0,
            randomized_track_y_factor: 4.0,
            foam_pores_center_scaling_factor: track_mean_width / 3.0,
            mean_diameter_of_foam_pores: 5,
            mean_foam_pores_per_track: 8,
            variation_of_foam_pores_per_track: 4,
            foam_pore_variation_of_diameter: 0.8,
        }
    }
}

impl Parameters {
    /// Total-porosity gap above which tracks take big steps (foam pores settled)
    const LARGE_STEP_GAP: f64 = 7.0;
    /// Same, while the foam pores are still off target
    const LARGE_STEP_GAP_FOAM_UNSETTLED: f64 = 10.0;
    /// Shrinking pores by size only while there are fewer pores than this
    const MAX_PORES_FOR_RESIZE: i32 = 10;

    /// Reject image sizes that cannot be rendered
    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.image_width,
                height: self.image_height,
            });
        }
        Ok(())
    }

    /// Load the `parameters` section of a config document
    pub fn load_from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        #[derive(Deserialize)]
        struct Section {
            parameters: Parameters,
        }

        let params = read_document::<Section>(filename.as_ref())?.parameters;
        params.validate()?;
        Ok(params)
    }

    /**
     * Rough porosity prediction for the default parameters on the user's grid
     *
     * Tracks are assumed to cover 60% of their grid cell (ellipse shape and
     * narrower widths), foam pores 70% of their bounding square, and 30% of
     * the pore area is assumed to be lost to overlaps.
     */
    pub fn estimate_porosities(&self, user_config: &UserConfig) -> PorosityEstimate {
        let layer_width =
            user_config.layer_height as f64 * user_config.layer_width_to_layer_height_ratio;
        let layer_height = user_config.layer_height as f64;
        let image_area = self.image_width as f64 * self.image_height as f64;

        let columns = self.image_width as f64 / layer_width;
        let rows = self.image_height as f64 / layer_height;
        let cells = columns * rows;

        let track_area = layer_width * layer_height * 0.6;
        let by_tracks = 100.0 - (100.0 / image_area) * cells * track_area;

        let diameter = self.mean_diameter_of_foam_pores as f64;
        let pore_area = diameter * diameter * 0.7;
        let all_pores = cells * pore_area * self.mean_foam_pores_per_track as f64;
        let by_foam_pores = (100.0 / image_area) * all_pores * 0.7;

        PorosityEstimate {
            by_tracks,
            by_foam_pores,
            total: by_foam_pores + by_tracks * 0.9,
        }
    }

    /**
     * Default parameters tuned towards the user's targets
     *
     * Compares the estimated porosities against the desired ones and picks
     * starting values for pore size, pore count and track size, so that the
     * feedback loop starts close to the target.
     */
    pub fn adapted_to(user_config: &UserConfig) -> Self {
        let mut params = Self::default();
        let estimate = params.estimate_porosities(user_config);
        let desired = user_config.desired_porosities;

        let layer_width =
            user_config.layer_height as f64 * user_config.layer_width_to_layer_height_ratio;
        let layer_height = user_config.layer_height as f64;

        let (width_factor, height_factor) = if estimate.by_foam_pores < desired.by_foam_pores {
            params.mean_diameter_of_foam_pores += 2;
            if desired.by_foam_pores - estimate.by_foam_pores > 5.0 {
                params.mean_foam_pores_per_track += 1;
                params.mean_diameter_of_foam_pores += 2;
            }
            // more foam porosity wanted: big tracks leave room for the pores
            if estimate.total > desired.total {
                (0.99, 0.96)
            } else {
                (0.8, 0.8)
            }
        } else {
            params.mean_diameter_of_foam_pores -= 2;
            if estimate.by_foam_pores - desired.by_foam_pores > 5.0 {
                params.mean_foam_pores_per_track -= 1;
            }
            if estimate.total > desired.total {
                (0.85, 0.9)
            } else {
                (0.8, 0.8)
            }
        };

        params.track_mean_width = (layer_width * width_factor).round();
        params.track_mean_height = (layer_height * height_factor).round();
        params
    }

    /**
     * Nudge the parameters towards the desired porosities
     *
     * Track size is corrected first: tracks grow when the image is too porous
     * and shrink otherwise, in big steps when the gap is large. While the foam
     * pores are still off target the big steps kick in later.
     *
     * Foam pores are then corrected by size when close to the target and by
     * count when far off. A desired foam porosity of zero disables pores.
     */
    pub fn adapt(&mut self, desired: &Porosities, actual: &Porosities) {
        let foam_settled = desired.by_foam_pores - self.porosity_foam_pore_margin
            < actual.by_foam_pores
            && actual.by_foam_pores < desired.by_foam_pores + self.porosity_foam_pore_margin;
        let large_step_gap = if foam_settled {
            Self::LARGE_STEP_GAP
        } else {
            Self::LARGE_STEP_GAP_FOAM_UNSETTLED
        };

        let (width_step, height_step) = if (actual.total - desired.total).abs() > large_step_gap {
            (3.0, 2.0)
        } else {
            (1.0, 0.5)
        };
        if actual.total > desired.total {
            self.track_mean_width += width_step;
            self.track_mean_height += height_step;
        } else {
            self.track_mean_width -= width_step;
            self.track_mean_height -= height_step;
        }

        let foam_difference = actual.by_foam_pores - desired.by_foam_pores;
        if foam_difference.abs() > self.porosity_foam_pore_margin {
            if foam_difference > 0.0 {
                // too porous: fewer or smaller pores
                if foam_difference < self.foam_pore_amount_adaption_threshold
                    && self.mean_foam_pores_per_track < Self::MAX_PORES_FOR_RESIZE
                {
                    self.mean_diameter_of_foam_pores = (self.mean_diameter_of_foam_pores - 1).max(1);
                } else {
                    self.mean_foam_pores_per_track -= 1;
                    if self.mean_foam_pores_per_track <= 0 {
                        self.mean_foam_pores_per_track = 1;
                        self.variation_of_foam_pores_per_track =
                            (self.variation_of_foam_pores_per_track - 1).max(0);
                    }
                }
            } else if foam_difference.abs() < self.foam_pore_amount_adaption_threshold {
                self.mean_diameter_of_foam_pores += 1;
            } else {
                self.mean_foam_pores_per_track += 1;
            }
        }

        if desired.by_foam_pores == 0.0 {
            self.mean_foam_pores_per_track = 0;
        }

        self.foam_pores_center_scaling_factor = (self.track_mean_width / 3.0).round();
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameters:")?;
        writeln!(f, "image_width: {}", self.image_width)?;
        writeln!(f, "image_height: {}", self.image_height)?;
        writeln!(f, "total_porosity_margin: {}", self.total_porosity_margin)?;
        writeln!(f, "porosity_foam_pore_margin: {}", self.porosity_foam_pore_margin)?;
        writeln!(
            f,
            "foam_pore_amount_adaption_threshold: {}",
            self.foam_pore_amount_adaption_threshold
        )?;
        writeln!(f, "porosity_rule: {}", self.porosity_rule)?;
        writeln!(f, "x_offset: {}", self.x_offset)?;
        writeln!(f, "y_offset: {}", self.y_offset)?;
        writeln!(f, "track_mean_width: {}", self.track_mean_width)?;
        writeln!(f, "track_width_variation: {}", self.track_width_variation)?;
        writeln!(f, "track_mean_height: {}", self.track_mean_height)?;
        writeln!(f, "track_height_variation: {}", self.track_height_variation)?;
        writeln!(f, "randomized_track_x_factor: {}", self.randomized_track_x_factor)?;
        writeln!(f, "randomized_track_y_factor: {}", self.randomized_track_y_factor)?;
        writeln!(
            f,
            "foam_pores_center_scaling_factor: {}",
            self.foam_pores_center_scaling_factor
        )?;
        writeln!(f, "mean_diameter_of_foam_pores: {}", self.mean_diameter_of_foam_pores)?;
        writeln!(f, "mean_foam_pores_per_track: {}", self.mean_foam_pores_per_track)?;
        writeln!(
            f,
            "variation_of_foam_pores_per_track: {}",
            self.variation_of_foam_pores_per_track
        )?;
        write!(
            f,
            "foam_pore_variation_of_diameter: {}",
            self.foam_pore_variation_of_diameter
        )
    }
}

/// Everything needed to reproduce an image, plus what it measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// The user's intent
    pub user_config: UserConfig,
    /// Parameters the image was generated with
    pub parameters: Parameters,
    /// Porosities measured on the saved image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub porosity_results: Option<Porosities>,
}

impl ConfigDocument {
    /// Load a full config document
    pub fn load<P: AsRef<Path>>(filename: P) -> Result<Self> {
        read_document(filename.as_ref())
    }
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
