//! Foam Porosity Library
//!
//! Synthesizes grayscale images of foam-filled extrusion tracks, as seen in
//! cross sections of printed foam parts, whose porosity matches a target.
//! The images serve as labelled training and validation data for porosity
//! measurement.
//!
//! # Features
//!
//! - Randomized smooth blobs (closed cubic Bézier loops) for tracks and pores
//! - Rasterization into an 8-bit grayscale canvas through Anti-Grain Geometry
//!   (`agg-rust`), with hard edges instead of blended coverage
//! - Threshold based porosity measurement (mean or median rule)
//! - Feedback loop adapting the generation parameters until the measured
//!   total and foam pore porosities are within their margins
//! - JSON config documents that reproduce a result
//! - Reproducible results with seeded random number generation
//!
//! # Quick Start
//!
//! ```no_run
//! use foam_porosity::{GenerationOptions, Parameters, PorosityGenerator, Porosities, UserConfig};
//!
//! let user_config = UserConfig::new(40, 1.25, Porosities::new(50.0, 10.0), "output/").unwrap();
//! let mut parameters = Parameters::adapted_to(&user_config);
//!
//! let options = GenerationOptions {
//!     seed: Some(42),
//!     ..Default::default()
//! };
//! let mut generator = PorosityGenerator::new(user_config, options).unwrap();
//! let result = generator.generate(&mut parameters).unwrap();
//! println!("{}", result.porosities);
//! ```
//!
//! # Measurement
//!
//! Tracks are light (gray 211) on a dark background (gray 77), foam pores are
//! drawn dark on top of the tracks. Porosity is the share of pixels below a
//! threshold derived from the image itself, so the tracks alone give the
//! porosity by tracks and the full image the total porosity. Their difference
//! is the porosity caused by foam pores.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// User config, generation parameters and their JSON documents
pub mod config;
/// Generate-measure-adapt loop
pub mod generator;
/// Saving images and config documents
pub mod output;
/// Porosity measurement
pub mod porosity;
/// Rasterization of blobs
pub mod raster;
/// Track and foam pore layout
pub mod scene;
/// Randomized Bézier blobs
pub mod shape;

// Re-export main types for convenience
pub use config::{ConfigDocument, ConfigError, Parameters, PorosityEstimate, UserConfig};
pub use generator::{
    porosity_deviation, DeviationReport, GenerationError, GenerationOptions, GenerationResult,
    PorosityGenerator,
};
pub use output::{print_warning, save_result, OutputError, SavedFiles};
pub use porosity::{measure, porosity_in_margin, Porosities, PorosityRule};
pub use raster::{rasterize, Canvas};
pub use scene::Scene;
pub use shape::{Blob, ShapeKind};
