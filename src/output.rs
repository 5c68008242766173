/**
 * Saving Results
 *
 * An accepted image is written as a PNG next to a JSON config document that
 * reproduces it. Both names share a random three digit tag so that runs into
 * the same folder don't overwrite each other:
 *
 *   img042_50_12.png   (tag, rounded total and foam pore porosity)
 *   config_042.json
 */

use console::style;
use image::GrayImage;
use rand::Rng;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{ConfigDocument, Parameters, UserConfig};
use crate::porosity::Porosities;

/// Error types for saving results
#[derive(Error, Debug)]
pub enum OutputError {
    /// Creating the folder or a file failed
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the PNG failed
    #[error("Failed to save image: {0}")]
    ImageSaveError(#[from] image::ImageError),

    /// Serializing the config document failed
    #[error("Failed to save config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for output operations
pub type Result<T> = std::result::Result<T, OutputError>;

/// Paths of one saved result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    /// The PNG image
    pub image: PathBuf,
    /// The JSON config document
    pub config: PathBuf,
}

/// Print a message in red to stderr
pub fn print_warning(message: &str) {
    eprintln!("{}", style(message).red());
}

/// Create a directory (and parents) unless it exists, returns whether it was created
pub fn create_dir<P: AsRef<Path>>(directory: P) -> std::io::Result<bool> {
    let directory = directory.as_ref();
    if directory.exists() {
        return Ok(false);
    }
    fs::create_dir_all(directory)?;
    Ok(true)
}

/// Image and config file names for a tag and the measured porosities
pub fn result_file_names(tag: u32, porosities: &Porosities) -> (String, String) {
    let image = format!(
        "img{:03}_{}_{}.png",
        tag,
        porosities.total.round() as i64,
        porosities.by_foam_pores.round() as i64
    );
    let config = format!("config_{:03}.json", tag);
    (image, config)
}

/**
 * Write the image and its config document into the user's output folder
 *
 * The folder is created if needed. The config document carries the user
 * config, the final parameters and the measured porosities.
 */
pub fn save_result<R: Rng + ?Sized>(
    rng: &mut R,
    image: &GrayImage,
    user_config: &UserConfig,
    parameters: &Parameters,
    porosities: &Porosities,
) -> Result<SavedFiles> {
    let folder = Path::new(&user_config.output_folder);
    create_dir(folder)?;

    let tag = rng.random_range(1..=100);
    let (image_name, config_name) = result_file_names(tag, porosities);
    let image_path = folder.join(image_name);
    let config_path = folder.join(config_name);

    image.save(&image_path)?;

    let document = ConfigDocument {
        user_config: user_config.clone(),
        parameters: parameters.clone(),
        porosity_results: Some(*porosities),
    };
    let writer = BufWriter::new(File::create(&config_path)?);
    serde_json::to_writer_pretty(writer, &document)?;

    Ok(SavedFiles {
        image: image_path,
        config: config_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_file_names_use_rounded_porosities() {
        let porosities = Porosities::measured(38.2, 50.6);
        let (image, config) = result_file_names(7, &porosities);
        assert_eq!(image, "img007_51_12.png");
        assert_eq!(config, "config_007.json");

        let (image, _) = result_file_names(100, &Porosities::measured(20.0, 20.4));
        assert_eq!(image, "img100_20_0.png");
    }

    #[test]
    fn test_create_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        assert!(create_dir(&nested).unwrap());
        assert!(nested.is_dir());
        assert!(!create_dir(&nested).unwrap());
    }

    #[test]
    fn test_save_result() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("results");
        let user_config = UserConfig::new(
            40,
            1.25,
            Porosities::new(50.0, 10.0),
            folder.to_string_lossy(),
        )
        .unwrap();
        let parameters = Parameters::default();
        let porosities = Porosities::measured(39.6, 50.4);
        let image = GrayImage::from_pixel(16, 8, Luma([211]));

        let mut rng = StdRng::seed_from_u64(1);
        let saved = save_result(&mut rng, &image, &user_config, &parameters, &porosities).unwrap();

        assert!(saved.image.is_file());
        assert!(saved.config.is_file());
        assert!(saved.image.starts_with(&folder));
        let name = saved.image.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("img") && name.ends_with("_50_11.png"));

        let reloaded = image::open(&saved.image).unwrap().to_luma8();
        assert_eq!(reloaded, image);

        let document = ConfigDocument::load(&saved.config).unwrap();
        assert_eq!(document.user_config, user_config);
        assert_eq!(document.parameters, parameters);
        assert_eq!(document.porosity_results, Some(porosities));

        let text = fs::read_to_string(&saved.config).unwrap();
        assert!(text.contains("\"porosity_rule\": \"mean\""));
    }
}
