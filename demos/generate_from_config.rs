/**
 * Example: Regenerate an image from a saved config document
 *
 * Every accepted image is saved next to a JSON document holding its user
 * config, parameters and measured porosities. Loading that document and
 * widening the margins produces a new image with nearly the same porosities
 * without adapting the parameters much.
 *
 * Run with:
 *   cargo run --release --example generate_from_config -- demo-output/config_042.json
 *
 * Without an argument a quick image is generated first and its document is
 * used.
 */

use foam_porosity::output::create_dir;
use foam_porosity::{GenerationOptions, Parameters, PorosityGenerator, Porosities, UserConfig};
use std::path::{Path, PathBuf};

const OUTPUT_DIRECTORY: &str = "demo-output";

/// Generate a small image with loose margins and return its config document
fn first_config() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let user_config = UserConfig::new(40, 1.25, Porosities::new(45.0, 8.0), OUTPUT_DIRECTORY)?;
    let mut parameters = Parameters {
        image_width: 400,
        image_height: 320,
        total_porosity_margin: 5.0,
        porosity_foam_pore_margin: 5.0,
        ..Parameters::adapted_to(&user_config)
    };

    let options = GenerationOptions {
        seed: Some(7),
        ..Default::default()
    };
    let result = PorosityGenerator::new(user_config, options)?.generate(&mut parameters)?;
    let saved = result.saved.ok_or("result was not saved")?;
    Ok(saved.config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => first_config()?,
    };
    println!("Loading {}\n", file.display());

    // The output folder must exist before the user config is loaded
    let output = Path::new(OUTPUT_DIRECTORY);
    create_dir(output)?;

    let user_config = UserConfig::load_from_file(&file, Some(output))?;
    let mut parameters = Parameters::load_from_file(&file)?;

    // Randomness makes the same parameters land on slightly different
    // porosities, wider margins accept the result without much adaption
    parameters.total_porosity_margin += 2.0;
    parameters.porosity_foam_pore_margin += 2.0;

    println!("{}\n", user_config);

    let mut generator = PorosityGenerator::new(user_config, GenerationOptions::default())?;
    let result = generator.generate(&mut parameters)?;

    println!("{}", result.porosities);
    println!("Images generated: {}", result.iterations);
    if let Some(saved) = result.saved {
        println!("Image saved to {}", saved.image.display());
    }

    Ok(())
}
