/**
 * Example: Generate an image from scratch
 *
 * This example builds a user config in code, lets the library pick starting
 * parameters for it, and runs the feedback loop until the measured porosities
 * match. The image and a config document reproducing it are saved to
 * `demo-output/`.
 *
 * Run with:
 *   cargo run --release --example generate_from_scratch
 */

use foam_porosity::{GenerationOptions, Parameters, PorosityGenerator, Porosities, UserConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Generating a porosity image from scratch...\n");

    // Track grid and desired porosities, fixed for the whole run
    let user_config = UserConfig::new(
        40,   // layer height in pixels
        1.25, // layer width / layer height
        Porosities::new(50.0, 10.0),
        "demo-output/",
    )?;

    // Starting parameters estimated for this grid, adapted during the run
    let mut parameters = Parameters::adapted_to(&user_config);
    // Parameters can be tweaked before generating
    parameters.total_porosity_margin = 1.5;

    let estimate = parameters.estimate_porosities(&user_config);
    println!(
        "Estimate: tracks {:.2}, foam pores {:.2}, total {:.2}\n",
        estimate.by_tracks, estimate.by_foam_pores, estimate.total
    );

    let options = GenerationOptions {
        seed: Some(42), // Use a seed for reproducibility
        verbose: true,
        ..Default::default()
    };
    let mut generator = PorosityGenerator::new(user_config, options)?;
    let result = generator.generate(&mut parameters)?;

    println!("\n{}", result.porosities);
    println!("Images generated: {}", result.iterations);
    if let Some(saved) = result.saved {
        println!("Image saved to {}", saved.image.display());
        println!("Config saved to {}", saved.config.display());
    }

    Ok(())
}
