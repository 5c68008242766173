/**
 * Foam Porosity CLI - generate porosity-matched images of foam-filled tracks
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use foam_porosity::output::{create_dir, print_warning};
use foam_porosity::{
    porosity_deviation, GenerationOptions, Parameters, Porosities, PorosityGenerator, UserConfig,
};

/// Synthetic porosity images for training and validating measurements
#[derive(Parser)]
#[command(name = "foam-porosity")]
#[command(version = "0.1.0")]
#[command(about = "Generate images of foam-filled tracks with a given porosity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image for the given grid and porosities
    Generate {
        /// Layer height in pixels
        #[arg(short, long, default_value = "40")]
        layer_height: i32,

        /// Ratio of layer width to layer height
        #[arg(short, long, default_value = "1.25")]
        ratio: f64,

        /// Desired total porosity in percent
        #[arg(short, long, default_value = "50")]
        total_poro: f64,

        /// Desired porosity by foam pores in percent
        #[arg(short, long, default_value = "40")]
        foam_poro: f64,

        /// Output folder
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Give up after this many images
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Show measurements of every image
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate a new image from a saved config document
    FromConfig {
        /// Config document (.json)
        #[arg(short, long)]
        file: PathBuf,

        /// Output folder
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Added to both porosity margins of the saved parameters
        #[arg(long, default_value = "2.0")]
        margin_increase: f64,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Give up after this many images
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Show measurements of every image
        #[arg(short, long)]
        verbose: bool,
    },

    /// Measure how much repeated runs of a config document scatter
    Deviation {
        /// Config document (.json)
        #[arg(short, long)]
        file: PathBuf,

        /// Number of images to generate
        #[arg(short = 'n', long, default_value = "10")]
        runs: usize,

        /// Porosity margin used for both total and foam pore porosity
        #[arg(short, long, default_value = "3.0")]
        margin: f64,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    if let Err(err) = run() {
        print_warning(&format!("Error: {:#}", err));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            layer_height,
            ratio,
            total_poro,
            foam_poro,
            output,
            seed,
            max_iterations,
            verbose,
        } => {
            if foam_poro > total_poro {
                anyhow::bail!(
                    "Foam pore porosity ({}) cannot exceed total porosity ({})",
                    foam_poro,
                    total_poro
                );
            }

            let user_config = UserConfig::new(
                layer_height,
                ratio,
                Porosities::new(total_poro, foam_poro),
                output.to_string_lossy(),
            )
            .context("Invalid user config")?;
            let mut parameters = Parameters::adapted_to(&user_config);

            let estimate = parameters.estimate_porosities(&user_config);
            println!("Estimated porosities for the default parameters:");
            println!("  by tracks:     {:.2}", estimate.by_tracks);
            println!("  by foam pores: {:.2}", estimate.by_foam_pores);
            println!("  total:         {:.2}", estimate.total);
            println!();

            let options = GenerationOptions {
                seed,
                max_iterations,
                save: true,
                verbose,
            };
            generate(user_config, &mut parameters, options)?;
        }

        Commands::FromConfig {
            file,
            output,
            margin_increase,
            seed,
            max_iterations,
            verbose,
        } => {
            let user_config = load_user_config(&file, &output)?;
            let mut parameters = Parameters::load_from_file(&file)
                .with_context(|| format!("Failed to load parameters from {}", file.display()))?;
            parameters.total_porosity_margin += margin_increase;
            parameters.porosity_foam_pore_margin += margin_increase;

            let options = GenerationOptions {
                seed,
                max_iterations,
                save: true,
                verbose,
            };
            generate(user_config, &mut parameters, options)?;
        }

        Commands::Deviation {
            file,
            runs,
            margin,
            seed,
        } => {
            let user_config = UserConfig::load_from_file(&file, None)
                .with_context(|| format!("Failed to load user config from {}", file.display()))?;
            let mut parameters = Parameters::load_from_file(&file)
                .with_context(|| format!("Failed to load parameters from {}", file.display()))?;
            parameters.total_porosity_margin = margin;
            parameters.porosity_foam_pore_margin = margin;

            println!("Generating {} images for {}", runs, file.display());
            println!();

            let options = GenerationOptions {
                seed,
                ..Default::default()
            };
            let report = porosity_deviation(&user_config, &mut parameters, runs, options)
                .context("Failed to generate images")?;

            println!("Desired: {}", report.desired);
            println!(
                "Total porosity:     mean {:.2}, variance {:.4}",
                report.total_mean, report.total_variance
            );
            println!(
                "Foam pore porosity: mean {:.2}, variance {:.4}",
                report.foam_mean, report.foam_variance
            );
        }
    }

    Ok(())
}

fn load_user_config(file: &Path, output: &Path) -> Result<UserConfig> {
    create_dir(output)
        .with_context(|| format!("Failed to create output folder {}", output.display()))?;
    UserConfig::load_from_file(file, Some(output))
        .with_context(|| format!("Failed to load user config from {}", file.display()))
}

fn generate(
    user_config: UserConfig,
    parameters: &mut Parameters,
    options: GenerationOptions,
) -> Result<()> {
    let verbose = options.verbose;
    if verbose {
        println!("{}", user_config);
        println!();
        println!("{}", parameters);
        println!();
    }

    let mut generator =
        PorosityGenerator::new(user_config, options).context("Failed to create generator")?;
    let result = generator
        .generate(parameters)
        .context("Failed to generate image")?;

    println!();
    println!("{}", result.porosities);
    println!("Accepted after {} images", result.iterations);
    if let Some(saved) = result.saved {
        println!("Image saved to: {}", saved.image.display());
        println!("Config saved to: {}", saved.config.display());
    }
    println!();
    println!("Done!");

    Ok(())
}
