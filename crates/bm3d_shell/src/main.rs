//! `bm3d-shell` CLI - generate degraded test images, inspect raw frames and
//! run the BM3D denoiser.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bm3d_shell::degrade::{self, ChannelMask};
use bm3d_shell::experiment::{self, ExperimentReport};
use bm3d_shell::frames::{self, DEFAULT_FRAME_PREFIX};
use bm3d_shell::raw::{self, RawLayout};
use bm3d_shell::{codec, metrics, params, Bm3dParams, ColorSpace, Image};

/// Noise synthesis, raw frame tools and BM3D denoising for 8-bit images.
#[derive(Parser, Debug)]
#[command(name = "bm3d-shell")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the image as a raw base frame plus the 7 channel-cleared variants.
    GenMasks {
        /// RGB input image.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory receiving the raw frames.
        #[arg(long, default_value = ".", value_name = "DIR")]
        out_dir: PathBuf,

        /// Name stem of the frames (`frame_<stem>_...`).
        #[arg(long, default_value = "cat")]
        stem: String,
    },

    /// Add Gaussian noise to an image.
    AddNoise {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Noise standard deviation on the [0, 255] scale.
        #[arg(short, long, default_value = "40", value_name = "FLOAT")]
        sigma: f64,

        /// Random seed for reproducibility.
        #[arg(long, value_name = "INT")]
        seed: Option<u64>,
    },

    /// Print sample type, shape and the first planar values of an image.
    Inspect {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// List raw frames and convert one to PNG. Missing values are prompted for.
    Show {
        /// Directory searched for frames.
        #[arg(long, default_value = ".", value_name = "DIR")]
        dir: PathBuf,

        /// File-name prefix of frames.
        #[arg(long, default_value = DEFAULT_FRAME_PREFIX)]
        prefix: String,

        /// Index in the printed listing.
        #[arg(long)]
        index: Option<usize>,

        #[arg(long)]
        height: Option<usize>,

        #[arg(long)]
        width: Option<usize>,

        #[arg(long)]
        channels: Option<usize>,

        /// PNG to write. Defaults to `<frame>.png`.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Denoise an image with BM3D.
    Denoise {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Noise standard deviation on the [0, 255] scale. Estimated when omitted.
        #[arg(short, long, value_name = "FLOAT")]
        sigma: Option<f64>,

        /// Colour space: RGB, opp or YCbCr.
        #[arg(long, value_name = "NAME")]
        color_space: Option<ColorSpace>,

        /// JSON file overlaying the default parameters.
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Clean image to report PSNR against.
        #[arg(long, value_name = "FILE")]
        reference: Option<PathBuf>,
    },

    /// Add noise to a clean image, denoise it and report PSNR before and after.
    Run {
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        #[arg(short, long, default_value = "10", value_name = "FLOAT")]
        sigma: f64,

        #[arg(long, value_name = "INT")]
        seed: Option<u64>,

        #[arg(long, value_name = "NAME")]
        color_space: Option<ColorSpace>,

        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Where to save the noisy image.
        #[arg(long, value_name = "FILE")]
        noisy_out: Option<PathBuf>,

        /// Where to save the denoised image.
        #[arg(long, value_name = "FILE")]
        denoised_out: Option<PathBuf>,
    },

    /// PSNR of TEST against REFERENCE.
    Psnr {
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        #[arg(value_name = "TEST")]
        test: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bm3d_shell={log_level},bm3d_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;
    match cli.command {
        Command::GenMasks {
            input,
            out_dir,
            stem,
        } => gen_masks(&input, &out_dir, &stem),
        Command::AddNoise {
            input,
            output,
            sigma,
            seed,
        } => add_noise(&input, &output, sigma, seed),
        Command::Inspect { input } => inspect(&input),
        Command::Show {
            dir,
            prefix,
            index,
            height,
            width,
            channels,
            output,
        } => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut out = io::stdout();
            show(
                &dir,
                &prefix,
                ShowArgs {
                    index,
                    height,
                    width,
                    channels,
                    output,
                },
                &mut input,
                &mut out,
            )
        }
        Command::Denoise {
            input,
            output,
            sigma,
            color_space,
            params,
            reference,
        } => {
            let params = resolve_params(params.as_deref(), color_space, verbose)?;
            denoise(&input, &output, sigma, &params, reference.as_deref())
        }
        Command::Run {
            reference,
            sigma,
            seed,
            color_space,
            params,
            noisy_out,
            denoised_out,
        } => {
            // Without a params file the harness denoises channels independently.
            let color_space =
                color_space.or_else(|| params.is_none().then_some(ColorSpace::Rgb));
            let params = resolve_params(params.as_deref(), color_space, verbose)?;
            let report = run_harness(&reference, sigma, seed, &params)?;
            if let Some(path) = noisy_out {
                codec::save_image(&path, &report.noisy)
                    .with_context(|| format!("failed to save {}", path.display()))?;
            }
            if let Some(path) = denoised_out {
                codec::save_image(&path, &report.denoised)
                    .with_context(|| format!("failed to save {}", path.display()))?;
            }
            println!("{report}");
            Ok(())
        }
        Command::Psnr { reference, test } => {
            let reference = codec::load_image(&reference)?;
            let test = codec::load_image(&test)?;
            println!("{:.4}", metrics::psnr(&reference, &test)?);
            Ok(())
        }
    }
}

fn resolve_params(
    file: Option<&Path>,
    color_space: Option<ColorSpace>,
    verbose: bool,
) -> Result<Bm3dParams> {
    let mut params = match file {
        Some(path) => params::load_params(path)?,
        None => Bm3dParams::default(),
    };
    if let Some(cs) = color_space {
        params.color_space = cs;
    }
    if verbose {
        params.verbose = true;
    }
    Ok(params)
}

fn gen_masks(input: &Path, out_dir: &Path, stem: &str) -> Result<()> {
    let image = codec::load_image(input)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let base = out_dir.join(raw::base_frame_name(stem));
    raw::write_raw(&base, &image)?;
    println!("{}", base.display());

    for (mask, variant) in degrade::generate_channel_variants(&image)? {
        let path = out_dir.join(raw::variant_frame_name(stem, mask));
        raw::write_raw(&path, &variant)?;
        println!("{}", path.display());
    }

    let (h, w, c) = image.shape();
    tracing::info!(
        frames = ChannelMask::degraded_variants().count() + 1,
        "wrote raw frames of layout {h}x{w}x{c}"
    );
    Ok(())
}

fn add_noise(input: &Path, output: &Path, sigma: f64, seed: Option<u64>) -> Result<()> {
    let image = codec::load_image(input)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = degrade::sample_noise(image.shape(), sigma, &mut rng)?;

    let (img_min, img_max) = image
        .view()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (noise_min, noise_max) = noise
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    println!("img_max  : {img_max} |min: {img_min}");
    println!("noise_max: {noise_max} |min: {noise_min}");

    let noisy = degrade::apply_noise(&image, &noise)?;
    codec::save_image(output, &noisy)?;
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let image = codec::load_image(input)?;
    println!("uint8");
    println!("{:?}", image.shape());
    let head: Vec<f32> = image.planar_f32().into_iter().take(10).collect();
    println!("{head:?}");
    Ok(())
}

struct ShowArgs {
    index: Option<usize>,
    height: Option<usize>,
    width: Option<usize>,
    channels: Option<usize>,
    output: Option<PathBuf>,
}

fn show<R: BufRead, W: Write>(
    dir: &Path,
    prefix: &str,
    args: ShowArgs,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let frames = frames::list_frames(dir, prefix)?;
    if frames.is_empty() {
        anyhow::bail!("no files starting with {prefix:?} in {}", dir.display());
    }
    writeln!(out, "List of files: ")?;
    write!(out, "{}", frames::format_listing(&frames))?;

    let index = or_prompt(args.index, "Please enter file to show: ", input, out)?;
    let frame = frames
        .get(index)
        .with_context(|| format!("index {index} out of range 0..{}", frames.len()))?;
    let height = or_prompt(args.height, "Please enter img height : ", input, out)?;
    let width = or_prompt(args.width, "Please enter img width : ", input, out)?;
    let channels = or_prompt(args.channels, "Please enter img channels : ", input, out)?;

    writeln!(out, "You are showing: {}", frame.display())?;
    let output = args
        .output
        .unwrap_or_else(|| frame.with_extension("png"));
    frames::show_frame(frame, RawLayout::new(height, width, channels), &output)?;
    writeln!(out, "Saved {}", output.display())?;
    Ok(())
}

fn or_prompt<T, R, W>(value: Option<T>, message: &str, input: &mut R, out: &mut W) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    R: BufRead,
    W: Write,
{
    match value {
        Some(v) => Ok(v),
        None => prompt(message, input, out),
    }
}

fn prompt<T, R, W>(message: &str, input: &mut R, out: &mut W) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    R: BufRead,
    W: Write,
{
    write!(out, "{message}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        anyhow::bail!("no input for {:?}", message.trim());
    }
    let value = line.trim();
    value
        .parse::<T>()
        .with_context(|| format!("invalid value {value:?}"))
}

fn denoise(
    input: &Path,
    output: &Path,
    sigma: Option<f64>,
    params: &Bm3dParams,
    reference: Option<&Path>,
) -> Result<()> {
    let noisy = codec::load_image(input)?;
    let denoised = match sigma {
        Some(sigma) => experiment::denoise(&noisy, sigma, params)?,
        None => {
            let (denoised, estimated) = experiment::denoise_auto(&noisy, params)?;
            println!("estimated sigma: {estimated:.4}");
            denoised
        }
    };
    codec::save_image(output, &denoised)?;

    if let Some(path) = reference {
        let reference = codec::load_image(path)?;
        report_psnr(&reference, &noisy, &denoised)?;
    }
    Ok(())
}

fn report_psnr(reference: &Image, noisy: &Image, denoised: &Image) -> Result<()> {
    println!("PSNR of noisy image: {:.4}", metrics::psnr(reference, noisy)?);
    println!(
        "PSNR of reconstructed image: {:.4}",
        metrics::psnr(reference, denoised)?
    );
    Ok(())
}

fn run_harness(
    reference: &Path,
    sigma: f64,
    seed: Option<u64>,
    params: &Bm3dParams,
) -> Result<ExperimentReport> {
    let reference = codec::load_image(reference)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let report = experiment::run_experiment(&reference, sigma, params, &mut rng)
        .context("experiment failed")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["bm3d-shell", "-v", "add-noise", "a.png", "b.png"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::AddNoise { sigma, seed, .. } => {
                assert_eq!(sigma, 40.0);
                assert_eq!(seed, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "bm3d-shell",
            "denoise",
            "in.png",
            "out.png",
            "--color-space",
            "ycbcr",
        ])
        .unwrap();
        match cli.command {
            Command::Denoise {
                color_space, sigma, ..
            } => {
                assert_eq!(color_space, Some(ColorSpace::YCbCr));
                assert_eq!(sigma, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_color_space() {
        assert!(Cli::try_parse_from(["bm3d-shell", "denoise", "a", "b", "--color-space", "lab"])
            .is_err());
    }

    #[test]
    fn test_prompt_reads_trimmed_value() {
        let mut input = Cursor::new("  42 \n7\n");
        let mut out = Vec::new();
        let v: usize = prompt("value: ", &mut input, &mut out).unwrap();
        assert_eq!(v, 42);
        assert_eq!(String::from_utf8(out).unwrap(), "value: ");
        let v: usize = prompt("next: ", &mut input, &mut Vec::new()).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_prompt_errors() {
        let r: Result<usize> = prompt("x: ", &mut Cursor::new("abc\n"), &mut Vec::new());
        assert!(r.is_err());
        let r: Result<usize> = prompt("x: ", &mut Cursor::new(""), &mut Vec::new());
        assert!(r.is_err());
    }

    #[test]
    fn test_or_prompt_skips_input_when_given() {
        let mut input = Cursor::new("");
        let mut out = Vec::new();
        let v: usize = or_prompt(Some(3), "x: ", &mut input, &mut out).unwrap();
        assert_eq!(v, 3);
        assert!(out.is_empty());
    }

    #[test]
    fn test_show_prompts_for_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::zeros(4, 6, 3).unwrap();
        raw::write_raw(dir.path().join("frame_t_base"), &image).unwrap();
        let png = dir.path().join("shown.png");

        let mut input = Cursor::new("0\n4\n6\n");
        let mut out = Vec::new();
        show(
            dir.path(),
            "frame",
            ShowArgs {
                index: None,
                height: None,
                width: None,
                channels: Some(3),
                output: Some(png.clone()),
            },
            &mut input,
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[0] : "));
        assert!(text.contains("You are showing: "));
        assert!(!text.contains("channels"));
        assert!(png.exists());
    }

    #[test]
    fn test_resolve_params_overrides() {
        let params = resolve_params(None, Some(ColorSpace::Rgb), true).unwrap();
        assert_eq!(params.color_space, ColorSpace::Rgb);
        assert!(params.verbose);
        let params = resolve_params(None, None, false).unwrap();
        assert_eq!(params, Bm3dParams::default());
    }
}
