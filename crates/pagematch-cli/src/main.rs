//! pagematch CLI: register photographed form pages onto a template.

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{GrayImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};

use pagematch::{
    FeatureMatcher, ImageFile, MatchPolicy, Normalizer, OrbExtractor, RectifyInterpolation,
    RegisteredFrame, RegistrationConfig,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pagematch")]
#[command(about = "Align captured form pages to a reference template (ORB features + RANSAC homography)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a capture against a template and write the rectified page.
    Register(CliRegisterArgs),

    /// Print keypoint statistics for an image.
    Features(CliFeaturesArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MatchPolicyArg {
    CrossCheck,
    RatioTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InterpolationArg {
    Nearest,
    Bilinear,
    Bicubic,
}

impl From<InterpolationArg> for RectifyInterpolation {
    fn from(a: InterpolationArg) -> Self {
        match a {
            InterpolationArg::Nearest => RectifyInterpolation::Nearest,
            InterpolationArg::Bilinear => RectifyInterpolation::Bilinear,
            InterpolationArg::Bicubic => RectifyInterpolation::Bicubic,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliRegisterArgs {
    /// Path to the reference template image.
    #[arg(long)]
    template: PathBuf,

    /// Catalog name given to the template.
    #[arg(long, default_value = "template")]
    template_name: String,

    /// Path to the captured page image.
    #[arg(long)]
    capture: PathBuf,

    /// Path to write the rectified page (PNG).
    #[arg(long)]
    out: PathBuf,

    /// Path to write the registration report (JSON).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Path to write a side-by-side correspondence visualization (PNG).
    #[arg(long)]
    matches: Option<PathBuf>,

    /// Number of best-ranked correspondences drawn in the visualization.
    #[arg(long, default_value = "20")]
    matches_top: usize,

    /// Registration config (JSON). Flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// RANSAC inlier threshold in template pixels.
    #[arg(long)]
    ransac_thresh_px: Option<f64>,

    /// Maximum RANSAC iterations.
    #[arg(long)]
    ransac_iters: Option<usize>,

    /// RANSAC random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum number of keypoints per image.
    #[arg(long)]
    max_features: Option<usize>,

    /// Minimum number of correspondences required to attempt a fit.
    #[arg(long)]
    min_matches: Option<usize>,

    /// Correspondence acceptance policy.
    #[arg(long, value_enum)]
    match_policy: Option<MatchPolicyArg>,

    /// Ratio for --match-policy ratio-test.
    #[arg(long, default_value = "0.75")]
    ratio: f32,

    /// Resampling kernel for the rectified output.
    #[arg(long, value_enum)]
    interpolation: Option<InterpolationArg>,

    /// Include per-correspondence diagnostics in the report.
    #[arg(long)]
    diagnostics: bool,
}

impl CliRegisterArgs {
    fn build_config(&self) -> CliResult<RegistrationConfig> {
        let mut config = match &self.config {
            Some(path) => RegistrationConfig::from_json_file(path)?,
            None => RegistrationConfig::default(),
        };
        if let Some(t) = self.ransac_thresh_px {
            config.ransac.inlier_threshold = t;
        }
        if let Some(n) = self.ransac_iters {
            config.ransac.max_iters = n;
        }
        if let Some(s) = self.seed {
            config.ransac.seed = s;
        }
        if let Some(n) = self.max_features {
            config.features.max_features = n;
        }
        if let Some(n) = self.min_matches {
            config.matching.min_correspondences = n;
        }
        match self.match_policy {
            Some(MatchPolicyArg::CrossCheck) => config.matching.policy = MatchPolicy::CrossCheck,
            Some(MatchPolicyArg::RatioTest) => {
                config.matching.policy = MatchPolicy::RatioTest { ratio: self.ratio };
            }
            None => {}
        }
        if let Some(i) = self.interpolation {
            config.rectify.interpolation = i.into();
        }
        if self.diagnostics || self.matches.is_some() {
            config.collect_diagnostics = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Args)]
struct CliFeaturesArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Maximum number of keypoints.
    #[arg(long, default_value = "5000")]
    max_features: usize,

    /// FAST intensity threshold.
    #[arg(long, default_value = "20")]
    fast_threshold: u8,

    /// Path to write keypoints (JSON).
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register(args) => run_register(&args),
        Commands::Features(args) => run_features(&args),
    }
}

fn open_image(path: &Path) -> CliResult<image::DynamicImage> {
    image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })
}

// ── register ───────────────────────────────────────────────────────────

fn run_register(args: &CliRegisterArgs) -> CliResult<()> {
    let config = args.build_config()?;

    tracing::info!("Loading template: {}", args.template.display());
    let template = open_image(&args.template)?;
    let matcher = FeatureMatcher::with_config(&args.template_name, template, config);

    tracing::info!("Loading capture: {}", args.capture.display());
    let mut source = ImageFile::new(&args.capture);
    let frame = matcher.register_next(&mut source, None)?;

    frame.raster.save(&args.out)?;
    tracing::info!(
        "Rectified {}x{} page written to {}",
        frame.width(),
        frame.height(),
        args.out.display()
    );

    if let Some(report_path) = &args.report {
        let json = serde_json::to_string_pretty(&frame.report())?;
        std::fs::write(report_path, &json)?;
        tracing::info!("Report written to {}", report_path.display());
    }

    if let Some(viz_path) = &args.matches {
        let template = matcher.store().active();
        let capture = Normalizer::new(matcher.config().normalizer.clone())
            .normalize(&open_image(&args.capture)?);
        let canvas = draw_matches(template.normalized(), &capture, &frame, args.matches_top);
        canvas.save(viz_path)?;
        tracing::info!("Match visualization written to {}", viz_path.display());
    }

    Ok(())
}

/// Template on the left, capture on the right, the `top` best-ranked
/// correspondences joined by lines (green inliers, red outliers).
fn draw_matches(
    template: &GrayImage,
    capture: &GrayImage,
    frame: &RegisteredFrame,
    top: usize,
) -> RgbImage {
    use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

    let (tw, th) = template.dimensions();
    let (cw, ch) = capture.dimensions();
    let mut canvas = RgbImage::new(tw + cw, th.max(ch));
    let to_rgb = |g: &GrayImage| image::DynamicImage::ImageLuma8(g.clone()).to_rgb8();
    image::imageops::overlay(&mut canvas, &to_rgb(template), 0, 0);
    image::imageops::overlay(&mut canvas, &to_rgb(capture), tw as i64, 0);

    let Some(diag) = &frame.diagnostics else {
        return canvas;
    };
    for m in diag.matches.iter().take(top) {
        let color = if m.inlier {
            Rgb([40, 200, 60])
        } else {
            Rgb([220, 40, 40])
        };
        let a = (m.template_xy[0] as f32, m.template_xy[1] as f32);
        let b = (m.capture_xy[0] as f32 + tw as f32, m.capture_xy[1] as f32);
        draw_line_segment_mut(&mut canvas, a, b, color);
        draw_hollow_circle_mut(&mut canvas, (a.0 as i32, a.1 as i32), 4, color);
        draw_hollow_circle_mut(&mut canvas, (b.0 as i32, b.1 as i32), 4, color);
    }
    canvas
}

// ── features ───────────────────────────────────────────────────────────

fn run_features(args: &CliFeaturesArgs) -> CliResult<()> {
    let img = open_image(&args.image)?;
    let gray = Normalizer::default().normalize(&img);
    let (w, h) = gray.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let extractor = OrbExtractor::new(pagematch::OrbConfig {
        max_features: args.max_features,
        fast_threshold: args.fast_threshold,
        ..pagematch::OrbConfig::default()
    });
    let features = extractor.extract(&gray);

    println!("pagematch features: {}", args.image.display());
    println!("  image size:      {}x{}", w, h);
    println!("  keypoints:       {}", features.len());
    for (octave, n) in features.octave_histogram().iter().enumerate() {
        println!("  level {:>2}:        {}", octave, n);
    }
    if !features.is_empty() {
        let sum: f64 = features.keypoints.iter().map(|k| k.response as f64).sum();
        let mean_response = sum / features.len() as f64;
        println!("  mean response:   {:.6}", mean_response);
    }

    if let Some(out) = &args.out {
        let json = serde_json::to_string_pretty(&features.keypoints)?;
        std::fs::write(out, &json)?;
        tracing::info!("Keypoints written to {}", out.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_register(extra: &[&str]) -> CliRegisterArgs {
        let mut argv = vec![
            "pagematch",
            "register",
            "--template",
            "t.png",
            "--capture",
            "c.png",
            "--out",
            "o.png",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Register(args) => args,
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn defaults_match_library_defaults() {
        let cfg = parse_register(&[]).build_config().unwrap();
        assert_eq!(cfg, RegistrationConfig::default());
    }

    #[test]
    fn flags_override_config_fields() {
        let cfg = parse_register(&[
            "--ransac-thresh-px",
            "3.5",
            "--max-features",
            "1200",
            "--match-policy",
            "ratio-test",
            "--ratio",
            "0.8",
            "--interpolation",
            "nearest",
            "--matches",
            "m.png",
        ])
        .build_config()
        .unwrap();
        assert_eq!(cfg.ransac.inlier_threshold, 3.5);
        assert_eq!(cfg.features.max_features, 1200);
        assert_eq!(cfg.matching.policy, MatchPolicy::RatioTest { ratio: 0.8 });
        assert_eq!(cfg.rectify.interpolation, RectifyInterpolation::Nearest);
        assert!(cfg.collect_diagnostics);
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let args = parse_register(&["--match-policy", "ratio-test", "--ratio", "1.5"]);
        assert!(args.build_config().is_err());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let args = parse_register(&["--ransac-thresh-px", "0"]);
        assert!(args.build_config().is_err());
    }
}
