use image::ImageReader;
use pagematch::{FeatureMatcher, FrameSequence, FrameSource, RegistrationConfig};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <template.png> <out_dir> <frame.png>... [--config cfg.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let mut frames: Vec<&str> = args[3..].iter().map(String::as_str).collect();
    let config = match frames.iter().position(|a| *a == "--config") {
        Some(i) if i + 1 < frames.len() => {
            let cfg = RegistrationConfig::from_json_file(Path::new(frames[i + 1]))?;
            frames.drain(i..i + 2);
            cfg
        }
        _ => RegistrationConfig::default(),
    };

    let template = ImageReader::open(&args[1])?.decode()?;
    let out_dir = Path::new(&args[2]);
    std::fs::create_dir_all(out_dir)?;

    let matcher = FeatureMatcher::with_config("template", template, config);
    let mut source = FrameSequence::from_paths(frames).paced(true);

    let mut index = 0usize;
    while source.is_open() {
        match matcher.register_next(&mut source, None) {
            Ok(frame) => {
                let out = out_dir.join(format!("rectified_{index:04}.png"));
                frame.raster.save(&out)?;
                println!(
                    "frame {index}: {}/{} inliers -> {}",
                    frame.n_inliers,
                    frame.n_correspondences,
                    out.display()
                );
            }
            Err(e) => println!("frame {index}: {e}"),
        }
        index += 1;
    }
    source.close();
    Ok(())
}
