use std::error::Error;
use std::fs;
use std::path::PathBuf;
use structopt::StructOpt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use depth_serve::{Config, DepthEstimator, Job, JobOutput};
use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "depth-cli",
    about = "Run a single depth-estimation job against a local SavedModel"
)]
struct CmdArgs {
    #[structopt(parse(from_os_str), help = "Export directory of the depth SavedModel")]
    export_dir: PathBuf,

    #[structopt(help = "URL to fetch image from", required_unless = "job")]
    image_url: Option<String>,

    #[structopt(long, parse(from_os_str), help = "Job JSON file to run instead of a URL")]
    job: Option<PathBuf>,

    #[structopt(short, long, parse(from_os_str), help = "Write the depth map PNG to this path")]
    output: Option<PathBuf>,

    #[structopt(long, help = "Download attempts before giving up")]
    attempts: Option<u32>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let mut config = Config::from_env()?;
    config.model.export_dir = args.export_dir;
    if let Some(attempts) = args.attempts {
        config.fetch.retry.max_attempts = attempts.max(1);
    }

    let job = match (&args.job, &args.image_url) {
        (Some(path), _) => Job::from_value(serde_json::from_str(&fs::read_to_string(path)?)?),
        (None, Some(url)) => Job::from_url(url),
        (None, None) => return Err("either an image URL or --job is required".into()),
    };

    let estimator = DepthEstimator::new(&config)?;
    let output = estimator.handle(&job);

    if let (Some(path), JobOutput::Success { depth_map_base64, .. }) = (&args.output, &output) {
        fs::write(path, STANDARD.decode(depth_map_base64)?)?;
        info!("Depth map written to {}", path.display());
    }

    println!("{}", serde_json::to_string(&output)?);

    if !output.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
