//! Runs synthetic camera and LiDAR feature maps through a fuser built from a
//! config, optionally takes a few SGD steps, and saves the learned state.
//!
//! ```text
//! cargo run --example fuse_scene -- --camera 4x32x88 --lidar 8x64x64 --steps 3 --save-path out/fuser.bin
//! ```

use clap::Parser;
use rusty_fuser::gpu;
use rusty_fuser::nn::{Module, StateDict};
use rusty_fuser::optimizer::{Optimizer, Sgd};
use rusty_fuser::tensor::CPU_MATMUL_TIME_NS;
use rusty_fuser::{Fuser, FuserConfig, FuserRegistry, Tensor};
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fuse_scene", about = "Fuse synthetic camera/LiDAR feature maps")]
struct Args {
    /// Fuser config (`.toml` or `.json`). Overrides --camera/--lidar channels.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera feature map as CxHxW.
    #[arg(long, default_value = "4x10x10", value_parser = parse_map)]
    camera: (usize, usize, usize),

    /// LiDAR feature map as CxHxW.
    #[arg(long, default_value = "8x20x20", value_parser = parse_map)]
    lidar: (usize, usize, usize),

    #[arg(long, default_value_t = 16)]
    out_channels: usize,

    #[arg(long, default_value_t = 2)]
    batch_size: usize,

    /// SGD steps on a toy objective (mean squared activation).
    #[arg(long, default_value_t = 0)]
    steps: usize,

    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Run the fuser in eval mode (running statistics) for the final pass.
    #[arg(long)]
    eval: bool,

    #[arg(long)]
    use_gpu: bool,

    #[arg(long)]
    load_path: Option<PathBuf>,

    #[arg(long)]
    save_path: Option<PathBuf>,
}

fn parse_map(s: &str) -> Result<(usize, usize, usize), String> {
    let dims: Vec<usize> = s
        .split('x')
        .map(|d| d.trim().parse::<usize>().map_err(|e| format!("`{d}`: {e}")))
        .collect::<Result<_, _>>()?;
    match dims.as_slice() {
        [c, h, w] => Ok((*c, *h, *w)),
        _ => Err(format!("expected CxHxW, got `{s}`")),
    }
}

fn load_config(path: &Path) -> Result<FuserConfig, Box<dyn Error>> {
    let source = fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => FuserConfig::from_json_str(&source)?,
        _ => FuserConfig::from_toml_str(&source)?,
    };
    Ok(config)
}

fn save_state(fuser: &dyn Fuser, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let state = fuser.transform().state_dict();
    bincode::serialize_into(BufWriter::new(File::create(path)?), &state)?;
    info!(path = %path.display(), entries = state.len(), "saved fuser state");
    Ok(())
}

fn load_state(fuser: &dyn Fuser, path: &Path) -> Result<(), Box<dyn Error>> {
    let state: StateDict = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
    fuser.transform().load_state_dict(&state)?;
    info!(path = %path.display(), "loaded fuser state");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rusty_fuser=info,fuse_scene=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.use_gpu {
        if gpu::GPU_CONTEXT.is_some() {
            gpu::set_enabled(true);
        } else {
            tracing::warn!("--use-gpu was given but no compatible GPU was found, using CPU");
        }
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FuserConfig::new(
            "ConvFuser",
            vec![args.camera.0, args.lidar.0],
            args.out_channels,
        ),
    };
    info!(?config, "building fuser");
    let fuser = FuserRegistry::with_builtins()?.build(&config)?;
    if let Some(path) = &args.load_path {
        load_state(fuser.as_ref(), path)?;
    }

    let camera = Tensor::uniform(
        vec![args.batch_size, config.in_channels[0], args.camera.1, args.camera.2],
        1.0,
    );
    let lidar = Tensor::uniform(
        vec![args.batch_size, config.in_channels[1], args.lidar.1, args.lidar.2],
        1.0,
    );
    let inputs = [camera, lidar];

    if args.steps > 0 {
        let mut optimizer = Sgd::new(fuser.transform().parameters(), args.learning_rate);
        for step in 1..=args.steps {
            optimizer.zero_grad();
            let out = fuser.fuse(&inputs)?;
            let loss = (&out * &out).mean();
            let loss_value = loss.data().iter().copied().next().unwrap_or_default();
            loss.backward();
            optimizer.step();
            info!(step, loss = loss_value, "training step");
        }
    }

    fuser.transform().train(!args.eval);
    let start = Instant::now();
    let fused = fuser.fuse(&inputs)?;
    let elapsed = start.elapsed();

    let data = fused.data();
    let active = data.iter().filter(|&&v| v > 0.0).count() as f32 / data.len().max(1) as f32;
    info!(
        shape = ?fused.shape(),
        active_fraction = active,
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        cpu_matmul_ms = CPU_MATMUL_TIME_NS.load(Ordering::Relaxed) as f64 / 1e6,
        gpu_wait_ms = gpu::TOTAL_GPU_TIME_NS.load(Ordering::Relaxed) as f64 / 1e6,
        "fused feature map"
    );
    drop(data);

    if let Some(path) = &args.save_path {
        save_state(fuser.as_ref(), path)?;
    }
    Ok(())
}
