//! groove-sample CLI — draw drum patterns from a groove VAE decoder.
//!
//! Samples `z ~ N(0, 1)`, decodes it under a per-voice hit budget and prints
//! each pattern as a grid (one row per voice, `x` = hit). Without
//! `--model-dir` an untrained model with the default config is used.
//!
//! With `--json`, prints one JSON object per pattern instead:
//!
//! ```json
//! {"pattern":0,"hits":[[0,4,8]],"velocities":[[0.71,0.66,0.69]],"offsets":[[0.02,-0.1,0.0]]}
//! ```

use candle_core::{DType, Device, IndexOp};
use clap::Parser;
use groove_vae_rs::{
    config::GrooveVaeConfig,
    loader::load_groove_vae,
    model::{
        sampling::{SamplingMode, SamplingParams},
        vae::GrooveVae,
    },
    noise::NoiseSource,
};

#[derive(Parser, Debug)]
#[command(
    name = "groove-sample",
    about = "Sample drum patterns from a groove VAE",
    long_about = "Draw latent vectors from a standard normal, decode them into\n\
                  hit / velocity / offset grids and print the result."
)]
struct Args {
    /// Checkpoint directory with config.json and model.safetensors.
    /// Omit to use freshly initialized weights.
    #[arg(long)]
    model_dir: Option<std::path::PathBuf>,

    /// Random seed. Omit for a random seed each run.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Number of patterns to draw.
    #[arg(long, short = 'b', default_value_t = 1)]
    batch: usize,

    /// Hit selection: 0 = top-k above threshold, 1 = Bernoulli then top-k.
    #[arg(long, default_value_t = 0)]
    mode: i64,

    /// Hit logits are divided by this before the sigmoid.
    #[arg(long, short = 't', default_value_t = 1.0)]
    temperature: f64,

    /// Minimum hit probability (top-k mode), applied to every voice.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Maximum hits per voice per pattern.
    #[arg(long, default_value_t = 16)]
    max_count: usize,

    /// Print JSON lines instead of grids.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.batch == 0 {
        anyhow::bail!("batch must be at least 1");
    }
    let mode = SamplingMode::try_from(args.mode)?;

    let device = Device::cuda_if_available(0)?;
    tracing::info!("Using device: {:?}", device);

    let model = match &args.model_dir {
        Some(dir) => load_groove_vae(dir, &device, DType::F32)
            .map_err(|e| anyhow::anyhow!("failed to load model: {e}"))?,
        None => {
            tracing::warn!("no --model-dir given, sampling from untrained weights");
            let (model, _varmap) = GrooveVae::fresh(&GrooveVaeConfig::default(), &device)?;
            model
        }
    };

    let mut noise = match args.seed {
        Some(seed) => NoiseSource::from_seed(seed),
        None => NoiseSource::from_entropy(),
    };

    let decoder = model.decoder();
    let voices = decoder.voices();
    let params = SamplingParams {
        temperature: args.temperature,
        ..SamplingParams::uniform(voices, args.threshold, args.max_count, mode)
    };

    let z = noise.standard_normal((args.batch, decoder.latent_dim()), DType::F32, &device)?;
    let sampled = decoder.sample(&z, &params, &mut noise)?;
    let hvo = &sampled.hvo;

    for b in 0..args.batch {
        // [T, voices] → [voices, T]
        let hits: Vec<Vec<f32>> = hvo.hits.i(b)?.t()?.to_vec2()?;
        let velocities: Vec<Vec<f32>> = hvo.velocities.i(b)?.t()?.to_vec2()?;
        let offsets: Vec<Vec<f32>> = hvo.offsets.i(b)?.t()?.to_vec2()?;

        if args.json {
            let steps: Vec<Vec<usize>> = hits
                .iter()
                .map(|row| (0..row.len()).filter(|&t| row[t] > 0.5).collect())
                .collect();
            let at_hits = |values: &[Vec<f32>]| -> Vec<Vec<f32>> {
                steps
                    .iter()
                    .zip(values)
                    .map(|(idx, row)| idx.iter().map(|&t| row[t]).collect())
                    .collect()
            };
            let summary = serde_json::json!({
                "pattern": b,
                "hits": steps,
                "velocities": at_hits(&velocities),
                "offsets": at_hits(&offsets),
            });
            println!("{summary}");
        } else {
            println!("pattern {b}");
            for (v, row) in hits.iter().enumerate() {
                let line: String = row
                    .iter()
                    .map(|&h| if h > 0.5 { 'x' } else { '.' })
                    .collect();
                println!("  {v:>2} {line}");
            }
        }
    }

    Ok(())
}
