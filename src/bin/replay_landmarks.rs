use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use explorador::config::ExploradorConfig;
use explorador::csv_loader::load_session;
use explorador::gesture_classifier::GestureClassifier;
use explorador::gesture_debouncer::GestureGate;
use explorador::types::GestureSymbol;

struct ReplayOptions {
    verbose: bool,
    fps: f64,
    config: Option<PathBuf>,
}

const USAGE: &str = "Uso: replay_landmarks [--verbose] [--fps <n>] [--config <archivo.json>] <sesion.csv>";

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut opts = ReplayOptions {
        verbose: false,
        fps: 30.0,
        config: None,
    };
    let mut csv_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" | "-v" => opts.verbose = true,
            "--fps" => {
                let value = args.next().ok_or_else(|| anyhow!(USAGE))?;
                opts.fps = value.parse()?;
                if !(opts.fps > 0.0) {
                    bail!("--fps debe ser > 0");
                }
            }
            "--config" => {
                opts.config = Some(args.next().ok_or_else(|| anyhow!(USAGE))?.into());
            }
            _ => {
                if csv_path.is_some() {
                    bail!(USAGE);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV\n{}", USAGE))?;
    Ok((csv_path, opts))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "explorador=warn".into()),
        )
        .init();

    let (csv_path, opts) = parse_args()?;
    let config = match &opts.config {
        Some(path) => ExploradorConfig::load(path)?,
        None => ExploradorConfig::default(),
    };

    println!("🎞️  Reproduciendo sesión desde {:?}", csv_path);
    let session = load_session(&csv_path)?;
    println!(
        "ℹ️  {} frames, umbral {}, {} frames para confirmar, enfriamiento {} ms @ {} fps\n",
        session.len(),
        config.classifier.threshold,
        config.debounce.gesture_threshold,
        config.debounce.cooldown_ms,
        opts.fps
    );

    let classifier = GestureClassifier::new(config.classifier);
    let mut gate = GestureGate::new(&config.debounce);

    // Tiempo sintético según los fps de la grabación
    let start = Instant::now();
    let frame_period = Duration::from_secs_f64(1.0 / opts.fps);

    let mut raw_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut confirmed: Vec<(usize, GestureSymbol)> = Vec::new();

    for (idx, hand) in session.iter().enumerate() {
        let raw = classifier.classify_frame(hand.as_ref());
        *raw_counts.entry(raw.as_str()).or_insert(0) += 1;

        let now = start + frame_period * idx as u32;
        let result = gate.process_at(raw, now);

        if opts.verbose {
            let fingers = hand
                .as_ref()
                .map(|h| format!("{:?}", classifier.finger_state(h)))
                .unwrap_or_else(|| "sin mano".to_string());
            println!(
                "  {:04}  {:<9} racha={}  {}",
                idx,
                raw,
                gate.debouncer().count(),
                fingers
            );
        }

        if let Some(gesture) = result {
            println!("✅ frame {:04}: {}", idx, gesture);
            confirmed.push((idx, gesture));
        }
    }

    println!("\nGestos por frame:");
    for (label, count) in &raw_counts {
        println!("  {:<9} {:>5}", label, count);
    }
    println!("\n{} gestos confirmados", confirmed.len());

    Ok(())
}
