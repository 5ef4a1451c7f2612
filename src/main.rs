/*
Explorador de calles por gestos

Navega un panorama a pie de calle con gestos de la mano capturados por la webcam:
1. Captura frames de /dev/video0 (ffmpeg)
2. Obtiene los landmarks de la mano con MediaPipe (subproceso Python)
3. Clasifica el gesto y aplica anti-rebote (frames consecutivos + enfriamiento)
4. Envía el comando de navegación al panorama

Los cambios del panorama salen por stdout como JSON, una línea por evento,
para el navegador embebido. Por stdin se aceptan órdenes del anfitrión:
  route [[lat,lng],...]     ruta calculada por el servicio de mapas
  destination <lat> <lng>   pedir ruta hasta un destino
  position <lat> <lng>      mover el panorama a un punto del mapa
  gesture <NOMBRE>          inyectar un gesto (FORWARD, UP, ...)
  quit                      salir

Para ejecutar:
    RUST_LOG=explorador=debug ./target/release/explorador --config explorador.json
*/

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{never, select, tick, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use explorador::camera::FfmpegCamera;
use explorador::config::ExploradorConfig;
use explorador::landmarks::SubprocessLandmarker;
use explorador::navigation::NavigationDispatcher;
use explorador::panorama::{LatLng, PanoramaEvent, StreetPanorama};
use explorador::pipeline::{spawn_pipeline, PipelineHandle};
use explorador::types::GestureSymbol;

struct Options {
    config: Option<PathBuf>,
    route: Option<PathBuf>,
    no_camera: bool,
}

const USAGE: &str = "Uso: explorador [--config <archivo.json>] [--route <ruta.json>] [--no-camera]";

fn parse_args() -> Result<Options> {
    let mut options = Options {
        config: None,
        route: None,
        no_camera: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                options.config = Some(args.next().ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--route" => {
                options.route = Some(args.next().ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--no-camera" => options.no_camera = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("Argumento desconocido: {}\n{}", other, USAGE),
        }
    }

    Ok(options)
}

/// Órdenes que llegan del anfitrión por stdin
#[derive(Debug)]
enum HostCommand {
    Route(String),
    Destination(LatLng),
    Position(LatLng),
    Gesture(GestureSymbol),
    Quit,
}

fn parse_lat_lng(rest: &str) -> Result<LatLng> {
    let mut parts = rest.split_whitespace();
    let lat = parts.next().ok_or_else(|| anyhow!("falta la latitud"))?.parse::<f64>()?;
    let lng = parts.next().ok_or_else(|| anyhow!("falta la longitud"))?.parse::<f64>()?;
    Ok(LatLng::new(lat, lng))
}

fn parse_command(line: &str) -> Result<Option<HostCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let command = match cmd {
        "route" => HostCommand::Route(rest.trim().to_string()),
        "destination" => HostCommand::Destination(parse_lat_lng(rest)?),
        "position" => HostCommand::Position(parse_lat_lng(rest)?),
        "gesture" => HostCommand::Gesture(rest.parse::<GestureSymbol>()?),
        "quit" | "exit" => HostCommand::Quit,
        other => bail!("Orden desconocida: {}", other),
    };
    Ok(Some(command))
}

fn spawn_stdin_reader(tx: Sender<HostCommand>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Error leyendo stdin: {}", e);
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{}", e),
                }
            }
            let _ = tx.send(HostCommand::Quit);
        })?;
    Ok(())
}

/// Escribe cada evento del panorama como una línea JSON en stdout
fn spawn_bridge(rx: Receiver<PanoramaEvent>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("puente".to_string())
        .spawn(move || {
            let stdout = io::stdout();
            for event in rx.iter() {
                let line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        error!("No se pudo serializar {:?}: {}", event, e);
                        continue;
                    }
                };
                let mut out = stdout.lock();
                if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
                    // El navegador se fue; los comandos son orientativos
                    debug!("stdout cerrado, se descartan eventos");
                }
            }
        })?;
    Ok(handle)
}

fn start_gestures(config: &ExploradorConfig) -> Result<PipelineHandle> {
    let camera = FfmpegCamera::open(&config.capture)?;
    let detector = SubprocessLandmarker::spawn(&config.detector)?;
    let pipeline = spawn_pipeline(camera, detector, config)
        .context("No se pudieron lanzar los hilos del pipeline")?;
    Ok(pipeline)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "explorador=info".into()),
        )
        .init();

    let options = parse_args()?;
    info!("🧭 Explorador de calles v{}", env!("CARGO_PKG_VERSION"));

    let config = match &options.config {
        Some(path) => ExploradorConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => ExploradorConfig::default(),
    };
    debug!(?config, "configuración");

    let (tx_events, rx_events) = unbounded::<PanoramaEvent>();
    let bridge = spawn_bridge(rx_events)?;

    let mut panorama = StreetPanorama::new(config.panorama, tx_events);
    panorama.set_position(config.panorama.start);
    if let Some(path) = &options.route {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la ruta {:?}", path))?;
        panorama.route_calculated(&json)?;
    }
    let mut dispatcher = NavigationDispatcher::new(panorama);

    // Sin cámara la aplicación sigue funcionando, solo sin control por gestos
    let pipeline = if options.no_camera {
        info!("Modo sin cámara");
        None
    } else {
        match start_gestures(&config) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                error!("❌ Control por gestos desactivado: {:#}", e);
                None
            }
        }
    };

    let (tx_cmd, rx_cmd) = unbounded::<HostCommand>();
    spawn_stdin_reader(tx_cmd)?;

    let mut gestures = pipeline
        .as_ref()
        .map(|p| p.gestures().clone())
        .unwrap_or_else(never);
    let ticker = tick(config.capture.ui_tick());
    let mut shown_gesture = GestureSymbol::None;

    info!("✅ Sistema listo");

    loop {
        let mut gestures_closed = false;
        select! {
            recv(gestures) -> msg => {
                match msg {
                    Ok(gesture) => {
                        dispatcher.dispatch(gesture);
                    }
                    Err(_) => gestures_closed = true,
                }
            }
            recv(ticker) -> _ => {
                if let Some(snapshot) = pipeline.as_ref().and_then(|p| p.latest_snapshot()) {
                    if snapshot.raw != shown_gesture {
                        shown_gesture = snapshot.raw;
                        debug!(seq = snapshot.frame.seq, gesture = %shown_gesture, "gesto actual");
                    }
                }
            }
            recv(rx_cmd) -> msg => {
                match msg {
                    Ok(HostCommand::Quit) | Err(_) => break,
                    Ok(HostCommand::Gesture(gesture)) => {
                        dispatcher.dispatch(gesture);
                    }
                    Ok(command) => handle_command(&mut dispatcher, command),
                }
            }
        }

        if gestures_closed {
            warn!("❌ El pipeline de gestos terminó, control por gestos desactivado");
            gestures = never();
        }
    }

    info!("Cerrando aplicación...");
    if let Some(pipeline) = pipeline {
        let stats = pipeline.stop();
        info!(
            "Pipeline detenido: {} frames capturados, {} descartados, {} gestos confirmados",
            stats.captured, stats.dropped, stats.recognition.confirmed
        );
    }

    drop(dispatcher);
    if bridge.join().is_err() {
        warn!("El hilo del puente terminó con pánico");
    }

    Ok(())
}

fn handle_command(dispatcher: &mut NavigationDispatcher<StreetPanorama>, command: HostCommand) {
    let Some(panorama) = dispatcher.surface_mut() else {
        return;
    };
    match command {
        HostCommand::Route(json) => {
            if let Err(e) = panorama.route_calculated(&json) {
                warn!("Ruta inválida: {}", e);
            }
        }
        HostCommand::Destination(destination) => panorama.calculate_route(destination),
        HostCommand::Position(position) => panorama.set_position(position),
        HostCommand::Gesture(_) | HostCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_commands() {
        assert!(matches!(
            parse_command("route [[40.0, -73.0], [40.1, -73.0]]"),
            Ok(Some(HostCommand::Route(json))) if json == "[[40.0, -73.0], [40.1, -73.0]]"
        ));
        assert!(matches!(
            parse_command("destination 40.5 -73.25"),
            Ok(Some(HostCommand::Destination(p))) if p == LatLng::new(40.5, -73.25)
        ));
        assert!(matches!(
            parse_command("  position 1 2  "),
            Ok(Some(HostCommand::Position(p))) if p == LatLng::new(1.0, 2.0)
        ));
        assert!(matches!(
            parse_command("gesture forward"),
            Ok(Some(HostCommand::Gesture(GestureSymbol::Forward)))
        ));
        assert!(matches!(parse_command("quit"), Ok(Some(HostCommand::Quit))));
        assert!(matches!(parse_command("exit"), Ok(Some(HostCommand::Quit))));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert!(matches!(parse_command(""), Ok(None)));
        assert!(matches!(parse_command("   "), Ok(None)));
    }

    #[test]
    fn malformed_commands_are_errors() {
        assert!(parse_command("teleport 1 2").is_err());
        assert!(parse_command("position 40.0").is_err());
        assert!(parse_command("destination north south").is_err());
        assert!(parse_command("gesture SIDEWAYS").is_err());
    }
}
