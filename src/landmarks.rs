//! Fuente de landmarks de mano.
//!
//! El detector real (MediaPipe Hands) corre en un proceso Python aparte:
//! `hand_detect.py` en la raíz del repositorio.
//! Instalación: `python3 -m venv .venv && .venv/bin/pip install mediapipe numpy`
//! Protocolo con el proceso:
//! - al arrancar escribe una línea `READY`
//! - por cada frame recibe en stdin una cabecera little-endian (ancho, alto, canales)
//!   seguida de los bytes RGB
//! - responde una línea JSON `{"hands": [{"score": .., "landmarks": [{x,y,z} x 21]}], "error": null}`

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::camera::Frame;
use crate::config::DetectorOptions;
use crate::types::{Landmark, LandmarkSet};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Respuesta JSON inválida: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No se pudo iniciar el detector: {0}")]
    Startup(String),

    #[error("El detector reportó un error: {0}")]
    Backend(String),
}

/// Dado un frame, devuelve los landmarks de la mano visible (como mucho una)
pub trait HandLandmarker: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectorError>;
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    score: f32,
    landmarks: Vec<Landmark>,
}

#[derive(Deserialize, Debug)]
struct DetectionResult {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Interpreta una respuesta del detector y elige la primera mano válida
pub fn parse_detection(
    line: &str,
    min_confidence: f32,
) -> Result<Option<LandmarkSet>, DetectorError> {
    let result: DetectionResult = serde_json::from_str(line.trim())?;

    if let Some(error) = result.error {
        return Err(DetectorError::Backend(error));
    }

    for hand in result.hands {
        if hand.score < min_confidence {
            debug!(score = hand.score, "mano descartada por confianza baja");
            continue;
        }
        match LandmarkSet::from_slice(&hand.landmarks) {
            Ok(set) => return Ok(Some(set)),
            Err(e) => warn!("{}", e),
        }
    }

    Ok(None)
}

/// Detector MediaPipe en un subproceso Python
pub struct SubprocessLandmarker {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    min_detection_confidence: f32,
}

impl SubprocessLandmarker {
    pub fn spawn(options: &DetectorOptions) -> Result<Self, DetectorError> {
        if !Path::new(&options.script).exists() {
            return Err(DetectorError::Startup(format!(
                "script no encontrado: {} (se ejecuta desde la raíz del repositorio)",
                options.script
            )));
        }

        info!("Iniciando detector de manos: {} {}", options.python, options.script);

        let mut process = Command::new(&options.python)
            .arg(&options.script)
            .arg("--max-num-hands")
            .arg(options.max_num_hands.to_string())
            .arg("--min-detection-confidence")
            .arg(options.min_detection_confidence.to_string())
            .arg("--min-tracking-confidence")
            .arg(options.min_tracking_confidence.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DetectorError::Startup(e.to_string()))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| DetectorError::Startup("sin stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| DetectorError::Startup("sin stdout".to_string()))?;
        let mut stdout = BufReader::new(stdout);

        let mut ready = String::new();
        stdout.read_line(&mut ready)?;
        if ready.trim() != "READY" {
            let _ = process.kill();
            return Err(DetectorError::Startup(format!(
                "el detector no respondió READY: {:?}",
                ready.trim()
            )));
        }

        info!("Detector de manos listo");

        Ok(Self {
            process,
            stdin,
            stdout,
            min_detection_confidence: options.min_detection_confidence,
        })
    }
}

impl HandLandmarker for SubprocessLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectorError> {
        if frame.data.is_empty() {
            return Ok(None);
        }

        self.stdin.write_all(&frame.width.to_le_bytes())?;
        self.stdin.write_all(&frame.height.to_le_bytes())?;
        self.stdin.write_all(&frame.channels().to_le_bytes())?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()?;

        let mut response = String::new();
        if self.stdout.read_line(&mut response)? == 0 {
            return Err(DetectorError::Backend("el detector cerró su salida".to_string()));
        }

        parse_detection(&response, self.min_detection_confidence)
    }
}

impl Drop for SubprocessLandmarker {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Serializa una mano al formato que emite el detector (para grabaciones y pruebas)
pub fn landmarks_to_json(hand: &LandmarkSet, score: f32) -> String {
    let landmarks: Vec<serde_json::Value> = hand
        .points()
        .iter()
        .map(|p| serde_json::json!({"x": p.x, "y": p.y, "z": p.z}))
        .collect();
    serde_json::json!({"hands": [{"score": score, "landmarks": landmarks}], "error": null})
        .to_string()
}
