use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::panorama::LatLng;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Valor inválido para {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Umbrales geométricos del clasificador
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Distancia normalizada mínima para considerar pulgar abierto / dedo extendido
    pub threshold: f32,
    /// Fracción del umbral aplicada a los dedos (el pulgar usa el umbral completo)
    pub finger_factor: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            finger_factor: 0.8,
        }
    }
}

impl ClassifierConfig {
    pub fn finger_threshold(&self) -> f32 {
        self.threshold * self.finger_factor
    }
}

/// Las dos capas de anti-rebote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Frames consecutivos con el mismo gesto antes de confirmarlo
    pub gesture_threshold: u32,
    /// Tiempo mínimo entre dos gestos ejecutados
    pub cooldown_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            gesture_threshold: 2,
            cooldown_ms: 500,
        }
    }
}

impl DebounceConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Parámetros del detector externo de landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub max_num_hands: u32,
    /// Intérprete y script del detector MediaPipe
    pub python: String,
    pub script: String,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.3,
            min_tracking_confidence: 0.3,
            max_num_hands: 1,
            python: ".venv/bin/python".to_string(),
            script: "hand_detect.py".to_string(),
        }
    }
}

/// Cámara y cola de frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    /// Capacidad de la cola de frames (se descarta el más antiguo)
    pub frame_queue_capacity: usize,
    /// Pausa del bucle de captura entre lecturas
    pub capture_sleep_ms: u64,
    /// Periodo del refresco de la interfaz
    pub ui_tick_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            frame_queue_capacity: 2,
            capture_sleep_ms: 10,
            ui_tick_ms: 50,
        }
    }
}

impl CaptureConfig {
    pub fn capture_sleep(&self) -> Duration {
        Duration::from_millis(self.capture_sleep_ms)
    }

    pub fn ui_tick(&self) -> Duration {
        Duration::from_millis(self.ui_tick_ms)
    }
}

/// Comportamiento del panorama
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoramaConfig {
    pub start: LatLng,
    /// Grados por cada gesto de mirar / girar
    pub look_step_deg: f64,
    /// Metros que avanza un gesto sin ruta activa
    pub free_roam_step_m: f64,
}

impl Default for PanoramaConfig {
    fn default() -> Self {
        Self {
            start: LatLng::new(40.91439, -73.12453),
            look_step_deg: 10.0,
            free_roam_step_m: 10.0,
        }
    }
}

/// Configuración completa, inmutable durante la vida del proceso
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploradorConfig {
    pub classifier: ClassifierConfig,
    pub debounce: DebounceConfig,
    pub detector: DetectorOptions,
    pub capture: CaptureConfig,
    pub panorama: PanoramaConfig,
}

impl ExploradorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.classifier;
        if !(c.threshold > 0.0) {
            return Err(invalid("classifier.threshold", "debe ser > 0"));
        }
        if !(c.finger_factor > 0.0 && c.finger_factor <= 1.0) {
            return Err(invalid("classifier.finger_factor", "debe estar en (0, 1]"));
        }
        if self.debounce.gesture_threshold == 0 {
            return Err(invalid("debounce.gesture_threshold", "debe ser >= 1"));
        }
        let d = &self.detector;
        for (field, value) in [
            ("detector.min_detection_confidence", d.min_detection_confidence),
            ("detector.min_tracking_confidence", d.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "debe estar en [0, 1]"));
            }
        }
        if d.max_num_hands != 1 {
            return Err(invalid("detector.max_num_hands", "solo se admite una mano"));
        }
        if self.capture.frame_queue_capacity == 0 {
            return Err(invalid("capture.frame_queue_capacity", "debe ser >= 1"));
        }
        if self.capture.ui_tick_ms == 0 {
            return Err(invalid("capture.ui_tick_ms", "debe ser >= 1"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(invalid("capture.width/height", "deben ser > 0"));
        }
        if !(self.panorama.look_step_deg > 0.0) {
            return Err(invalid("panorama.look_step_deg", "debe ser > 0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
