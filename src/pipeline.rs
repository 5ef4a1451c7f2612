//! Camino único de reconocimiento.
//!
//! Hilo de captura → `FrameQueue` (capacidad 2) → hilo de reconocimiento
//! (detector → clasificador → anti-rebote + enfriamiento) → canal de gestos confirmados.
//! El hilo de reconocimiento deja además la última `Snapshot` en una ranura compartida
//! que la interfaz lee a su propio ritmo.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::camera::{run_capture, Frame, FrameQueue, FrameSource};
use crate::config::ExploradorConfig;
use crate::gesture_classifier::{FingerState, GestureClassifier};
use crate::gesture_debouncer::GestureGate;
use crate::landmarks::HandLandmarker;
use crate::types::{GestureSymbol, LandmarkSet};

/// Estado visible del último frame procesado (para dibujar el overlay)
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub frame: Frame,
    pub hand: Option<LandmarkSet>,
    pub fingers: Option<FingerState>,
    pub raw: GestureSymbol,
    pub last_confirmed: Option<GestureSymbol>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecognitionStats {
    pub frames: u64,
    pub hands: u64,
    pub confirmed: u64,
    pub detector_errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub captured: u64,
    pub dropped: u64,
    pub recognition: RecognitionStats,
}

/// Clasificador + capas de anti-rebote. Solo lo toca el hilo de reconocimiento.
pub struct Recognizer {
    classifier: GestureClassifier,
    gate: GestureGate,
    last_confirmed: Option<GestureSymbol>,
}

impl Recognizer {
    pub fn new(config: &ExploradorConfig) -> Self {
        Self {
            classifier: GestureClassifier::new(config.classifier),
            gate: GestureGate::new(&config.debounce),
            last_confirmed: None,
        }
    }

    /// Devuelve el gesto crudo del frame y el confirmado, si lo hay
    pub fn process(
        &mut self,
        hand: Option<&LandmarkSet>,
        now: Instant,
    ) -> (GestureSymbol, Option<GestureSymbol>) {
        let raw = self.classifier.classify_frame(hand);
        let confirmed = self.gate.process_at(raw, now);
        if confirmed.is_some() {
            self.last_confirmed = confirmed;
        }
        (raw, confirmed)
    }

    pub fn finger_state(&self, hand: &LandmarkSet) -> FingerState {
        self.classifier.finger_state(hand)
    }

    pub fn last_confirmed(&self) -> Option<GestureSymbol> {
        self.last_confirmed
    }
}

type SnapshotSlot = Arc<Mutex<Option<Snapshot>>>;

pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    queue: FrameQueue,
    capture: Option<JoinHandle<u64>>,
    recognition: Option<JoinHandle<RecognitionStats>>,
    gestures: Receiver<GestureSymbol>,
    snapshot: SnapshotSlot,
}

impl PipelineHandle {
    /// Canal de gestos ya confirmados por ambas capas
    pub fn gestures(&self) -> &Receiver<GestureSymbol> {
        &self.gestures
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Falso tras `stop()` o cuando la cámara dejó de entregar frames
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    /// Detiene ambos hilos y espera a que terminen. La cámara se libera en el hilo de captura.
    pub fn stop(mut self) -> PipelineStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PipelineStats {
        self.stop.store(true, Ordering::Relaxed);

        let captured = self
            .capture
            .take()
            .map(|h| h.join().unwrap_or_else(|_| {
                warn!("El hilo de captura terminó con pánico");
                0
            }))
            .unwrap_or(0);

        let recognition = self
            .recognition
            .take()
            .map(|h| h.join().unwrap_or_else(|_| {
                warn!("El hilo de reconocimiento terminó con pánico");
                RecognitionStats::default()
            }))
            .unwrap_or_default();

        PipelineStats {
            captured,
            dropped: self.queue.dropped(),
            recognition,
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.capture.is_some() || self.recognition.is_some() {
            self.shutdown();
        }
    }
}

/// Arranca los hilos de captura y reconocimiento
pub fn spawn_pipeline<S, D>(
    mut source: S,
    mut detector: D,
    config: &ExploradorConfig,
) -> std::io::Result<PipelineHandle>
where
    S: FrameSource + 'static,
    D: HandLandmarker + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let queue = FrameQueue::new(config.capture.frame_queue_capacity);
    let snapshot: SnapshotSlot = Arc::new(Mutex::new(None));
    let (tx_gesture, rx_gesture) = unbounded::<GestureSymbol>();

    let capture = {
        let stop = Arc::clone(&stop);
        let queue = queue.clone();
        let sleep = config.capture.capture_sleep();
        thread::Builder::new()
            .name("captura".to_string())
            .spawn(move || {
                let captured = run_capture(&mut source, &queue, &stop, sleep);
                // Cámara cerrada: también termina el reconocimiento
                if !stop.swap(true, Ordering::Relaxed) {
                    warn!("Captura terminada, se detiene el reconocimiento");
                }
                captured
            })?
    };

    let recognition = {
        let stop = Arc::clone(&stop);
        let queue = queue.clone();
        let snapshot = Arc::clone(&snapshot);
        let recognizer = Recognizer::new(config);
        let poll = config.capture.ui_tick();
        thread::Builder::new()
            .name("reconocimiento".to_string())
            .spawn(move || {
                recognition_loop(
                    &mut detector,
                    recognizer,
                    &queue,
                    &stop,
                    &tx_gesture,
                    &snapshot,
                    poll,
                )
            })?
    };

    info!("Pipeline de gestos iniciado");

    Ok(PipelineHandle {
        stop,
        queue,
        capture: Some(capture),
        recognition: Some(recognition),
        gestures: rx_gesture,
        snapshot,
    })
}

fn recognition_loop<D: HandLandmarker + ?Sized>(
    detector: &mut D,
    mut recognizer: Recognizer,
    queue: &FrameQueue,
    stop: &AtomicBool,
    tx_gesture: &Sender<GestureSymbol>,
    snapshot: &SnapshotSlot,
    poll: Duration,
) -> RecognitionStats {
    let mut stats = RecognitionStats::default();

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = queue.pop_timeout(poll) else {
            continue;
        };
        stats.frames += 1;

        // Un frame malo no detiene el bucle
        let hand = match detector.detect(&frame) {
            Ok(hand) => hand,
            Err(e) => {
                stats.detector_errors += 1;
                warn!(seq = frame.seq, "Error en el detector de manos: {}", e);
                continue;
            }
        };
        if hand.is_some() {
            stats.hands += 1;
        }

        let (raw, confirmed) = recognizer.process(hand.as_ref(), frame.captured_at);
        if let Some(gesture) = confirmed {
            stats.confirmed += 1;
            debug!(seq = frame.seq, %gesture, "gesto confirmado");
            let _ = tx_gesture.send(gesture);
        }

        let fingers = hand.as_ref().map(|h| recognizer.finger_state(h));
        let latest = Snapshot {
            frame,
            hand,
            fingers,
            raw,
            last_confirmed: recognizer.last_confirmed(),
        };
        *snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(latest);
    }

    debug!(?stats, "reconocimiento terminado");
    stats
}
