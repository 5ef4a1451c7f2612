use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No se pudo abrir la cámara {device}: {reason}")]
    Unavailable { device: String, reason: String },

    #[error("La cámara dejó de entregar frames")]
    Closed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Imagen RGB24 capturada
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn channels(&self) -> u32 {
        3
    }
}

/// Dispositivo que produce frames. `Ok(None)` significa que no hubo frame en esta lectura.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Libera el dispositivo
    fn release(&mut self);
}

/// Cola acotada de frames que prefiere los más recientes.
/// `push` nunca bloquea: si está llena se descarta el frame más antiguo.
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn push(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Frames descartados por desbordamiento
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bucle de captura: lee frames hasta que se activa `stop` y libera la cámara al salir.
/// La bandera se revisa una vez por iteración. Devuelve el número de frames capturados.
pub fn run_capture<S: FrameSource + ?Sized>(
    source: &mut S,
    queue: &FrameQueue,
    stop: &AtomicBool,
    sleep: Duration,
) -> u64 {
    let mut captured = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match source.read_frame() {
            Ok(Some(frame)) => {
                captured += 1;
                queue.push(frame);
            }
            Ok(None) => {}
            Err(CameraError::Closed) => {
                error!("La cámara se cerró, fin de la captura");
                break;
            }
            Err(e) => {
                warn!("Error leyendo frame: {}", e);
            }
        }

        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
    }

    source.release();
    debug!(captured, dropped = queue.dropped(), "captura terminada");
    captured
}

/// Flujo de frames RGB24 de tamaño fijo sobre cualquier lector de bytes
pub struct RawVideoStream<R> {
    reader: R,
    width: u32,
    height: u32,
    seq: u64,
}

impl<R: Read> RawVideoStream<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            seq: 0,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Fin del flujo (también a mitad de frame) es `CameraError::Closed`
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let mut data = vec![0u8; self.frame_len()];
        match self.reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(CameraError::Closed),
            Err(e) => return Err(e.into()),
        }

        let frame = Frame {
            seq: self.seq,
            width: self.width,
            height: self.height,
            data,
            captured_at: Instant::now(),
        };
        self.seq += 1;
        Ok(frame)
    }

    /// Espera el primer frame; si no llega, el dispositivo no está disponible
    pub fn first_frame(&mut self, device: &str) -> Result<Frame, CameraError> {
        self.next_frame().map_err(|e| CameraError::Unavailable {
            device: device.to_string(),
            reason: match e {
                CameraError::Closed => "ffmpeg terminó sin entregar ningún frame".to_string(),
                other => other.to_string(),
            },
        })
    }
}

/// Cámara V4L2 leída a través de un proceso `ffmpeg` que entrega RGB24 crudo
pub struct FfmpegCamera {
    process: Option<Child>,
    stream: Option<RawVideoStream<ChildStdout>>,
    pending: Option<Frame>,
}

impl FfmpegCamera {
    pub fn device_path(index: u32) -> PathBuf {
        PathBuf::from(format!("/dev/video{}", index))
    }

    /// Abre la cámara y no retorna hasta tener el primer frame
    pub fn open(config: &CaptureConfig) -> Result<Self, CameraError> {
        let device = Self::device_path(config.camera_index);
        let device_str = device.display().to_string();

        if !device.exists() {
            return Err(CameraError::Unavailable {
                device: device_str,
                reason: "el dispositivo no existe".to_string(),
            });
        }

        let mut process = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "v4l2", "-video_size"])
            .arg(format!("{}x{}", config.width, config.height))
            .arg("-i")
            .arg(&device)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CameraError::Unavailable {
                device: device_str.clone(),
                reason: format!("no se pudo lanzar ffmpeg: {}", e),
            })?;

        let stdout = process.stdout.take().ok_or_else(|| CameraError::Unavailable {
            device: device_str.clone(),
            reason: "ffmpeg sin stdout".to_string(),
        })?;

        let mut camera = Self {
            process: Some(process),
            stream: Some(RawVideoStream::new(stdout, config.width, config.height)),
            pending: None,
        };

        let first = match camera.stream.as_mut() {
            Some(stream) => stream.first_frame(&device_str),
            None => Err(CameraError::Closed),
        };
        // Si falla, Drop mata el proceso
        camera.pending = Some(first?);

        info!("Cámara abierta: {} ({}x{})", device_str, config.width, config.height);
        Ok(camera)
    }
}

impl FrameSource for FfmpegCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        let stream = self.stream.as_mut().ok_or(CameraError::Closed)?;
        stream.next_frame().map(Some)
    }

    fn release(&mut self) {
        self.stream = None;
        self.pending = None;
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
            info!("Cámara liberada");
        }
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Fuente sintética: frames numerados, opcionalmente con límite
    pub struct CountingSource {
        pub next: u64,
        pub limit: Option<u64>,
        pub released: Arc<AtomicBool>,
    }

    impl CountingSource {
        pub fn new(limit: Option<u64>) -> Self {
            Self {
                next: 0,
                limit,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    pub fn frame(seq: u64) -> Frame {
        Frame {
            seq,
            width: 2,
            height: 2,
            data: vec![0; 12],
            captured_at: Instant::now(),
        }
    }

    impl FrameSource for CountingSource {
        fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            if let Some(limit) = self.limit {
                if self.next >= limit {
                    return Err(CameraError::Closed);
                }
            }
            let f = frame(self.next);
            self.next += 1;
            Ok(Some(f))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[test]
    fn queue_keeps_newest_frames() {
        let queue = FrameQueue::new(2);
        for seq in 0..5 {
            queue.push(frame(seq));
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 3);
        assert_eq!(queue.try_pop().map(|f| f.seq), Some(3));
        assert_eq!(queue.try_pop().map(|f| f.seq), Some(4));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn queue_pop_timeout_on_empty() {
        let queue = FrameQueue::new(2);
        assert!(queue.is_empty());
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn raw_stream_splits_fixed_size_frames() {
        let bytes: Vec<u8> = (0..30).collect();
        let mut stream = RawVideoStream::new(bytes.as_slice(), 2, 2);

        let first = stream.first_frame("/dev/video0").unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(first.data, (0..12).collect::<Vec<u8>>());
        assert_eq!(stream.next_frame().map(|f| f.seq).unwrap(), 1);
        // Quedan 6 bytes: frame incompleto
        assert!(matches!(stream.next_frame(), Err(CameraError::Closed)));
    }

    #[test]
    fn stream_without_frames_is_unavailable_at_open() {
        let mut stream = RawVideoStream::new(std::io::empty(), 640, 480);
        match stream.first_frame("/dev/video0") {
            Err(CameraError::Unavailable { device, reason }) => {
                assert_eq!(device, "/dev/video0");
                assert!(reason.contains("ningún frame"));
            }
            other => panic!("se esperaba Unavailable, llegó {:?}", other.map(|f| f.seq)),
        }
    }

    #[test]
    fn capture_stops_when_camera_closes_and_releases() {
        let queue = FrameQueue::new(2);
        let stop = AtomicBool::new(false);
        let mut source = CountingSource::new(Some(6));
        let released = Arc::clone(&source.released);

        let captured = run_capture(&mut source, &queue, &stop, Duration::ZERO);

        assert_eq!(captured, 6);
        assert!(released.load(Ordering::Relaxed));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().map(|f| f.seq), Some(4));
    }

    #[test]
    fn capture_honours_stop_flag() {
        let queue = FrameQueue::new(2);
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = CountingSource::new(None);
        let released = Arc::clone(&source.released);

        let stop_clone = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            run_capture(&mut source, &queue, &stop_clone, Duration::from_millis(1))
        });

        std::thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Relaxed);
        let captured = handle.join().unwrap();

        assert!(captured > 0);
        assert!(released.load(Ordering::Relaxed));
    }

    #[test]
    fn missing_device_is_unavailable() {
        let config = CaptureConfig {
            camera_index: 9999,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            FfmpegCamera::open(&config),
            Err(CameraError::Unavailable { .. })
        ));
    }
}
