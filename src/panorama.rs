//! Modelo del panorama a pie de calle.
//!
//! El render real (imágenes 360° y cálculo de rutas) lo hace el servicio de mapas
//! dentro del navegador embebido. Aquí se mantiene la posición, la orientación y
//! la ruta activa, y cada cambio se publica como `PanoramaEvent` para el puente
//! con el navegador.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PanoramaConfig;

/// Radio terrestre usado por el servicio de mapas (metros)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

const MAX_PITCH: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Orientación de la cámara del panorama, en grados
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pov {
    pub heading: f64,
    pub pitch: f64,
}

fn normalize_heading(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Rumbo inicial (0..360, 0 = norte) para ir de `from` a `to`
pub fn compute_heading(from: LatLng, to: LatLng) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Punto a `distance_m` metros de `from` siguiendo el rumbo `heading`
pub fn compute_offset(from: LatLng, distance_m: f64, heading: f64) -> LatLng {
    let d = distance_m / EARTH_RADIUS_M;
    let h = heading.to_radians();
    let lat1 = from.lat.to_radians();
    let lng1 = from.lng.to_radians();

    let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * h.cos()).asin();
    let lng2 = lng1 + (h.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());

    LatLng::new(lat2.to_degrees(), lng2.to_degrees())
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("La ruta no tiene puntos")]
    Empty,

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Secuencia ordenada de puntos calculada por el servicio de mapas
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Vec<LatLng>,
    index: usize,
}

impl Route {
    pub fn new(points: Vec<LatLng>) -> Result<Self, RouteError> {
        if points.is_empty() {
            return Err(RouteError::Empty);
        }
        Ok(Self { points, index: 0 })
    }

    /// Formato del puente: `[[lat, lng], ...]`
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let pairs: Vec<[f64; 2]> = serde_json::from_str(json)?;
        Self::new(pairs.into_iter().map(|[lat, lng]| LatLng::new(lat, lng)).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> LatLng {
        self.points[self.index]
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    pub fn is_at_end(&self) -> bool {
        self.index == self.last_index()
    }

    /// Avanza un punto; no pasa del final
    pub fn advance(&mut self) -> bool {
        if self.index < self.last_index() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Retrocede un punto; no pasa del inicio
    pub fn retreat(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// Progreso entero en porcentaje
    pub fn progress_percent(&self) -> u8 {
        if self.points.len() <= 1 {
            return 100;
        }
        (self.index * 100 / self.last_index()) as u8
    }

    fn point(&self, idx: usize) -> Option<LatLng> {
        self.points.get(idx).copied()
    }
}

/// Cambios que el puente aplica en el navegador
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanoramaEvent {
    PositionChanged { position: LatLng, pov: Pov },
    PovChanged { pov: Pov },
    Progress { percent: u8 },
    DestinationReached,
    RouteRequested { origin: LatLng, destination: LatLng },
    RouteReady { waypoints: usize },
}

/// Los seis comandos de navegación que entiende el panorama
pub trait PanoramaSurface {
    fn move_forward(&mut self);
    fn move_backward(&mut self);
    fn look_up(&mut self);
    fn look_down(&mut self);
    fn turn_left(&mut self);
    fn turn_right(&mut self);
}

pub struct StreetPanorama {
    config: PanoramaConfig,
    position: LatLng,
    pov: Pov,
    route: Option<Route>,
    arrived: bool,
    events: Sender<PanoramaEvent>,
}

impl StreetPanorama {
    pub fn new(config: PanoramaConfig, events: Sender<PanoramaEvent>) -> Self {
        Self {
            position: config.start,
            pov: Pov::default(),
            config,
            route: None,
            arrived: false,
            events,
        }
    }

    fn emit(&self, event: PanoramaEvent) {
        // Si el puente no está, el comando simplemente se pierde
        let _ = self.events.send(event);
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn pov(&self) -> Pov {
        self.pov
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn has_active_route(&self) -> bool {
        self.route.is_some()
    }

    /// Coloca el panorama en un punto elegido en el mapa
    pub fn set_position(&mut self, position: LatLng) {
        self.position = position;
        self.emit(PanoramaEvent::PositionChanged {
            position,
            pov: self.pov,
        });
    }

    /// Pide al servicio de mapas una ruta desde el inicio configurado hasta `destination`.
    /// La ruta activa se descarta hasta que llegue la nueva.
    pub fn calculate_route(&mut self, destination: LatLng) {
        self.route = None;
        self.arrived = false;
        let origin = self.config.start;
        info!(?destination, "calculando ruta");
        self.emit(PanoramaEvent::RouteRequested {
            origin,
            destination,
        });
        // La ruta empieza en el origen: el panorama vuelve allí conservando la orientación
        self.set_position(origin);
        self.emit(PanoramaEvent::Progress { percent: 0 });
    }

    /// El servicio de mapas devolvió la ruta; se activa sin moverse todavía
    pub fn route_calculated(&mut self, route_json: &str) -> Result<(), RouteError> {
        let route = Route::from_json(route_json)?;
        info!("Ruta calculada con {} puntos", route.len());
        self.emit(PanoramaEvent::RouteReady {
            waypoints: route.len(),
        });
        self.install_route(route);
        Ok(())
    }

    pub fn install_route(&mut self, route: Route) {
        self.route = Some(route);
        self.arrived = false;
    }

    fn move_to_waypoint(&mut self, towards: Option<LatLng>) {
        let Some(route) = self.route.as_ref() else {
            return;
        };
        let point = route.current();
        if let Some(next) = towards {
            self.pov.heading = compute_heading(point, next);
        }
        self.position = point;
        let percent = route.progress_percent();
        debug!(index = route.index(), last = route.last_index(), "punto de ruta");

        self.emit(PanoramaEvent::Progress { percent });
        self.emit(PanoramaEvent::PositionChanged {
            position: self.position,
            pov: self.pov,
        });
    }

    fn free_roam(&mut self, heading: f64) {
        self.position = compute_offset(self.position, self.config.free_roam_step_m, heading);
        self.emit(PanoramaEvent::PositionChanged {
            position: self.position,
            pov: self.pov,
        });
    }

    fn set_pov(&mut self, pov: Pov) {
        self.pov = pov;
        self.emit(PanoramaEvent::PovChanged { pov });
    }
}

impl PanoramaSurface for StreetPanorama {
    fn move_forward(&mut self) {
        let Some(route) = self.route.as_mut() else {
            let heading = self.pov.heading;
            self.free_roam(heading);
            return;
        };

        if !route.advance() {
            return;
        }
        let next = route.point(route.index() + 1);
        let reached = route.is_at_end();
        self.move_to_waypoint(next);

        if reached && !self.arrived {
            self.arrived = true;
            info!("🎉 Destino alcanzado");
            self.emit(PanoramaEvent::DestinationReached);
        }
    }

    fn move_backward(&mut self) {
        let Some(route) = self.route.as_mut() else {
            let heading = normalize_heading(self.pov.heading + 180.0);
            self.free_roam(heading);
            return;
        };

        if !route.retreat() {
            return;
        }
        let previous = route.index().checked_sub(1).and_then(|i| route.point(i));
        self.arrived = false;
        self.move_to_waypoint(previous);
    }

    fn look_up(&mut self) {
        let pitch = (self.pov.pitch + self.config.look_step_deg).min(MAX_PITCH);
        self.set_pov(Pov { pitch, ..self.pov });
    }

    fn look_down(&mut self) {
        let pitch = (self.pov.pitch - self.config.look_step_deg).max(-MAX_PITCH);
        self.set_pov(Pov { pitch, ..self.pov });
    }

    fn turn_left(&mut self) {
        let heading = normalize_heading(self.pov.heading - self.config.look_step_deg);
        self.set_pov(Pov { heading, ..self.pov });
    }

    fn turn_right(&mut self) {
        let heading = normalize_heading(self.pov.heading + self.config.look_step_deg);
        self.set_pov(Pov { heading, ..self.pov });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};

    fn panorama() -> (StreetPanorama, Receiver<PanoramaEvent>) {
        let (tx, rx) = unbounded();
        (StreetPanorama::new(PanoramaConfig::default(), tx), rx)
    }

    fn drain(rx: &Receiver<PanoramaEvent>) -> Vec<PanoramaEvent> {
        rx.try_iter().collect()
    }

    fn arrivals(events: &[PanoramaEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, PanoramaEvent::DestinationReached))
            .count()
    }

    const ROUTE: &str = "[[40.0, -73.0], [40.001, -73.0], [40.001, -72.999]]";

    #[test]
    fn heading_cardinal_directions() {
        let origin = LatLng::new(0.0, 0.0);
        assert!((compute_heading(origin, LatLng::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((compute_heading(origin, LatLng::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((compute_heading(origin, LatLng::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((compute_heading(origin, LatLng::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn offset_moves_expected_distance() {
        let start = LatLng::new(40.91439, -73.12453);
        let north = compute_offset(start, 10.0, 0.0);
        let metres = (north.lat - start.lat).to_radians() * EARTH_RADIUS_M;
        assert!((metres - 10.0).abs() < 1e-6);
        assert!((north.lng - start.lng).abs() < 1e-12);

        let east = compute_offset(start, 10.0, 90.0);
        assert!(east.lng > start.lng);
        assert!((compute_heading(start, east) - 90.0).abs() < 0.01);
    }

    #[test]
    fn route_clamps_and_reports_progress() {
        let mut route = Route::from_json(ROUTE).unwrap();
        assert!(!route.is_empty());
        assert_eq!(route.len(), 3);
        assert_eq!(route.progress_percent(), 0);
        assert!(!route.retreat());
        assert!(route.advance());
        assert_eq!(route.progress_percent(), 50);
        assert!(route.advance());
        assert!(route.is_at_end());
        assert!(!route.advance());
        assert_eq!(route.progress_percent(), 100);
    }

    #[test]
    fn empty_route_is_rejected() {
        assert!(matches!(Route::from_json("[]"), Err(RouteError::Empty)));
        assert!(matches!(Route::from_json("{}"), Err(RouteError::JsonError(_))));
    }

    #[test]
    fn destination_reached_once() {
        let (mut pano, rx) = panorama();
        pano.route_calculated(ROUTE).unwrap();
        drain(&rx);

        pano.move_forward();
        pano.move_forward();
        let events = drain(&rx);
        assert_eq!(arrivals(&events), 1);
        assert_eq!(pano.position(), LatLng::new(40.001, -72.999));

        // Ya en el final: más FORWARD no avanza ni repite el aviso
        pano.move_forward();
        pano.move_forward();
        assert!(drain(&rx).is_empty());
        assert_eq!(pano.route().map(|r| r.index()), Some(2));
    }

    #[test]
    fn leaving_and_returning_rearms_arrival() {
        let (mut pano, rx) = panorama();
        pano.route_calculated(ROUTE).unwrap();
        pano.move_forward();
        pano.move_forward();
        pano.move_backward();
        pano.move_forward();
        assert_eq!(arrivals(&drain(&rx)), 2);
    }

    #[test]
    fn forward_faces_next_waypoint() {
        let (mut pano, _rx) = panorama();
        pano.route_calculated(ROUTE).unwrap();
        pano.move_forward();
        // Del punto 1 al 2 el rumbo es hacia el este
        assert!((pano.pov().heading - 90.0).abs() < 0.1);
        assert_eq!(pano.route().unwrap().progress_percent(), 50);
    }

    #[test]
    fn backward_at_start_is_noop() {
        let (mut pano, rx) = panorama();
        pano.route_calculated(ROUTE).unwrap();
        drain(&rx);
        pano.move_backward();
        assert!(drain(&rx).is_empty());
        assert_eq!(pano.route().unwrap().index(), 0);
    }

    #[test]
    fn free_roam_without_route() {
        let (mut pano, rx) = panorama();
        let start = pano.position();
        pano.move_forward();
        assert!(pano.position().lat > start.lat);
        pano.move_backward();
        assert!((pano.position().lat - start.lat).abs() < 1e-9);
        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn look_and_turn_limits() {
        let (mut pano, _rx) = panorama();
        for _ in 0..12 {
            pano.look_up();
        }
        assert_eq!(pano.pov().pitch, 90.0);
        for _ in 0..20 {
            pano.look_down();
        }
        assert_eq!(pano.pov().pitch, -90.0);

        pano.turn_left();
        assert_eq!(pano.pov().heading, 350.0);
        pano.turn_right();
        pano.turn_right();
        assert_eq!(pano.pov().heading, 10.0);
    }

    #[test]
    fn calculate_route_clears_active_route() {
        let (mut pano, rx) = panorama();
        pano.route_calculated(ROUTE).unwrap();
        pano.calculate_route(LatLng::new(41.0, -73.0));
        assert!(!pano.has_active_route());
        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PanoramaEvent::RouteRequested { .. })));
    }

    #[test]
    fn calculate_route_returns_to_start_keeping_pov() {
        let (mut pano, rx) = panorama();
        let start = PanoramaConfig::default().start;
        pano.set_position(LatLng::new(41.5, -72.5));
        pano.turn_right();
        drain(&rx);

        pano.calculate_route(LatLng::new(41.0, -73.0));

        assert_eq!(pano.position(), start);
        assert_eq!(pano.pov().heading, 10.0);
        let events = drain(&rx);
        assert!(events.contains(&PanoramaEvent::PositionChanged {
            position: start,
            pov: pano.pov(),
        }));
        assert_eq!(events.last(), Some(&PanoramaEvent::Progress { percent: 0 }));
    }

    #[test]
    fn missing_bridge_is_not_fatal() {
        let (tx, rx) = unbounded();
        drop(rx);
        let mut pano = StreetPanorama::new(PanoramaConfig::default(), tx);
        pano.turn_right();
        pano.move_forward();
        assert_eq!(pano.pov().heading, 10.0);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_string(&PanoramaEvent::Progress { percent: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"progress","percent":42}"#);
    }
}
