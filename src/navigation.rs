use tracing::{debug, info};

use crate::panorama::PanoramaSurface;
use crate::types::GestureSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAction {
    MoveForward,
    MoveBackward,
    LookUp,
    LookDown,
    TurnLeft,
    TurnRight,
}

impl NavigationAction {
    /// Conversión gesto → acción. NONE no tiene acción.
    pub fn from_symbol(symbol: GestureSymbol) -> Option<Self> {
        use NavigationAction::*;

        match symbol {
            GestureSymbol::Forward => Some(MoveForward),
            GestureSymbol::Backward => Some(MoveBackward),
            GestureSymbol::Up => Some(LookUp),
            GestureSymbol::Down => Some(LookDown),
            GestureSymbol::Left => Some(TurnLeft),
            GestureSymbol::Right => Some(TurnRight),
            GestureSymbol::None => None,
        }
    }

    pub fn apply<P: PanoramaSurface + ?Sized>(self, surface: &mut P) {
        match self {
            NavigationAction::MoveForward => surface.move_forward(),
            NavigationAction::MoveBackward => surface.move_backward(),
            NavigationAction::LookUp => surface.look_up(),
            NavigationAction::LookDown => surface.look_down(),
            NavigationAction::TurnLeft => surface.turn_left(),
            NavigationAction::TurnRight => surface.turn_right(),
        }
    }
}

/// Envía los gestos confirmados al panorama.
/// Si todavía no hay panorama disponible el gesto se ignora.
pub struct NavigationDispatcher<P> {
    surface: Option<P>,
    last_gesture: Option<GestureSymbol>,
}

impl<P: PanoramaSurface> NavigationDispatcher<P> {
    pub fn new(surface: P) -> Self {
        Self {
            surface: Some(surface),
            last_gesture: None,
        }
    }

    pub fn detached() -> Self {
        Self {
            surface: None,
            last_gesture: None,
        }
    }

    pub fn attach(&mut self, surface: P) {
        self.surface = Some(surface);
    }

    /// Devuelve la acción ejecutada, si hubo alguna
    pub fn dispatch(&mut self, symbol: GestureSymbol) -> Option<NavigationAction> {
        let action = NavigationAction::from_symbol(symbol)?;
        self.last_gesture = Some(symbol);
        info!("Gesto detectado: {}", symbol);

        match self.surface.as_mut() {
            Some(surface) => {
                action.apply(surface);
                Some(action)
            }
            None => {
                debug!(?action, "panorama no disponible, gesto ignorado");
                None
            }
        }
    }

    /// Último gesto recibido (para la etiqueta "Gesto actual")
    pub fn last_gesture(&self) -> Option<GestureSymbol> {
        self.last_gesture
    }

    pub fn surface(&self) -> Option<&P> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut P> {
        self.surface.as_mut()
    }
}
