use crate::config::ClassifierConfig;
use crate::types::{landmarks, GestureSymbol, Landmark, LandmarkSet};

/// Estado de cada dedo en un frame (útil para depurar y dibujar el overlay)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerState {
    pub thumb_open: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    /// Calcula qué dedos están extendidos.
    /// Un dedo está extendido si la punta queda por encima (y menor) de su base
    /// en más de `threshold * finger_factor`. El pulgar se compara con la muñeca
    /// usando el umbral completo.
    pub fn from_landmarks(hand: &LandmarkSet, config: &ClassifierConfig) -> Self {
        let wrist = hand.wrist();
        let thumb_tip = hand.get(landmarks::THUMB_TIP);
        let finger = config.finger_threshold();

        let extended = |tip: usize, base: usize| -> bool {
            hand.get(tip).y < hand.get(base).y - finger
        };

        Self {
            thumb_open: thumb_tip.y < wrist.y - config.threshold,
            index: extended(landmarks::INDEX_FINGER_TIP, landmarks::INDEX_FINGER_MCP),
            middle: extended(landmarks::MIDDLE_FINGER_TIP, landmarks::MIDDLE_FINGER_MCP),
            ring: extended(landmarks::RING_FINGER_TIP, landmarks::RING_FINGER_MCP),
            pinky: extended(landmarks::PINKY_TIP, landmarks::PINKY_MCP),
        }
    }

    pub fn any_finger(&self) -> bool {
        self.index || self.middle || self.ring || self.pinky
    }
}

/// Clasifica una mano con el umbral dado y el factor de dedos por defecto (0.8)
pub fn classify(hand: &LandmarkSet, threshold: f32) -> GestureSymbol {
    classify_with(
        hand,
        &ClassifierConfig {
            threshold,
            ..ClassifierConfig::default()
        },
    )
}

/// Reglas evaluadas en orden fijo; gana la primera que se cumple.
/// FORWARD y BACKWARD se evalúan antes que las direcciones del pulgar.
pub fn classify_with(hand: &LandmarkSet, config: &ClassifierConfig) -> GestureSymbol {
    let t = config.threshold;
    let finger = config.finger_threshold();

    let wrist = hand.wrist();
    let thumb_tip = hand.get(landmarks::THUMB_TIP);
    let index_tip = hand.get(landmarks::INDEX_FINGER_TIP);
    let index_base = hand.get(landmarks::INDEX_FINGER_MCP);
    let middle_tip = hand.get(landmarks::MIDDLE_FINGER_TIP);
    let middle_base = hand.get(landmarks::MIDDLE_FINGER_MCP);

    let fingers = FingerState::from_landmarks(hand, config);

    // FORWARD: índice y medio arriba, anular y meñique cerrados (signo de paz)
    if fingers.index
        && fingers.middle
        && !fingers.ring
        && !fingers.pinky
        && index_tip.y < wrist.y - finger
    {
        return GestureSymbol::Forward;
    }

    // BACKWARD: índice y medio apuntando hacia abajo, juntos
    if points_down(index_tip, index_base, finger)
        && points_down(middle_tip, middle_base, finger)
        && !fingers.ring
        && !fingers.pinky
        && (index_tip.y - middle_tip.y).abs() < t
    {
        return GestureSymbol::Backward;
    }

    if fingers.any_finger() {
        return GestureSymbol::None;
    }

    // Direcciones con el pulgar respecto a la muñeca
    if thumb_tip.y < wrist.y - t {
        GestureSymbol::Up
    } else if thumb_tip.y > wrist.y + t {
        GestureSymbol::Down
    } else if thumb_tip.x < wrist.x - t {
        GestureSymbol::Left
    } else if thumb_tip.x > wrist.x + t {
        GestureSymbol::Right
    } else {
        GestureSymbol::None
    }
}

fn points_down(tip: Landmark, base: Landmark, margin: f32) -> bool {
    tip.y > base.y + margin
}

/// Clasificador con la configuración fija del proceso
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    config: ClassifierConfig,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Sin mano en el frame no se clasifica nada
    pub fn classify_frame(&self, hand: Option<&LandmarkSet>) -> GestureSymbol {
        match hand {
            Some(hand) => classify_with(hand, &self.config),
            None => GestureSymbol::None,
        }
    }

    pub fn finger_state(&self, hand: &LandmarkSet) -> FingerState {
        FingerState::from_landmarks(hand, &self.config)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::NUM_LANDMARKS;

    /// Mano neutra: todos los puntos en la muñeca, salvo los indicados
    pub fn hand(wrist: (f32, f32), points: &[(usize, f32, f32)]) -> LandmarkSet {
        let mut all = [Landmark::new(wrist.0, wrist.1, 0.0); NUM_LANDMARKS];
        for &(idx, x, y) in points {
            all[idx] = Landmark::new(x, y, 0.0);
        }
        LandmarkSet::new(all)
    }

    pub fn translate(hand: &LandmarkSet, dx: f32, dy: f32) -> LandmarkSet {
        let mut points = *hand.points();
        for p in points.iter_mut() {
            p.x += dx;
            p.y += dy;
        }
        LandmarkSet::new(points)
    }

    /// Dedos índice y medio hacia arriba, anular y meñique doblados
    pub fn two_fingers_up() -> LandmarkSet {
        hand(
            (0.5, 0.8),
            &[
                (landmarks::THUMB_TIP, 0.4, 0.72),
                (landmarks::INDEX_FINGER_MCP, 0.45, 0.6),
                (landmarks::INDEX_FINGER_TIP, 0.45, 0.35),
                (landmarks::MIDDLE_FINGER_MCP, 0.5, 0.6),
                (landmarks::MIDDLE_FINGER_TIP, 0.5, 0.33),
                (landmarks::RING_FINGER_MCP, 0.55, 0.62),
                (landmarks::RING_FINGER_TIP, 0.55, 0.65),
                (landmarks::PINKY_MCP, 0.6, 0.65),
                (landmarks::PINKY_TIP, 0.6, 0.68),
            ],
        )
    }

    /// Mano invertida con índice y medio apuntando hacia abajo
    pub fn two_fingers_down(thumb: (f32, f32)) -> LandmarkSet {
        hand(
            (0.5, 0.3),
            &[
                (landmarks::THUMB_TIP, thumb.0, thumb.1),
                (landmarks::INDEX_FINGER_MCP, 0.45, 0.5),
                (landmarks::INDEX_FINGER_TIP, 0.45, 0.75),
                (landmarks::MIDDLE_FINGER_MCP, 0.5, 0.5),
                (landmarks::MIDDLE_FINGER_TIP, 0.5, 0.78),
                (landmarks::RING_FINGER_MCP, 0.55, 0.5),
                (landmarks::RING_FINGER_TIP, 0.55, 0.52),
                (landmarks::PINKY_MCP, 0.6, 0.5),
                (landmarks::PINKY_TIP, 0.6, 0.5),
            ],
        )
    }

    /// Puño cerrado con el pulgar en la posición dada
    pub fn fist_with_thumb(wrist: (f32, f32), thumb: (f32, f32)) -> LandmarkSet {
        let (wx, wy) = wrist;
        hand(
            wrist,
            &[
                (landmarks::THUMB_TIP, thumb.0, thumb.1),
                (landmarks::INDEX_FINGER_MCP, wx + 0.05, wy - 0.1),
                (landmarks::INDEX_FINGER_TIP, wx + 0.06, wy - 0.08),
                (landmarks::MIDDLE_FINGER_MCP, wx + 0.07, wy - 0.1),
                (landmarks::MIDDLE_FINGER_TIP, wx + 0.08, wy - 0.08),
                (landmarks::RING_FINGER_MCP, wx + 0.09, wy - 0.1),
                (landmarks::RING_FINGER_TIP, wx + 0.1, wy - 0.08),
                (landmarks::PINKY_MCP, wx + 0.11, wy - 0.1),
                (landmarks::PINKY_TIP, wx + 0.12, wy - 0.08),
            ],
        )
    }
}
