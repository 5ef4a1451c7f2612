use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DebounceConfig;
use crate::types::GestureSymbol;

/// Primera capa: confirma un gesto cuando se repite en `threshold` frames seguidos.
///
/// Al confirmar, el contador vuelve a 0 y se conserva el último gesto visto,
/// de modo que si el gesto sigue presente hay que acumular de nuevo la cuenta completa.
/// Un frame sin gesto (NONE) corta la racha.
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    threshold: u32,
    previous: Option<GestureSymbol>,
    count: u32,
}

impl GestureDebouncer {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            previous: None,
            count: 0,
        }
    }

    /// Procesa la salida del clasificador para un frame.
    /// Devuelve el gesto confirmado, si lo hay.
    pub fn observe(&mut self, symbol: GestureSymbol) -> Option<GestureSymbol> {
        if symbol.is_none() {
            self.count = 0;
            return None;
        }

        if self.previous == Some(symbol) {
            self.count += 1;
        } else {
            self.count = 1;
            self.previous = Some(symbol);
        }

        if self.count >= self.threshold {
            self.count = 0;
            Some(symbol)
        } else {
            None
        }
    }

    pub fn previous(&self) -> Option<GestureSymbol> {
        self.previous
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Segunda capa: limita la frecuencia con la que se ejecutan gestos confirmados
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown: Duration,
    last_admitted: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_admitted: None,
        }
    }

    /// Deja pasar si ha transcurrido al menos `cooldown` desde el último admitido
    pub fn admit_at(&mut self, now: Instant) -> bool {
        let ready = match self.last_admitted {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        };
        if ready {
            self.last_admitted = Some(now);
        }
        ready
    }
}

/// Ambas capas encadenadas: cuenta de frames y después enfriamiento
#[derive(Debug, Clone)]
pub struct GestureGate {
    debouncer: GestureDebouncer,
    cooldown: CooldownGate,
}

impl GestureGate {
    pub fn new(config: &DebounceConfig) -> Self {
        Self {
            debouncer: GestureDebouncer::new(config.gesture_threshold),
            cooldown: CooldownGate::new(config.cooldown()),
        }
    }

    pub fn process_at(&mut self, symbol: GestureSymbol, now: Instant) -> Option<GestureSymbol> {
        let confirmed = self.debouncer.observe(symbol)?;
        if self.cooldown.admit_at(now) {
            Some(confirmed)
        } else {
            debug!(gesture = %confirmed, "gesto confirmado descartado por enfriamiento");
            None
        }
    }

    pub fn debouncer(&self) -> &GestureDebouncer {
        &self.debouncer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GestureSymbol::{Backward, Down, Forward, Left, Right, Up};

    const NO_GESTURE: GestureSymbol = GestureSymbol::None;

    fn feed(debouncer: &mut GestureDebouncer, symbols: &[GestureSymbol]) -> Vec<Option<GestureSymbol>> {
        symbols.iter().map(|s| debouncer.observe(*s)).collect()
    }

    #[test]
    fn held_gesture_emits_once_per_streak() {
        let mut d = GestureDebouncer::new(2);
        assert_eq!(feed(&mut d, &[Up, Up, Up]), vec![None, Some(Up), None]);
        assert_eq!(d.count(), 1);
        assert_eq!(d.previous(), Some(Up));
    }

    #[test]
    fn leading_none_does_not_count() {
        let mut d = GestureDebouncer::new(2);
        assert_eq!(
            feed(&mut d, &[NO_GESTURE, Forward, Forward]),
            vec![None, None, Some(Forward)]
        );
    }

    #[test]
    fn change_resets_streak() {
        let mut d = GestureDebouncer::new(3);
        assert_eq!(feed(&mut d, &[Left, Left, Right]), vec![None, None, None]);
        assert_eq!(d.count(), 1);
        assert_eq!(d.previous(), Some(Right));
    }

    #[test]
    fn none_removes_partial_credit() {
        let mut d = GestureDebouncer::new(2);
        assert_eq!(feed(&mut d, &[Down, Down, NO_GESTURE]), vec![None, Some(Down), None]);
        // Tras NONE hay que volver a juntar la cuenta completa
        assert_eq!(feed(&mut d, &[Down]), vec![None]);
        assert_eq!(feed(&mut d, &[Down]), vec![Some(Down)]);

        let mut d = GestureDebouncer::new(3);
        assert_eq!(feed(&mut d, &[Left, Left, NO_GESTURE, Left, Left]), vec![None; 5]);
        assert_eq!(d.count(), 2);
    }

    #[test]
    fn held_gesture_interrupted_by_no_gesture() {
        let mut d = GestureDebouncer::new(2);
        assert_eq!(
            feed(&mut d, &[Up, Up, Up, NO_GESTURE, Up, Up]),
            vec![None, Some(Up), None, None, None, Some(Up)]
        );
    }

    #[test]
    fn none_keeps_previous_symbol() {
        let mut d = GestureDebouncer::new(2);
        d.observe(Backward);
        d.observe(NO_GESTURE);
        assert_eq!(d.previous(), Some(Backward));
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn count_never_exceeds_threshold() {
        let mut d = GestureDebouncer::new(4);
        for _ in 0..20 {
            d.observe(Right);
            assert!(d.count() < d.threshold());
        }
    }

    #[test]
    fn threshold_of_one_emits_every_frame() {
        let mut d = GestureDebouncer::new(1);
        assert_eq!(feed(&mut d, &[Up, Up, NO_GESTURE, Left]), vec![Some(Up), Some(Up), None, Some(Left)]);
    }

    #[test]
    fn cooldown_gate_spacing() {
        let start = Instant::now();
        let mut gate = CooldownGate::new(Duration::from_millis(500));
        assert!(gate.admit_at(start));
        assert!(!gate.admit_at(start + Duration::from_millis(200)));
        assert!(!gate.admit_at(start + Duration::from_millis(499)));
        assert!(gate.admit_at(start + Duration::from_millis(500)));
        assert!(!gate.admit_at(start + Duration::from_millis(900)));
    }

    #[test]
    fn gate_applies_both_layers() {
        let start = Instant::now();
        let mut gate = GestureGate::new(&DebounceConfig {
            gesture_threshold: 2,
            cooldown_ms: 500,
        });
        let ms = |n: u64| start + Duration::from_millis(n);

        assert_eq!(gate.process_at(Forward, ms(0)), None);
        assert_eq!(gate.process_at(Forward, ms(30)), Some(Forward));
        // Confirmado de nuevo pero dentro del enfriamiento
        assert_eq!(gate.process_at(Forward, ms(60)), None);
        assert_eq!(gate.process_at(Forward, ms(90)), None);
        assert_eq!(gate.process_at(Forward, ms(520)), None);
        assert_eq!(gate.process_at(Forward, ms(550)), Some(Forward));
    }
}
