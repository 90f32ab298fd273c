//! Demonstration harness: an oscillator next to a discrete counter.

use fdm_system::Component;

use crate::counter::Counter;
use crate::oscillator::Oscillator;

/// Two independent leaves under one root: `osc` carries all continuous
/// state, `counter` only discrete state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Harness {
    pub osc: Oscillator,
    pub counter: Counter,
}

impl Component for Harness {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        vec![("osc", &self.osc), ("counter", &self.counter)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_system::System;

    #[test]
    fn state_belongs_to_oscillator_only() {
        let sys = System::new(Harness::default()).unwrap();
        assert_eq!(sys.x(), &[1.0, 0.0]);
        assert_eq!(sys.x_at("osc").unwrap(), &[1.0, 0.0]);
        assert!(sys.x_at("counter").is_none());
        let y_names: Vec<&str> = sys.y().unwrap().as_record().unwrap().names().collect();
        assert_eq!(y_names, vec!["osc", "counter"]);
        let s_names: Vec<&str> = sys.s().unwrap().as_record().unwrap().names().collect();
        assert_eq!(s_names, vec!["counter"]);
    }
}
