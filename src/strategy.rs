//! Execution strategies as 3-bit component combinations.
//!
//! A strategy selects which of three independent optimizer components are
//! active for one query: cardinality estimation (CE, bit 0), the cost model
//! (CM, bit 1) and join enumeration (JN, bit 2). All eight combinations are
//! legal; the all-zero strategy is the engine baseline.

use std::fmt;

/// One of the three independently toggleable optimizer components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Learned cardinality estimation
    CardinalityEstimation,
    /// Alternative cost model
    CostModel,
    /// Exhaustive join enumeration
    JoinEnumeration,
}

impl Component {
    /// All components, in bit order.
    pub const ALL: [Component; 3] = [
        Component::CardinalityEstimation,
        Component::CostModel,
        Component::JoinEnumeration,
    ];

    /// The bit this component occupies in a strategy id.
    pub fn bit(self) -> u8 {
        match self {
            Component::CardinalityEstimation => 0b001,
            Component::CostModel => 0b010,
            Component::JoinEnumeration => 0b100,
        }
    }

    /// Short symbolic name, as used in persisted labels.
    pub fn short_name(self) -> &'static str {
        match self {
            Component::CardinalityEstimation => "CE",
            Component::CostModel => "CM",
            Component::JoinEnumeration => "JN",
        }
    }
}

/// A 3-bit execution strategy id.
///
/// Wraps the raw combination bits; construction masks to the low three bits
/// so every `Strategy` value is one of the eight legal combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Strategy(u8);

/// Number of distinct strategies.
pub const STRATEGY_COUNT: usize = 8;

impl Strategy {
    /// The degenerate baseline strategy: every component off.
    pub const BASELINE: Strategy = Strategy(0);

    /// Build a strategy from raw combination bits (masked to 3 bits).
    pub fn from_bits(bits: u8) -> Self {
        Strategy(bits & 0b111)
    }

    /// Build a strategy from individual component switches.
    pub fn from_components(ce: bool, cm: bool, jn: bool) -> Self {
        let mut bits = 0u8;
        if ce {
            bits |= Component::CardinalityEstimation.bit();
        }
        if cm {
            bits |= Component::CostModel.bit();
        }
        if jn {
            bits |= Component::JoinEnumeration.bit();
        }
        Strategy(bits)
    }

    /// Raw combination bits in `0..8`.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether this strategy enables the given component.
    pub fn enables(self, component: Component) -> bool {
        self.0 & component.bit() != 0
    }

    /// Iterate every legal strategy, in id order.
    pub fn all() -> impl Iterator<Item = Strategy> {
        (0u8..STRATEGY_COUNT as u8).map(Strategy)
    }

    /// The symbolic label used by the legacy persisted format.
    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "NONE",
            1 => "CE",
            2 => "CM",
            3 => "CE+CM",
            4 => "JN",
            5 => "CE+JN",
            6 => "CM+JN",
            _ => "ALL",
        }
    }

    /// Parse a symbolic label from the fixed legacy vocabulary.
    ///
    /// Accepts the aliases the legacy files used (`BASELINE` for the empty
    /// combination, `CE+CM+JN` for `ALL`); case-insensitive.
    pub fn from_label(label: &str) -> Option<Strategy> {
        let trimmed = label.trim();
        let bits = if trimmed.eq_ignore_ascii_case("NONE")
            || trimmed.eq_ignore_ascii_case("BASELINE")
        {
            0
        } else if trimmed.eq_ignore_ascii_case("CE") {
            1
        } else if trimmed.eq_ignore_ascii_case("CM") {
            2
        } else if trimmed.eq_ignore_ascii_case("CE+CM") {
            3
        } else if trimmed.eq_ignore_ascii_case("JN") {
            4
        } else if trimmed.eq_ignore_ascii_case("CE+JN") {
            5
        } else if trimmed.eq_ignore_ascii_case("CM+JN") {
            6
        } else if trimmed.eq_ignore_ascii_case("ALL") || trimmed.eq_ignore_ascii_case("CE+CM+JN") {
            7
        } else {
            return None;
        };
        Some(Strategy(bits))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits_masks_high_bits() {
        assert_eq!(Strategy::from_bits(0b1111).bits(), 0b111);
        assert_eq!(Strategy::from_bits(8).bits(), 0);
    }

    #[test]
    fn test_component_switches() {
        let s = Strategy::from_components(true, false, true);
        assert!(s.enables(Component::CardinalityEstimation));
        assert!(!s.enables(Component::CostModel));
        assert!(s.enables(Component::JoinEnumeration));
        assert_eq!(s.bits(), 5);
    }

    #[test]
    fn test_label_round_trip() {
        for s in Strategy::all() {
            assert_eq!(Strategy::from_label(s.label()), Some(s));
        }
    }

    #[test]
    fn test_label_aliases() {
        assert_eq!(Strategy::from_label("baseline"), Some(Strategy::BASELINE));
        assert_eq!(Strategy::from_label("CE+CM+JN"), Some(Strategy::from_bits(7)));
        assert_eq!(Strategy::from_label(" jn "), Some(Strategy::from_bits(4)));
        assert_eq!(Strategy::from_label("bogus"), None);
    }

    #[test]
    fn test_all_covers_eight() {
        assert_eq!(Strategy::all().count(), STRATEGY_COUNT);
    }
}
