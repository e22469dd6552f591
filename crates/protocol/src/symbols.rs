use serde::{Deserialize, Serialize};

use crate::snapshot::{Lane, LaneState};

/// Display symbols for lane cells, resolved by every renderer.
///
/// `None` leaves the cell blank; the state is still conveyed by styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSymbols {
    pub active: Option<char>,
    pub inactive: Option<char>,
    pub hit: Option<char>,
}

impl LaneSymbols {
    pub fn for_state(&self, state: LaneState) -> Option<char> {
        match state {
            LaneState::Active => self.active,
            LaneState::Inactive => self.inactive,
            LaneState::Hit => self.hit,
        }
    }

    /// Symbol for a lane, honouring its per-lane override.
    pub fn for_lane(&self, lane: &Lane) -> Option<char> {
        lane.custom_symbol.or_else(|| self.for_state(lane.state))
    }
}

impl Default for LaneSymbols {
    fn default() -> Self {
        Self {
            active: Some('●'),
            inactive: Some('○'),
            hit: Some('◆'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_symbol_overrides_state() {
        let symbols = LaneSymbols::default();
        let mut lane = Lane::new(0, LaneState::Hit);
        assert_eq!(symbols.for_lane(&lane), Some('◆'));
        lane.custom_symbol = Some('x');
        assert_eq!(symbols.for_lane(&lane), Some('x'));
    }
}
