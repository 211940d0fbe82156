use serde::Serialize;

use crate::config::EquipFunction;
use crate::model::Side;
use crate::pins::PinRange;

/// How signal entering an equipment pin reaches its out pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// Every input is combined onto out pin 1.
    Combine,
    /// One input feeds every dedicated out pin.
    Broadcast,
    /// Input pin `n` feeds out pin `n`.
    PassThrough,
    /// Signal stops here.
    Terminal,
}

impl FanOut {
    /// Policy for an equipment function (unknown functions are terminal).
    pub fn for_function(function: Option<EquipFunction>) -> Self {
        match function {
            Some(EquipFunction::Mux) => FanOut::Combine,
            Some(EquipFunction::Splitter) => FanOut::Broadcast,
            Some(EquipFunction::Connector) => FanOut::PassThrough,
            Some(EquipFunction::Slack) | None => FanOut::Terminal,
        }
    }

    /// Out pins reached from `in_pin`.
    ///
    /// `out_ports` is the number of dedicated out ports, used by
    /// [`FanOut::Broadcast`]. Returns `None` when the signal stops.
    pub fn out_pins(self, in_pin: u32, out_ports: Option<u32>) -> Option<PinRange> {
        match self {
            FanOut::Combine => Some(PinRange::single(Side::Out, 1)),
            FanOut::Broadcast => out_ports.map(|n| PinRange::new(Side::Out, 1, n)),
            FanOut::PassThrough => Some(PinRange::single(Side::Out, in_pin)),
            FanOut::Terminal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        assert_eq!(
            FanOut::for_function(Some(EquipFunction::Mux)).out_pins(7, Some(4)),
            Some(PinRange::single(Side::Out, 1))
        );
        assert_eq!(
            FanOut::for_function(Some(EquipFunction::Splitter)).out_pins(1, Some(8)),
            Some(PinRange::new(Side::Out, 1, 8))
        );
        assert_eq!(
            FanOut::for_function(Some(EquipFunction::Connector)).out_pins(5, None),
            Some(PinRange::single(Side::Out, 5))
        );
        assert_eq!(FanOut::for_function(None).out_pins(1, Some(8)), None);
        assert_eq!(
            FanOut::for_function(Some(EquipFunction::Slack)).out_pins(1, Some(8)),
            None
        );
    }

    #[test]
    fn test_splitter_without_out_ports_is_terminal() {
        assert_eq!(FanOut::Broadcast.out_pins(1, None), None);
    }
}
