use serde::{Deserialize, Serialize};
use uom::si::f64::Length;
use uom::si::length::{centimeter, foot, inch, kilometer, meter, mile, millimeter, yard};

use crate::error::TickError;

/// Length unit in which tick mark spacing is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    Millimeter,
    Centimeter,
    Meter,
    Kilometer,
    Inch,
    Foot,
    Yard,
    Mile,
}

impl LengthUnit {
    /// A length of `value` in this unit.
    pub fn length(self, value: f64) -> Length {
        match self {
            LengthUnit::Millimeter => Length::new::<millimeter>(value),
            LengthUnit::Centimeter => Length::new::<centimeter>(value),
            LengthUnit::Meter => Length::new::<meter>(value),
            LengthUnit::Kilometer => Length::new::<kilometer>(value),
            LengthUnit::Inch => Length::new::<inch>(value),
            LengthUnit::Foot => Length::new::<foot>(value),
            LengthUnit::Yard => Length::new::<yard>(value),
            LengthUnit::Mile => Length::new::<mile>(value),
        }
    }

    /// Convert `value` in this unit to meters.
    pub fn to_meters(self, value: f64) -> f64 {
        self.length(value).get::<meter>()
    }

    /// Abbreviation, as accepted by [`str::parse`].
    pub fn abbreviation(self) -> &'static str {
        match self {
            LengthUnit::Millimeter => "mm",
            LengthUnit::Centimeter => "cm",
            LengthUnit::Meter => "m",
            LengthUnit::Kilometer => "km",
            LengthUnit::Inch => "in",
            LengthUnit::Foot => "ft",
            LengthUnit::Yard => "yd",
            LengthUnit::Mile => "mi",
        }
    }
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => {
                Ok(LengthUnit::Millimeter)
            }
            "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => {
                Ok(LengthUnit::Centimeter)
            }
            "m" | "meter" | "meters" | "metre" | "metres" => Ok(LengthUnit::Meter),
            "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => {
                Ok(LengthUnit::Kilometer)
            }
            "in" | "inch" | "inches" => Ok(LengthUnit::Inch),
            "ft" | "foot" | "feet" => Ok(LengthUnit::Foot),
            "yd" | "yard" | "yards" => Ok(LengthUnit::Yard),
            "mi" | "mile" | "miles" => Ok(LengthUnit::Mile),
            _ => Err(TickError::UnknownUnit {
                unit: s.to_string(),
            }),
        }
    }
}
