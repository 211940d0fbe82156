use serde::{Deserialize, Serialize};

/// Side of a network object (or end of a segment).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Upstream side.
    #[default]
    In,
    /// Downstream side.
    Out,
}

impl Side {
    /// Both sides, `in` first.
    pub const BOTH: [Side; 2] = [Side::In, Side::Out];

    /// The opposite side.
    #[inline]
    pub fn other(self) -> Side {
        match self {
            Side::In => Side::Out,
            Side::Out => Side::In,
        }
    }

    /// Lowercase name, as used in field names.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::In => "in",
            Side::Out => "out",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" => Ok(Side::In),
            "out" => Ok(Side::Out),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_other() {
        assert_eq!(Side::In.other(), Side::Out);
        assert_eq!(Side::Out.other().other(), Side::Out);
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("in".parse::<Side>(), Ok(Side::In));
        assert_eq!("OUT".parse::<Side>(), Ok(Side::Out));
        assert!("int".parse::<Side>().is_err());
    }

    #[test]
    fn test_side_serde() {
        assert_eq!(serde_json::to_string(&Side::Out).unwrap(), "\"out\"");
        let side: Side = serde_json::from_str("\"in\"").unwrap();
        assert_eq!(side, Side::In);
    }
}
