use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 目标宽高比
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AspectRatio {
    #[default]
    Portrait9x16,
    Portrait3x4,
    Square,
    Portrait4x5,
    Landscape16x9,
    Landscape4x3,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 6] = [
        AspectRatio::Portrait9x16,
        AspectRatio::Portrait3x4,
        AspectRatio::Square,
        AspectRatio::Portrait4x5,
        AspectRatio::Landscape16x9,
        AspectRatio::Landscape4x3,
    ];

    pub fn parts(&self) -> (u32, u32) {
        match self {
            AspectRatio::Portrait9x16 => (9, 16),
            AspectRatio::Portrait3x4 => (3, 4),
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait4x5 => (4, 5),
            AspectRatio::Landscape16x9 => (16, 9),
            AspectRatio::Landscape4x3 => (4, 3),
        }
    }

    /// width / height
    pub fn ratio(&self) -> f64 {
        let (w, h) = self.parts();
        w as f64 / h as f64
    }

    /// `9x16`, used in output directory names.
    pub fn dir_label(&self) -> String {
        let (w, h) = self.parts();
        format!("{}x{}", w, h)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.parts();
        write!(f, "{}:{}", w, h)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    /// Accepts `9:16` or `9x16`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('x', ":");
        AspectRatio::ALL
            .into_iter()
            .find(|a| a.to_string() == normalized)
            .ok_or_else(|| {
                let supported: Vec<String> =
                    AspectRatio::ALL.iter().map(|a| a.to_string()).collect();
                format!(
                    "unsupported aspect ratio `{}` (supported: {})",
                    s,
                    supported.join(", ")
                )
            })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("9:16".parse::<AspectRatio>(), Ok(AspectRatio::Portrait9x16));
        assert_eq!("16x9".parse::<AspectRatio>(), Ok(AspectRatio::Landscape16x9));
        assert_eq!(" 1:1 ".parse::<AspectRatio>(), Ok(AspectRatio::Square));
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(AspectRatio::Portrait4x5.to_string(), "4:5");
        assert_eq!(AspectRatio::Portrait4x5.dir_label(), "4x5");
        assert!((AspectRatio::Portrait9x16.ratio() - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&AspectRatio::Portrait3x4).unwrap();
        assert_eq!(json, "\"3:4\"");
        let back: AspectRatio = serde_json::from_str("\"4:3\"").unwrap();
        assert_eq!(back, AspectRatio::Landscape4x3);
        assert!(serde_json::from_str::<AspectRatio>("\"5:7\"").is_err());
    }
}
