use serde::Deserialize;

/// Current state of a virtual server or service as reported by Nitro.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum CurState {
    Down,
    Up,
    OutOfService,
    Other(String),
}

impl From<String> for CurState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DOWN" => Self::Down,
            "UP" => Self::Up,
            "OUT OF SERVICE" => Self::OutOfService,
            _ => Self::Other(value),
        }
    }
}

impl CurState {
    /// Numeric mapping used for the state gauges.
    pub fn value(&self) -> f64 {
        match self {
            Self::Down => 0.0,
            Self::Up => 1.0,
            Self::OutOfService => 2.0,
            Self::Other(_) => 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values_are_stable() {
        let cases = [
            ("DOWN", 0.0),
            ("UP", 1.0),
            ("OUT OF SERVICE", 2.0),
            ("TROFS", 3.0),
            ("", 3.0),
        ];
        for _ in 0..3 {
            for (raw, expected) in cases {
                assert_eq!(CurState::from(raw.to_string()).value(), expected, "state {raw:?}");
            }
        }
    }

    #[test]
    fn deserializes_from_json_string() {
        let state: CurState = serde_json::from_str(r#""OUT OF SERVICE""#).unwrap();
        assert_eq!(state, CurState::OutOfService);
        let state: CurState = serde_json::from_str(r#""PARTIAL-UP""#).unwrap();
        assert_eq!(state, CurState::Other("PARTIAL-UP".to_string()));
    }
}
