use crate::Chips;
use serde::Deserialize;
use serde::Serialize;

/// a player's move. raise amounts are the chips added to the pot by
/// this action, never the resulting street-bet level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Action {
    Fold,
    Check,
    Call(Chips),
    Raise(Chips),
}

impl Action {
    pub fn is_raise(&self) -> bool {
        matches!(self, Self::Raise(_))
    }
    pub fn chips(&self) -> Chips {
        match self {
            Self::Fold | Self::Check => 0.0,
            Self::Call(chips) | Self::Raise(chips) => *chips,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Fold => write!(f, "fold"),
            Self::Check => write!(f, "check"),
            Self::Call(chips) => write!(f, "call {}", chips),
            Self::Raise(chips) => write!(f, "raise {}", chips),
        }
    }
}

impl TryFrom<&str> for Action {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let mut words = s.split_whitespace();
        match (words.next(), words.next()) {
            (Some("fold"), None) => Ok(Self::Fold),
            (Some("check"), None) => Ok(Self::Check),
            (Some("call"), Some(chips)) => chips
                .parse()
                .map(Self::Call)
                .map_err(|_| format!("bad amount: {}", chips)),
            (Some("raise"), Some(chips)) => chips
                .parse()
                .map(Self::Raise)
                .map_err(|_| format!("bad amount: {}", chips)),
            _ => Err(format!("unparseable action: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for action in [
            Action::Fold,
            Action::Check,
            Action::Call(2.5),
            Action::Raise(10.0),
        ] {
            let parsed = Action::try_from(action.to_string().as_str()).unwrap();
            assert!(parsed == action);
        }
    }
    #[test]
    fn parse_rejects_garbage() {
        assert!(Action::try_from("limp").is_err());
        assert!(Action::try_from("call").is_err());
        assert!(Action::try_from("raise much").is_err());
    }
    #[test]
    fn wire_shape() {
        let json = serde_json::to_string(&Action::Raise(3.0)).unwrap();
        assert!(json.contains("raise"));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert!(back == Action::Raise(3.0));
    }
}
