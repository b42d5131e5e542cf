use crate::Chips;
use serde::Deserialize;
use serde::Serialize;

/// static table parameters shared by every state of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub num_players: usize,
    pub stack_size: Chips,
    pub small_blind: Chips,
    pub big_blind: Chips,
    #[serde(default = "GameConfig::default_fractions")]
    pub allowed_bet_fractions: Vec<f64>,
    /// fixed flop for postflop simulations, e.g. "AsKd7c".
    /// sampled per wave when absent.
    #[serde(default)]
    pub board: Option<String>,
}

impl GameConfig {
    pub fn default_fractions() -> Vec<f64> {
        vec![0.5, 0.75, 1.0]
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_players < crate::N_MIN_PLAYERS || self.num_players > crate::N_MAX_PLAYERS {
            return Err(format!("num_players out of range: {}", self.num_players));
        }
        if self.small_blind <= 0.0 || self.big_blind <= 0.0 {
            return Err(String::from("blinds must be positive"));
        }
        if self.small_blind > self.big_blind {
            return Err(String::from("small blind exceeds big blind"));
        }
        if self.stack_size <= self.big_blind {
            return Err(String::from("stack must cover the big blind"));
        }
        if self.allowed_bet_fractions.is_empty() {
            return Err(String::from("at least one bet fraction required"));
        }
        if self.allowed_bet_fractions.iter().any(|f| *f <= 0.0) {
            return Err(String::from("bet fractions must be positive"));
        }
        if let Some(ref board) = self.board {
            crate::cards::board::Board::try_from(board.as_str())?;
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_players: 2,
            stack_size: 100.0,
            small_blind: 0.5,
            big_blind: 1.0,
            allowed_bet_fractions: Self::default_fractions(),
            board: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }
    #[test]
    fn rejects_bad_configs() {
        let mut config = GameConfig::default();
        config.num_players = 1;
        assert!(config.validate().is_err());
        let mut config = GameConfig::default();
        config.small_blind = -1.0;
        assert!(config.validate().is_err());
        let mut config = GameConfig::default();
        config.board = Some(String::from("AsKd")); // not a flop
        assert!(config.validate().is_err());
    }
}
