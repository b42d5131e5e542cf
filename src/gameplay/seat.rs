use crate::Chips;
use crate::cards::hand::Hole;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Betting,
    Shoving,
    Folding,
}

/// one player's private view of the table: remaining chips, what they
/// have in for this street (stake), what they have in for the whole
/// hand (spent), and whether they can still act.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Seat {
    stack: Chips,
    stake: Chips,
    spent: Chips,
    state: State,
    hole: Option<Hole>,
}

impl From<Chips> for Seat {
    fn from(stack: Chips) -> Self {
        Self {
            stack,
            stake: 0.0,
            spent: 0.0,
            state: State::Betting,
            hole: None,
        }
    }
}

impl Seat {
    pub fn stack(&self) -> Chips {
        self.stack
    }
    pub fn stake(&self) -> Chips {
        self.stake
    }
    pub fn spent(&self) -> Chips {
        self.spent
    }
    pub fn state(&self) -> State {
        self.state
    }
    pub fn hole(&self) -> Option<Hole> {
        self.hole
    }

    pub fn bet(&mut self, chips: Chips) {
        assert!(chips >= 0.0);
        assert!(chips <= self.stack + super::EPSILON, "bet exceeds stack");
        self.stack = super::snap(self.stack - chips).max(0.0);
        self.stake = super::snap(self.stake + chips);
        self.spent = super::snap(self.spent + chips);
        if self.stack <= super::EPSILON {
            self.stack = 0.0;
            self.state = State::Shoving;
        }
    }
    pub fn fold(&mut self) {
        self.state = State::Folding;
    }
    pub fn reset_stake(&mut self) {
        self.stake = 0.0;
    }
    pub fn reset_hole(&mut self, hole: Option<Hole>) {
        self.hole = hole;
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = match self.state {
            State::Betting => "B",
            State::Shoving => "S",
            State::Folding => "F",
        };
        write!(f, "{}{:<8}", state, self.stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn betting_moves_chips() {
        let mut seat = Seat::from(100.0);
        seat.bet(10.0);
        assert!(seat.stack() == 90.0);
        assert!(seat.stake() == 10.0);
        assert!(seat.spent() == 10.0);
        assert!(seat.state() == State::Betting);
    }
    #[test]
    fn all_in_flips_state() {
        let mut seat = Seat::from(10.0);
        seat.bet(10.0);
        assert!(seat.state() == State::Shoving);
        assert!(seat.stack() == 0.0);
    }
    #[test]
    fn spent_survives_street_reset() {
        let mut seat = Seat::from(100.0);
        seat.bet(10.0);
        seat.reset_stake();
        assert!(seat.stake() == 0.0);
        assert!(seat.spent() == 10.0);
    }
}
