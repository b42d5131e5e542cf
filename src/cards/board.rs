use super::card::Card;
use super::hand::Hand;
use super::street::Street;
use serde::Deserialize;
use serde::Serialize;

/// community cards. holds 0, 3, 4, or 5 of them; the count determines
/// the street.
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Board(Hand);

impl Board {
    pub fn empty() -> Self {
        Self(Hand::empty())
    }
    pub fn hand(&self) -> Hand {
        self.0
    }
    pub fn n(&self) -> usize {
        self.0.n()
    }
    pub fn cards(&self) -> Vec<Card> {
        self.0.cards()
    }
    pub fn street(&self) -> Street {
        match self.0.n() {
            0 => Street::Pref,
            3 => Street::Flop,
            4 => Street::Turn,
            5 => Street::Rive,
            n => panic!("impossible board size: {}", n),
        }
    }
    pub fn add(self, cards: Hand) -> Self {
        let board = Self(self.0.add(cards));
        let _ = board.street();
        board
    }

    /// suit-relabelling-invariant texture class. two isomorphic boards
    /// (same rank multiset, same suit collision pattern) always land in
    /// the same class:
    ///   base  = number of board cards
    ///   +10     any paired rank
    ///   +20     monotone (three or more cards of one suit)
    ///   +30     three or more distinct consecutive ranks (wheel ace low)
    pub fn texture(&self) -> u8 {
        let mut class = self.n() as u8;
        if self.is_paired() {
            class += 10;
        }
        if self.is_monotone() {
            class += 20;
        }
        if self.is_straighty() {
            class += 30;
        }
        class
    }

    fn is_paired(&self) -> bool {
        let mut seen = 0u16;
        for card in self.cards() {
            let mask = u16::from(card.rank());
            if seen & mask != 0 {
                return true;
            }
            seen |= mask;
        }
        false
    }
    fn is_monotone(&self) -> bool {
        let mut suits = [0u8; 4];
        for card in self.cards() {
            suits[card.suit() as usize] += 1;
        }
        suits.iter().any(|&n| n >= 3)
    }
    fn is_straighty(&self) -> bool {
        let ranks = self
            .cards()
            .iter()
            .map(|c| u16::from(c.rank()))
            .fold(0u16, |acc, m| acc | m);
        // shift rank bits up by one so the ace can also occupy bit 0
        let mut mask = ranks << 1;
        if ranks & (1 << 12) != 0 {
            mask |= 1;
        }
        mask & (mask << 1) & (mask << 2) != 0
    }
}

impl TryFrom<&str> for Board {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let hand = Hand::try_from(s)?;
        match hand.n() {
            0 | 3 | 4 | 5 => Ok(Self(hand)),
            n => Err(format!("board must hold 0/3/4/5 cards, got {}", n)),
        }
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streets_by_size() {
        assert!(Board::empty().street() == Street::Pref);
        assert!(Board::try_from("AsKd7c").unwrap().street() == Street::Flop);
        assert!(Board::try_from("AsKd7c2h").unwrap().street() == Street::Turn);
        assert!(Board::try_from("AsKd7c2h9s").unwrap().street() == Street::Rive);
    }
    #[test]
    fn texture_detects_pairs() {
        assert!(Board::try_from("AsAd7c").unwrap().texture() == 3 + 10);
        assert!(Board::try_from("AsKd7c").unwrap().texture() == 3);
    }
    #[test]
    fn texture_detects_monotone() {
        assert!(Board::try_from("AsKs7s").unwrap().texture() == 3 + 20);
    }
    #[test]
    fn texture_detects_straight_runs() {
        assert!(Board::try_from("9s8d7c").unwrap().texture() == 3 + 30);
        assert!(Board::try_from("As2d3c").unwrap().texture() == 3 + 30);
    }
    #[test]
    fn texture_is_suit_invariant() {
        let a = Board::try_from("AsKd7c").unwrap();
        let b = Board::try_from("AdKc7h").unwrap();
        assert!(a.texture() == b.texture());
    }
}
