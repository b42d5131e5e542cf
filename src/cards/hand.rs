use super::card::Card;
use serde::Deserialize;
use serde::Serialize;

/// unordered set of cards as a 52-bit bitstring.
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Hand(u64);

impl Hand {
    pub const MASK: u64 = (1 << 52) - 1;

    pub fn empty() -> Self {
        Self(0)
    }
    pub fn n(&self) -> usize {
        self.0.count_ones() as usize
    }
    pub fn contains(&self, card: &Card) -> bool {
        self.0 & u64::from(*card) != 0
    }
    pub fn add(self, other: Self) -> Self {
        assert!(self.0 & other.0 == 0, "card dealt twice");
        Self(self.0 | other.0)
    }
    pub fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
    pub fn complement(&self) -> Self {
        Self(!self.0 & Self::MASK)
    }
    pub fn cards(&self) -> Vec<Card> {
        let mut bits = self.0;
        let mut cards = Vec::with_capacity(self.n());
        while bits != 0 {
            cards.push(Card::from(bits.trailing_zeros() as u8));
            bits &= bits - 1;
        }
        cards
    }
}

// u64 isomorphism
impl From<u64> for Hand {
    fn from(n: u64) -> Self {
        Self(n & Self::MASK)
    }
}
impl From<Hand> for u64 {
    fn from(hand: Hand) -> Self {
        hand.0
    }
}
impl From<Card> for Hand {
    fn from(card: Card) -> Self {
        Self(u64::from(card))
    }
}
impl From<Vec<Card>> for Hand {
    fn from(cards: Vec<Card>) -> Self {
        cards
            .into_iter()
            .map(Hand::from)
            .fold(Hand::empty(), Hand::add)
    }
}

/// parse concatenated two-char cards, e.g. "AsKd7c"
impl TryFrom<&str> for Hand {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let chars = s.chars().collect::<Vec<_>>();
        if chars.len() % 2 != 0 {
            return Err(format!("odd length hand string: {}", s));
        }
        chars
            .chunks(2)
            .map(|pair| Card::try_from(pair.iter().collect::<String>().as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map(Hand::from)
    }
}

impl std::fmt::Display for Hand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for card in self.cards() {
            write!(f, "{}", card)?;
        }
        Ok(())
    }
}

/// exactly two hole cards.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hole(Hand);

impl Hole {
    pub fn hand(&self) -> Hand {
        self.0
    }
    /// (high, low) by rank
    pub fn cards(&self) -> (Card, Card) {
        let cards = self.0.cards();
        assert!(cards.len() == 2);
        (cards[1], cards[0])
    }
}

impl TryFrom<Hand> for Hole {
    type Error = String;
    fn try_from(hand: Hand) -> Result<Self, Self::Error> {
        match hand.n() {
            2 => Ok(Self(hand)),
            n => Err(format!("hole must hold 2 cards, got {}", n)),
        }
    }
}
impl From<(Card, Card)> for Hole {
    fn from((a, b): (Card, Card)) -> Self {
        assert!(a != b, "duplicate hole card");
        Self(Hand::from(a).add(Hand::from(b)))
    }
}

impl std::fmt::Display for Hole {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl crate::Arbitrary for Hole {
    fn random() -> Self {
        use crate::cards::deck::Deck;
        use rand::SeedableRng;
        let mut rng = rand::rngs::SmallRng::from_os_rng();
        Deck::fresh().hole(&mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::card::Rank;
    use crate::cards::card::Suit;

    #[test]
    fn add_remove() {
        let a = Hand::from(Card::from((Rank::Ace, Suit::Spade)));
        let b = Hand::from(Card::from((Rank::King, Suit::Heart)));
        let both = a.add(b);
        assert!(both.n() == 2);
        assert!(both.remove(a) == b);
    }
    #[test]
    fn complement_partitions() {
        let hand = Hand::try_from("AsKdQh").unwrap();
        assert!(hand.n() == 3);
        assert!(hand.complement().n() == 49);
        assert!(hand.add(hand.complement()).n() == 52);
    }
    #[test]
    #[should_panic]
    fn double_deal_panics() {
        let a = Hand::try_from("As").unwrap();
        let _ = a.add(a);
    }
    #[test]
    fn hole_orders_cards() {
        let hole = Hole::try_from(Hand::try_from("2cAs").unwrap()).unwrap();
        let (hi, lo) = hole.cards();
        assert!(hi.rank() == Rank::Ace);
        assert!(lo.rank() == Rank::Two);
    }
}
