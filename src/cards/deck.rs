use super::card::Card;
use super::hand::Hand;
use super::hand::Hole;
use rand::Rng;
use rand::rngs::SmallRng;

/// the cards still available to be dealt. draws are uniform without
/// replacement, driven by a caller-supplied rng so sampling stays
/// reproducible.
#[derive(Debug, Clone)]
pub struct Deck(Hand);

impl Deck {
    pub fn fresh() -> Self {
        Self(Hand::from(Hand::MASK))
    }
    pub fn n(&self) -> usize {
        self.0.n()
    }
    pub fn contains(&self, card: &Card) -> bool {
        self.0.contains(card)
    }
    pub fn remove(&mut self, cards: Hand) {
        self.0 = self.0.remove(cards);
    }
    /// deal n cards, removing them from the deck
    pub fn deal(&mut self, n: usize, rng: &mut SmallRng) -> Hand {
        assert!(n <= self.n(), "deck exhausted");
        let mut dealt = Hand::empty();
        for _ in 0..n {
            let cards = self.0.cards();
            let card = cards[rng.random_range(0..cards.len())];
            let card = Hand::from(card);
            self.0 = self.0.remove(card);
            dealt = dealt.add(card);
        }
        dealt
    }
    pub fn hole(&mut self, rng: &mut SmallRng) -> Hole {
        Hole::try_from(self.deal(2, rng)).expect("two cards dealt")
    }
}

/// everything not already on the table
impl From<Hand> for Deck {
    fn from(removed: Hand) -> Self {
        Self(removed.complement())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn deals_without_replacement() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut deck = Deck::fresh();
        let a = deck.deal(5, &mut rng);
        let b = deck.deal(5, &mut rng);
        assert!(a.add(b).n() == 10);
        assert!(deck.n() == 42);
    }
    #[test]
    fn deterministic_under_seed() {
        let mut one = SmallRng::seed_from_u64(7);
        let mut two = SmallRng::seed_from_u64(7);
        assert!(Deck::fresh().deal(5, &mut one) == Deck::fresh().deal(5, &mut two));
    }
    #[test]
    fn excludes_removed() {
        let board = Hand::try_from("AsKd7c").unwrap();
        let deck = Deck::from(board);
        assert!(deck.n() == 49);
        for card in board.cards() {
            assert!(!deck.contains(&card));
        }
    }
}
