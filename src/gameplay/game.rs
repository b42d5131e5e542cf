use super::EPSILON;
use super::action::Action;
use super::config::GameConfig;
use super::seat::Seat;
use super::seat::State;
use super::showdown::Entry;
use super::showdown::Showdown;
use super::snap;
use crate::Chips;
use crate::Position;
use crate::cards::board::Board;
use crate::cards::deck::Deck;
use crate::cards::hand::Hand;
use crate::cards::hand::Hole;
use crate::cards::street::Street;
use crate::cards::strength::Strength;
use rand::rngs::SmallRng;
use serde::Deserialize;
use serde::Serialize;

/// who moves next, if anyone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Decision(Position),
    Chance,
    Terminal,
}

/// immutable snapshot of the table in between actions. transitions are
/// pure: apply / deal return fresh states and never touch the parent.
/// this is also the node representation the solver recurses over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    config: GameConfig,
    seats: Vec<Seat>,
    board: Board,
    pot: Chips,
    dealer: Position,
    actor: Position,
    /// players still owed a decision on this street
    pending: usize,
    /// raises so far on this street
    raises: usize,
    /// street-bet level before the most recent raise, for min-raise math
    level_prev: Chips,
}

impl Game {
    /// preflop root: blinds posted, nobody dealt in yet.
    pub fn root(config: GameConfig) -> Self {
        assert!(config.validate().is_ok(), "invalid game config");
        let n = config.num_players;
        let mut game = Self {
            seats: vec![Seat::from(config.stack_size); n],
            board: Board::empty(),
            pot: 0.0,
            dealer: 0,
            actor: 0,
            pending: n,
            raises: 0,
            level_prev: 0.0,
            config,
        };
        game.post_blinds();
        game
    }

    fn post_blinds(&mut self) {
        let n = self.n();
        let (small, big) = match n {
            2 => (self.dealer, (self.dealer + 1) % n),
            _ => ((self.dealer + 1) % n, (self.dealer + 2) % n),
        };
        let sb = self.config.small_blind.min(self.seats[small].stack());
        let bb = self.config.big_blind.min(self.seats[big].stack());
        self.seats[small].bet(sb);
        self.seats[big].bet(bb);
        self.pot = snap(sb + bb);
        self.level_prev = sb;
        self.actor = match n {
            2 => self.dealer,
            _ => (self.dealer + 3) % n,
        };
    }

    /// deal every live undealt seat a hole from the remaining deck.
    /// pinned hands stay put.
    pub fn deal_holes(mut self, rng: &mut SmallRng) -> Self {
        let mut deck = self.deck();
        for seat in self.seats.iter_mut() {
            if seat.state() != State::Folding && seat.hole().is_none() {
                seat.reset_hole(Some(deck.hole(rng)));
            }
        }
        self
    }
    /// pin one player's hole, e.g. the sampled hand of a task.
    /// fails when the hand collides with the board or a dealt hand.
    pub fn with_hole(mut self, position: Position, hole: Hole) -> Result<Self, String> {
        let blocked = self
            .seats
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .filter_map(|(_, s)| s.hole())
            .map(|h| h.hand())
            .fold(self.board.hand(), Hand::add);
        if u64::from(blocked) & u64::from(hole.hand()) != 0 {
            return Err(format!("hand {} collides with dealt cards", hole));
        }
        self.seats[position].reset_hole(Some(hole));
        Ok(self)
    }
    /// jump straight to flop betting, blinds carried into the pot.
    /// this is the root shape of postflop simulations.
    pub fn with_board(mut self, board: Board) -> Self {
        assert!(self.street() == Street::Pref);
        assert!(board.street() == Street::Flop);
        self.board = board;
        self.begin_street();
        self
    }

    //
    pub fn n(&self) -> usize {
        self.config.num_players
    }
    pub fn pot(&self) -> Chips {
        self.pot
    }
    pub fn board(&self) -> Board {
        self.board
    }
    pub fn street(&self) -> Street {
        self.board.street()
    }
    pub fn config(&self) -> &GameConfig {
        &self.config
    }
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }
    pub fn actor(&self) -> Position {
        self.actor
    }
    pub fn dealer(&self) -> Position {
        self.dealer
    }
    /// chips in the pot from earlier streets
    pub fn carryover(&self) -> Chips {
        snap(self.pot - self.seats.iter().map(|s| s.stake()).sum::<Chips>())
    }
    /// highest street bet so far
    pub fn level(&self) -> Chips {
        self.seats
            .iter()
            .map(|s| s.stake())
            .fold(0.0, Chips::max)
    }
    pub fn survivors(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| s.state() != State::Folding)
            .count()
    }
    fn betting(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| s.state() == State::Betting)
            .count()
    }
    fn betting_others(&self) -> usize {
        self.seats
            .iter()
            .enumerate()
            .filter(|(i, s)| *i != self.actor && s.state() == State::Betting)
            .count()
    }

    pub fn phase(&self) -> Phase {
        if self.survivors() == 1 {
            Phase::Terminal
        } else if self.pending > 0 {
            Phase::Decision(self.actor)
        } else if self.street() == Street::Rive {
            Phase::Terminal
        } else {
            Phase::Chance
        }
    }

    /// legal moves for the player to act.
    /// - fold iff facing a bet
    /// - check iff not, else flat call when affordable
    /// - pot-fraction raises within [min raise, stack], plus all-in
    ///   when it strictly exceeds the smallest legal raise
    pub fn legal(&self) -> Vec<Action> {
        let mut options = Vec::new();
        let actor = match self.phase() {
            Phase::Decision(p) => p,
            _ => return options,
        };
        let seat = &self.seats[actor];
        let to_call = snap(self.level() - seat.stake());
        if to_call > EPSILON {
            options.push(Action::Fold);
            if to_call <= seat.stack() + EPSILON {
                options.push(Action::Call(to_call.min(seat.stack())));
            }
        } else {
            options.push(Action::Check);
        }
        if self.raises < crate::MAX_RAISES_PER_STREET {
            let raise_to = self.level() + (self.level() - self.level_prev);
            let minimum = snap(raise_to - seat.stake()).min(seat.stack());
            let mut bets = self
                .config
                .allowed_bet_fractions
                .iter()
                .map(|f| snap(self.pot * f))
                .filter(|amount| *amount + EPSILON >= minimum)
                .filter(|amount| *amount <= seat.stack() + EPSILON)
                .map(|amount| amount.min(seat.stack()))
                .collect::<Vec<Chips>>();
            if seat.stack() > minimum + EPSILON {
                bets.push(seat.stack());
            }
            bets.sort_by(|a, b| a.partial_cmp(b).expect("chips are finite"));
            bets.dedup_by(|a, b| (*a - *b).abs() < EPSILON);
            options.extend(bets.into_iter().map(Action::Raise));
        }
        options
    }

    pub fn is_allowed(&self, action: &Action) -> bool {
        self.legal().iter().any(|legal| match (legal, action) {
            (Action::Fold, Action::Fold) => true,
            (Action::Check, Action::Check) => true,
            (Action::Call(a), Action::Call(b)) => (a - b).abs() < EPSILON,
            (Action::Raise(a), Action::Raise(b)) => (a - b).abs() < EPSILON,
            _ => false,
        })
    }

    pub fn apply(&self, action: Action) -> Self {
        let mut child = self.clone();
        child.act(action);
        child
    }

    fn act(&mut self, action: Action) {
        assert!(self.is_allowed(&action), "illegal action: {}", action);
        match action {
            Action::Check => {
                self.pending -= 1;
            }
            Action::Fold => {
                self.seats[self.actor].fold();
                self.pending -= 1;
            }
            Action::Call(chips) => {
                self.commit(chips);
                self.pending -= 1;
            }
            Action::Raise(chips) => {
                let level = self.level();
                self.commit(chips);
                self.level_prev = level;
                self.raises += 1;
                self.pending = self.betting_others();
            }
        }
        if let Phase::Decision(_) = self.phase() {
            self.rotate();
        }
    }

    fn commit(&mut self, chips: Chips) {
        self.pot = snap(self.pot + chips);
        self.seats[self.actor].bet(chips);
    }

    fn rotate(&mut self) {
        loop {
            self.actor = (self.actor + 1) % self.n();
            if self.seats[self.actor].state() == State::Betting {
                break;
            }
        }
    }

    /// chance transition: reveal the next street's cards
    pub fn deal(&self, cards: Hand) -> Self {
        assert!(self.phase() == Phase::Chance);
        assert!(cards.n() == self.street().n_revealed());
        let mut child = self.clone();
        child.board = child.board.add(cards);
        child.begin_street();
        child
    }
    /// sample the next street's cards from the live deck
    pub fn draw(&self, rng: &mut SmallRng) -> Hand {
        self.deck().deal(self.street().n_revealed(), rng)
    }
    /// everything not on the board or in a live hand
    pub fn deck(&self) -> Deck {
        let removed = self
            .seats
            .iter()
            .filter_map(|s| s.hole())
            .map(|h| h.hand())
            .fold(self.board.hand(), Hand::add);
        Deck::from(removed)
    }

    fn begin_street(&mut self) {
        for seat in self.seats.iter_mut() {
            seat.reset_stake();
        }
        self.raises = 0;
        self.level_prev = 0.0;
        self.pending = match self.betting() {
            n if n >= 2 => n,
            _ => 0,
        };
        if self.pending > 0 {
            self.actor = self.dealer;
            self.rotate();
        }
    }

    /// net chips won or lost by each seat, settled over side pots.
    pub fn payoffs(&self) -> Vec<Chips> {
        assert!(self.phase() == Phase::Terminal, "game still live");
        let contested = self.survivors() > 1;
        let entries = self
            .seats
            .iter()
            .map(|seat| Entry {
                reward: 0.0,
                risked: seat.spent(),
                folded: seat.state() == State::Folding,
                strength: match (seat.state() != State::Folding) && contested {
                    true => Some(self.strength(seat)),
                    false => None,
                },
            })
            .collect::<Vec<Entry>>();
        Showdown::from(entries)
            .settle()
            .iter()
            .map(|entry| snap(entry.reward - entry.risked))
            .collect()
    }

    fn strength(&self, seat: &Seat) -> Strength {
        let hole = seat.hole().expect("showdown requires dealt hands");
        Strength::from(hole.hand().add(self.board.hand()))
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for seat in self.seats.iter() {
            write!(f, "{}", seat)?;
        }
        write!(f, " @ {:>6} {} {}", self.pot, self.board, self.street())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn heads_up() -> Game {
        Game::root(GameConfig::default())
    }

    #[test]
    fn root_posts_blinds() {
        let game = heads_up();
        assert!(game.pot() == 1.5);
        assert!(game.street() == Street::Pref);
        assert!(game.phase() == Phase::Decision(0)); // dealer acts first heads-up
        assert!(game.carryover() == 0.0);
    }

    #[test]
    fn legal_shape_facing_bet() {
        let game = heads_up();
        let legal = game.legal();
        assert!(legal.contains(&Action::Fold));
        assert!(legal.contains(&Action::Call(0.5)));
        assert!(!legal.contains(&Action::Check));
        assert!(legal.iter().any(|a| a.is_raise()));
    }

    #[test]
    fn fold_ends_hand() {
        let game = heads_up().apply(Action::Fold);
        assert!(game.phase() == Phase::Terminal);
        let payoffs = game.payoffs();
        assert!(payoffs[0] == -0.5);
        assert!(payoffs[1] == 0.5);
    }

    #[test]
    fn check_through_reaches_showdown() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut game = heads_up().deal_holes(&mut rng);
        game = game.apply(Action::Call(0.5));
        game = game.apply(Action::Check);
        for _ in 0..3 {
            assert!(game.phase() == Phase::Chance);
            let cards = game.draw(&mut rng);
            game = game.deal(cards);
            game = game.apply(Action::Check);
            game = game.apply(Action::Check);
        }
        assert!(game.phase() == Phase::Terminal);
        let payoffs = game.payoffs();
        assert!((payoffs.iter().sum::<Chips>()).abs() < EPSILON);
    }

    #[test]
    fn raise_reopens_action() {
        let game = heads_up();
        let game = game.apply(Action::Call(0.5));
        let raise = game
            .legal()
            .into_iter()
            .find(|a| a.is_raise())
            .expect("raise available");
        let game = game.apply(raise);
        assert!(matches!(game.phase(), Phase::Decision(0)));
    }

    #[test]
    fn apply_is_pure() {
        let game = heads_up();
        let _ = game.apply(Action::Fold);
        assert!(game.phase() != Phase::Terminal);
        assert!(game.pot() == 1.5);
    }

    #[test]
    fn pinned_holes_must_be_available() {
        let mut rng = SmallRng::seed_from_u64(2);
        let game = heads_up().deal_holes(&mut rng);
        let taken = game.seats()[1].hole().unwrap();
        assert!(game.clone().with_hole(0, taken).is_err());
        let fresh = heads_up();
        let hole = Hole::try_from(Hand::try_from("AsKs").unwrap()).unwrap();
        assert!(fresh.with_hole(0, hole).is_ok());
    }

    #[test]
    fn postflop_root_carries_blinds() {
        let board = Board::try_from("AsKd7c").unwrap();
        let game = heads_up().with_board(board);
        assert!(game.street() == Street::Flop);
        assert!(game.pot() == 1.5);
        assert!(game.carryover() == 1.5);
        assert!(matches!(game.phase(), Phase::Decision(_)));
    }

    #[test]
    fn invariants_hold_along_random_walks() {
        use rand::Rng;
        let mut rng = SmallRng::seed_from_u64(1234);
        for _ in 0..200 {
            let mut spent = vec![0.0; 2];
            let mut game = heads_up().deal_holes(&mut rng);
            loop {
                let total = game.seats().iter().map(|s| s.spent()).sum::<Chips>();
                assert!(total + EPSILON >= game.pot() - EPSILON);
                assert!(game.seats().iter().all(|s| s.stack() >= 0.0));
                for (i, seat) in game.seats().iter().enumerate() {
                    assert!(seat.spent() + EPSILON >= spent[i]);
                    spent[i] = seat.spent();
                }
                match game.phase() {
                    Phase::Terminal => break,
                    Phase::Chance => {
                        let cards = game.draw(&mut rng);
                        game = game.deal(cards);
                    }
                    Phase::Decision(_) => {
                        let legal = game.legal();
                        assert!(!legal.is_empty());
                        let action = legal[rng.random_range(0..legal.len())];
                        let street = game.street();
                        game = game.apply(action);
                        assert!(game.street() >= street);
                    }
                }
            }
            let payoffs = game.payoffs();
            assert!((payoffs.iter().sum::<Chips>()).abs() < 1e-6);
        }
    }
}
