use crate::Position;
use crate::gameplay::abstraction;
use crate::gameplay::action::Action;
use crate::gameplay::bucket;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::game::Game;
use crate::gameplay::infoset::InfoSetKey;
use crate::gameplay::infoset::Path;

/// the single place game states become infoset keys. both the
/// training traversal and the exploitability walker go through here,
/// so their views of the tree can never drift apart.
pub fn encode(game: &Game, player: Position, path: &Path, params: AbstractionParams) -> InfoSetKey {
    let hole = game.seats()[player]
        .hole()
        .expect("decision nodes are dealt in");
    InfoSetKey::new(
        player as u8,
        u8::from(game.street()),
        game.board().texture(),
        path.clone(),
        bucket::bucket(hole, game.board(), params),
    )
}

/// the solved action set at a decision node
pub fn choices(game: &Game) -> Vec<Action> {
    abstraction::compress(&game.legal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::config::GameConfig;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn equal_states_equal_keys() {
        let mut rng = SmallRng::seed_from_u64(3);
        let game = Game::root(GameConfig::default()).deal_holes(&mut rng);
        let path = Path::default();
        let params = AbstractionParams::default();
        let a = encode(&game, 0, &path, params);
        let b = encode(&game, 0, &path, params);
        assert!(a == b);
        assert!(choices(&game) == choices(&game));
    }

    #[test]
    fn players_see_different_keys() {
        let mut rng = SmallRng::seed_from_u64(4);
        let game = Game::root(GameConfig::default()).deal_holes(&mut rng);
        let path = Path::default();
        let params = AbstractionParams::default();
        // distinct player component even at the same public state
        assert!(encode(&game, 0, &path, params) != encode(&game, 1, &path, params));
    }
}
