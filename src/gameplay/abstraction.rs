use super::EPSILON;
use super::action::Action;
use crate::Chips;

/// compacts a full legal action list into the solved action set:
/// fold / check / call survive untouched, and the raise ladder keeps
/// only its smallest and largest rungs, plus one median rung when
/// three or more distinct sizes exist. output is stable-sorted and
/// duplicate-free, so equal states always present equal lists.
pub fn compress(legal: &[Action]) -> Vec<Action> {
    let mut options = legal
        .iter()
        .filter(|a| !a.is_raise())
        .cloned()
        .collect::<Vec<Action>>();
    let mut raises = legal
        .iter()
        .filter(|a| a.is_raise())
        .map(|a| a.chips())
        .collect::<Vec<Chips>>();
    raises.sort_by(|a, b| a.partial_cmp(b).expect("chips are finite"));
    raises.dedup_by(|a, b| (*a - *b).abs() < EPSILON);
    let kept = match raises.len() {
        0 | 1 | 2 => raises,
        n => vec![raises[0], raises[n / 2], raises[n - 1]],
    };
    options.extend(kept.into_iter().map(Action::Raise));
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_small_ladders_through() {
        let legal = vec![Action::Fold, Action::Call(2.0), Action::Raise(4.0)];
        assert!(compress(&legal) == legal);
    }

    #[test]
    fn keeps_min_median_max() {
        let legal = vec![
            Action::Check,
            Action::Raise(2.0),
            Action::Raise(4.0),
            Action::Raise(6.0),
            Action::Raise(8.0),
            Action::Raise(100.0),
        ];
        let kept = compress(&legal);
        assert!(
            kept == vec![
                Action::Check,
                Action::Raise(2.0),
                Action::Raise(6.0),
                Action::Raise(100.0),
            ]
        );
    }

    #[test]
    fn dedupes_equal_sizes() {
        let legal = vec![Action::Check, Action::Raise(5.0), Action::Raise(5.0)];
        let kept = compress(&legal);
        assert!(kept == vec![Action::Check, Action::Raise(5.0)]);
    }

    #[test]
    fn is_deterministic() {
        let legal = vec![
            Action::Fold,
            Action::Call(1.0),
            Action::Raise(3.0),
            Action::Raise(5.0),
            Action::Raise(7.0),
        ];
        assert!(compress(&legal) == compress(&legal));
    }
}
