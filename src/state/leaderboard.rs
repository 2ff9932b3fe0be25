use indexmap::IndexMap;

use crate::state::room::Room;

/// One ranked line of a leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    /// 1-based position; equal scores still get distinct ranks.
    pub rank: usize,
    pub name: String,
    pub score: f64,
}

/// Rank scores from highest to lowest.
///
/// The sort is stable, so equal scores keep their insertion (join) order and the
/// result is identical across calls on unchanged data.
pub fn rank_scores(scores: &IndexMap<String, f64>) -> Vec<Standing> {
    let mut entries = scores.iter().collect::<Vec<_>>();
    entries.sort_by(|(_, a), (_, b)| b.total_cmp(a));

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (name, score))| Standing {
            rank: index + 1,
            name: name.clone(),
            score: *score,
        })
        .collect()
}

impl Room {
    /// Leaderboard projection of the room's current scores.
    pub fn leaderboard(&self) -> Vec<Standing> {
        rank_scores(self.scores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(&str, f64)]) -> IndexMap<String, f64> {
        entries
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect()
    }

    #[test]
    fn orders_by_score_descending() {
        let board = rank_scores(&scores(&[("A", 50.0), ("B", 80.0)]));
        assert_eq!(
            board,
            vec![
                Standing {
                    rank: 1,
                    name: "B".into(),
                    score: 80.0
                },
                Standing {
                    rank: 2,
                    name: "A".into(),
                    score: 50.0
                },
            ]
        );
    }

    #[test]
    fn ties_keep_insertion_order_with_distinct_ranks() {
        let data = scores(&[("zed", 10.0), ("amy", 30.0), ("bob", 10.0), ("cat", 10.0)]);
        let board = rank_scores(&data);
        let names = board.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        let ranks = board.iter().map(|s| s.rank).collect::<Vec<_>>();
        assert_eq!(names, ["amy", "zed", "bob", "cat"]);
        assert_eq!(ranks, [1, 2, 3, 4]);
        assert_eq!(rank_scores(&data), board);
    }

    #[test]
    fn empty_scores_give_empty_board() {
        assert!(rank_scores(&IndexMap::new()).is_empty());
    }
}
