//! Picks which favorite the random change shows next.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ChangeError;
use crate::favorites::FavoriteTitle;

/// Picks a favorite uniformly at random, avoiding the title shown last.
///
/// Drawing uniformly from the candidates whose name differs from `last_shown`
/// gives the same distribution as drawing from all of them and redrawing on a
/// repeat, without the loop. When every candidate carries that name (a single
/// favorite, or the same title as both movie and show) the repeat is accepted.
pub fn pick_next<'a, R: Rng + ?Sized>(
    candidates: &'a [FavoriteTitle],
    last_shown: &str,
    rng: &mut R,
) -> Result<&'a FavoriteTitle, ChangeError> {
    if candidates.is_empty() {
        return Err(ChangeError::EmptyFavorites);
    }

    let fresh: Vec<&FavoriteTitle> = candidates.iter().filter(|t| t.name != last_shown).collect();
    let picked = if fresh.is_empty() {
        candidates.choose(rng)
    } else {
        fresh.choose(rng).copied()
    };

    picked.ok_or(ChangeError::EmptyFavorites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::MediaType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn favorites(names: &[&str]) -> Vec<FavoriteTitle> {
        names.iter().map(|n| FavoriteTitle::new(*n, MediaType::Movie)).collect()
    }

    #[test]
    fn never_repeats_the_last_title() {
        let candidates = favorites(&["Her", "Whiplash", "Inception"]);
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..1000 {
            assert_ne!(pick_next(&candidates, "Her", &mut rng).unwrap().name, "Her");
        }
    }

    #[test]
    fn two_candidates_alternate() {
        let candidates = favorites(&["Dark", "Fargo"]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut last = "Dark".to_string();
        for _ in 0..1000 {
            let next = pick_next(&candidates, &last, &mut rng).unwrap();
            assert_ne!(next.name, last);
            last = next.name.clone();
        }
    }

    #[test]
    fn single_candidate_is_forced() {
        let candidates = favorites(&["Fleabag"]);
        let mut rng = StdRng::seed_from_u64(9);
        for last in ["Fleabag", "", "Something else"] {
            assert_eq!(pick_next(&candidates, last, &mut rng).unwrap().name, "Fleabag");
        }
    }

    #[test]
    fn same_name_different_type_is_accepted() {
        let candidates = vec![
            FavoriteTitle::new("Fargo", MediaType::Movie),
            FavoriteTitle::new("Fargo", MediaType::Tv),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(pick_next(&candidates, "Fargo", &mut rng).unwrap().name, "Fargo");
    }

    #[test]
    fn empty_candidates_fail() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(pick_next(&[], "Her", &mut rng), Err(ChangeError::EmptyFavorites)));
    }

    #[test]
    fn remaining_candidates_are_roughly_uniform() {
        let candidates = favorites(&["A", "B", "C", "D"]);
        let mut rng = StdRng::seed_from_u64(77);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            *counts.entry(pick_next(&candidates, "A", &mut rng).unwrap().name.clone()).or_default() += 1;
        }
        assert!(!counts.contains_key("A"));
        for name in ["B", "C", "D"] {
            let n = counts[name];
            assert!((800..1200).contains(&n), "{name} picked {n} times");
        }
    }
}
