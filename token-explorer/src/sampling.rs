//! Weighted random choice over a candidate batch

use crate::gateway::Candidate;
use rand::Rng;

/// Candidates auto-play may choose: not excluded and not a repeat of `last_selected`
pub fn eligible<'a>(candidates: &'a [Candidate], last_selected: Option<&str>) -> Vec<&'a Candidate> {
    candidates
        .iter()
        .filter(|c| !c.excluded)
        .filter(|c| last_selected != Some(c.token.as_str()))
        .collect()
}

/// Cumulative-weight walk: subtract each weight from `r` until it drops to zero or below.
/// The last candidate absorbs floating-point leftovers.
pub fn pick_weighted<'a>(eligible: &[&'a Candidate], r: f64) -> Option<&'a Candidate> {
    let mut remaining = r;
    for candidate in eligible {
        if candidate.probability_pct <= 0.0 {
            continue;
        }
        remaining -= candidate.probability_pct;
        if remaining <= 0.0 {
            return Some(*candidate);
        }
    }
    eligible.last().copied()
}

/// Draw `r` uniformly in `[0, total)` and pick by weight
pub fn sample<'a, R: Rng + ?Sized>(eligible: &[&'a Candidate], rng: &mut R) -> Option<&'a Candidate> {
    if eligible.is_empty() {
        return None;
    }

    let total: f64 = eligible
        .iter()
        .map(|c| c.probability_pct.max(0.0))
        .sum();
    if total <= 0.0 {
        // No usable weights; fall back to a uniform choice
        let idx = rng.gen_range(0..eligible.len());
        return Some(eligible[idx]);
    }

    pick_weighted(eligible, rng.gen_range(0.0..total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hello_batch() -> Vec<Candidate> {
        vec![Candidate::new(" world", 80.0), Candidate::new(" there", 20.0)]
    }

    #[test]
    fn test_draw_75_selects_first() {
        let batch = hello_batch();
        let pool = eligible(&batch, None);
        assert_eq!(pick_weighted(&pool, 75.0).unwrap().token, " world");
        assert_eq!(pick_weighted(&pool, 80.0).unwrap().token, " world");
        assert_eq!(pick_weighted(&pool, 85.0).unwrap().token, " there");
    }

    #[test]
    fn test_overshoot_falls_back_to_last() {
        let batch = hello_batch();
        let pool = eligible(&batch, None);
        assert_eq!(pick_weighted(&pool, 100.0 + 1e-9).unwrap().token, " there");
    }

    #[test]
    fn test_excluded_and_repeat_filtered() {
        let batch = vec![
            Candidate::new("a", 50.0),
            Candidate::new("b", 30.0).excluded(),
            Candidate::new("c", 20.0),
        ];
        let pool = eligible(&batch, Some("a"));
        let tokens: Vec<_> = pool.iter().map(|c| c.token.as_str()).collect();
        assert_eq!(tokens, vec!["c"]);
    }

    #[test]
    fn test_frequencies_follow_weights() {
        let batch = vec![
            Candidate::new("a", 60.0),
            Candidate::new("b", 30.0),
            Candidate::new("c", 10.0),
            Candidate::new("x", 90.0).excluded(),
        ];
        let pool = eligible(&batch, None);
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 20_000;
        let mut counts = [0usize; 3];

        for _ in 0..trials {
            match sample(&pool, &mut rng).unwrap().token.as_str() {
                "a" => counts[0] += 1,
                "b" => counts[1] += 1,
                "c" => counts[2] += 1,
                other => panic!("excluded token {other} selected"),
            }
        }

        let freq = |n: usize| n as f64 / trials as f64;
        assert_relative_eq!(freq(counts[0]), 0.6, epsilon = 0.02);
        assert_relative_eq!(freq(counts[1]), 0.3, epsilon = 0.02);
        assert_relative_eq!(freq(counts[2]), 0.1, epsilon = 0.02);
    }

    #[test]
    fn test_zero_weights_still_choose() {
        let batch = vec![Candidate::new("a", 0.0), Candidate::new("b", 0.0)];
        let pool = eligible(&batch, None);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample(&pool, &mut rng).is_some());
        assert!(sample(&[], &mut rng).is_none());
    }
}
