use rand::Rng;
use std::time::Duration;

/// Draws a random election timeout within the configured window.
pub fn random_election_timeout<R: Rng>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn timeout_stays_within_window() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let t = random_election_timeout(&mut rng, 2000, 3000);
            assert!(t >= Duration::from_millis(2000));
            assert!(t <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(
            random_election_timeout(&mut a, 50, 100),
            random_election_timeout(&mut b, 50, 100)
        );
    }
}
