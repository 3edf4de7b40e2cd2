use anyhow::{ensure, Result};
use rand::Rng;

/// Pool of client identity strings (user agents), one drawn per attempt.
///
/// Selection is uniform and stateless - nothing is remembered between draws,
/// so consecutive attempts may present the same fingerprint. That is fine:
/// the point is that a *failed* attempt never retries with a forced-identical
/// identity, not that identities never repeat.
#[derive(Clone, Debug)]
pub struct FingerprintPool {
    agents: Vec<String>,
}

impl FingerprintPool {
    /// Build a pool from caller-supplied user agents. The pool must not be
    /// empty - there is no sensible fallback identity.
    pub fn new(agents: Vec<String>) -> Result<Self> {
        ensure!(!agents.is_empty(), "fingerprint pool must not be empty");
        Ok(Self { agents })
    }

    /// The built-in desktop/mobile user-agent mix used when the caller does
    /// not supply a pool.
    pub fn builtin() -> Self {
        Self {
            agents: [
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/109.0.5414.74",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Mobile/15E148 Safari/604.1",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }

    /// Uniform draw from the process-wide RNG.
    pub fn select(&self) -> &str {
        self.select_with(&mut rand::rng())
    }

    /// Uniform draw from a caller-provided RNG, so tests can seed it.
    pub fn select_with(&self, rng: &mut impl Rng) -> &str {
        let idx = rng.random_range(0..self.agents.len());
        &self.agents[idx]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_pool_rejected() {
        assert!(FingerprintPool::new(vec![]).is_err());
    }

    #[test]
    fn test_builtin_pool_is_populated() {
        let pool = FingerprintPool::builtin();
        assert_eq!(pool.len(), 5);
        assert!(pool.select().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_seeded_selection_is_deterministic() {
        let pool = FingerprintPool::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let first: Vec<&str> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..8).map(|_| pool.select_with(&mut rng)).collect()
        };
        let second: Vec<&str> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..8).map(|_| pool.select_with(&mut rng)).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_selection_stays_inside_pool() {
        let pool = FingerprintPool::new(vec!["only".into()]).unwrap();
        for _ in 0..16 {
            assert_eq!(pool.select(), "only");
        }
    }
}
