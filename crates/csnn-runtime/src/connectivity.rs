//! Connectivity patterns and the forward adjacency they produce
//!
//! A pattern decides, pair by pair, whether an edge exists from a source
//! (pre) unit to a destination (post) unit. [`build_connectivity`] scans all
//! pairs destination-major and returns, for every destination, the ascending
//! list of its sources.

use crate::{error::*, rng::SimRng};
use std::fmt;

/// Edge inclusion predicate
pub trait ConnectivityPattern: fmt::Debug + Send + Sync {
    /// Reject malformed parameters before any pair is evaluated
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Whether an edge `pre -> post` exists. Randomness must come from `rng`.
    fn include(&self, pre: usize, post: usize, rng: &mut SimRng) -> bool;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Every source feeds every destination
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AllToAll;

impl ConnectivityPattern for AllToAll {
    fn include(&self, _pre: usize, _post: usize, _rng: &mut SimRng) -> bool {
        true
    }

    fn name(&self) -> &str {
        "all_to_all"
    }
}

/// Each pair is connected independently with probability `p`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedProbability {
    /// Connection probability
    pub p: f64,
}

impl FixedProbability {
    /// Create a validated pattern
    pub fn new(p: f64) -> Result<Self> {
        let pattern = Self { p };
        pattern.validate()?;
        Ok(pattern)
    }
}

impl ConnectivityPattern for FixedProbability {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.p) {
            return Err(RuntimeError::invalid_parameter(
                "p",
                self.p.to_string(),
                "in [0.0, 1.0]",
            ));
        }
        Ok(())
    }

    fn include(&self, _pre: usize, _post: usize, rng: &mut SimRng) -> bool {
        rng.bernoulli(self.p)
    }

    fn name(&self) -> &str {
        "fixed_probability"
    }
}

/// Gaussian kernel over index distance
fn gaussian(pre: usize, post: usize, sigma: f64) -> f64 {
    let d = pre as f64 - post as f64;
    (-0.5 * (d * d) / (sigma * sigma)).exp()
}

fn check_sigma(name: &str, sigma: f64) -> Result<()> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(RuntimeError::invalid_parameter(name, sigma.to_string(), "> 0.0"));
    }
    Ok(())
}

/// Connection probability falls off as a Gaussian of `|pre - post|`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    /// Kernel width in units of index distance
    pub sigma: f64,
}

impl Gaussian {
    /// Create a validated pattern
    pub fn new(sigma: f64) -> Result<Self> {
        let pattern = Self { sigma };
        pattern.validate()?;
        Ok(pattern)
    }
}

impl ConnectivityPattern for Gaussian {
    fn validate(&self) -> Result<()> {
        check_sigma("sigma", self.sigma)
    }

    fn include(&self, pre: usize, post: usize, rng: &mut SimRng) -> bool {
        rng.bernoulli(gaussian(pre, post, self.sigma))
    }

    fn name(&self) -> &str {
        "gaussian"
    }
}

/// Difference of two Gaussian kernels, `g(sigma1) - g(sigma2)`.
///
/// The difference is not clamped. When `sigma2 > sigma1` it is negative for
/// every distance, and no pair is ever connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferenceOfGaussians {
    /// Width of the positive kernel
    pub sigma1: f64,
    /// Width of the subtracted kernel
    pub sigma2: f64,
}

impl DifferenceOfGaussians {
    /// Create a validated pattern
    pub fn new(sigma1: f64, sigma2: f64) -> Result<Self> {
        let pattern = Self { sigma1, sigma2 };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Inclusion threshold for a pair, possibly negative
    pub fn probability(&self, pre: usize, post: usize) -> f64 {
        gaussian(pre, post, self.sigma1) - gaussian(pre, post, self.sigma2)
    }
}

impl ConnectivityPattern for DifferenceOfGaussians {
    fn validate(&self) -> Result<()> {
        check_sigma("sigma1", self.sigma1)?;
        check_sigma("sigma2", self.sigma2)
    }

    fn include(&self, pre: usize, post: usize, rng: &mut SimRng) -> bool {
        rng.bernoulli(self.probability(pre, post))
    }

    fn name(&self) -> &str {
        "difference_of_gaussians"
    }
}

/// Pattern backed by a caller-supplied predicate
pub struct FnPattern<F> {
    name: String,
    predicate: F,
}

impl<F> FnPattern<F>
where
    F: Fn(usize, usize, &mut SimRng) -> bool + Send + Sync,
{
    /// Wrap a predicate
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> fmt::Debug for FnPattern<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPattern").field("name", &self.name).finish()
    }
}

impl<F> ConnectivityPattern for FnPattern<F>
where
    F: Fn(usize, usize, &mut SimRng) -> bool + Send + Sync,
{
    fn include(&self, pre: usize, post: usize, rng: &mut SimRng) -> bool {
        (self.predicate)(pre, post, rng)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Forward adjacency of one projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connectivity {
    pre_size: usize,
    post_size: usize,
    post_index: Vec<usize>,
    pre_index: Vec<Vec<usize>>,
}

impl Connectivity {
    /// Validate hand-made adjacency. `post_index` may name any subset of
    /// destinations, each at most once.
    pub fn new(
        pre_size: usize,
        post_size: usize,
        post_index: Vec<usize>,
        pre_index: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if post_index.len() != pre_index.len() {
            return Err(RuntimeError::invalid_config(format!(
                "post_index has {} entries but pre_index has {}",
                post_index.len(),
                pre_index.len()
            )));
        }

        let mut seen = vec![false; post_size];
        for &post in &post_index {
            if post >= post_size {
                return Err(RuntimeError::invalid_config(format!(
                    "destination {} out of range (post size {})",
                    post, post_size
                )));
            }
            if seen[post] {
                return Err(RuntimeError::invalid_config(format!(
                    "destination {} listed twice",
                    post
                )));
            }
            seen[post] = true;
        }

        for (i, sources) in pre_index.iter().enumerate() {
            if let Some(&bad) = sources.iter().find(|&&pre| pre >= pre_size) {
                return Err(RuntimeError::invalid_config(format!(
                    "source {} of destination {} out of range (pre size {})",
                    bad, post_index[i], pre_size
                )));
            }
        }

        Ok(Self {
            pre_size,
            post_size,
            post_index,
            pre_index,
        })
    }

    /// Size of the source population
    pub fn pre_size(&self) -> usize {
        self.pre_size
    }

    /// Size of the destination population
    pub fn post_size(&self) -> usize {
        self.post_size
    }

    /// Active destinations
    pub fn post_index(&self) -> &[usize] {
        &self.post_index
    }

    /// Sources per active destination
    pub fn pre_index(&self) -> &[Vec<usize>] {
        &self.pre_index
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.pre_index.iter().map(Vec::len).sum()
    }

    /// Split into `(post_index, pre_index)`
    pub fn into_parts(self) -> (Vec<usize>, Vec<Vec<usize>>) {
        (self.post_index, self.pre_index)
    }
}

/// Evaluate `pattern` over every (pre, post) pair.
///
/// Destinations are the identity `0..post_size`; a destination without
/// sources keeps an empty list.
pub fn build_connectivity(
    pattern: &dyn ConnectivityPattern,
    pre_size: usize,
    post_size: usize,
    rng: &mut SimRng,
) -> Result<Connectivity> {
    pattern.validate()?;

    let mut pre_index = Vec::with_capacity(post_size);
    for post in 0..post_size {
        let sources: Vec<usize> = (0..pre_size)
            .filter(|&pre| pattern.include(pre, post, rng))
            .collect();
        pre_index.push(sources);
    }

    let connectivity = Connectivity {
        pre_size,
        post_size,
        post_index: (0..post_size).collect(),
        pre_index,
    };

    log::debug!(
        "Built {} connectivity {}x{}: {} edges",
        pattern.name(),
        pre_size,
        post_size,
        connectivity.edge_count()
    );

    Ok(connectivity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_to_all() {
        let c = build_connectivity(&AllToAll, 2, 3, &mut SimRng::default()).unwrap();
        assert_eq!(c.post_index(), &[0, 1, 2]);
        assert_eq!(c.pre_index(), &[vec![0, 1], vec![0, 1], vec![0, 1]]);
        assert_eq!(c.edge_count(), 6);
    }

    #[test]
    fn test_probability_validation() {
        assert!(FixedProbability::new(0.5).is_ok());
        assert!(FixedProbability::new(-0.1).is_err());
        assert!(FixedProbability::new(1.5).is_err());
        assert!(FixedProbability::new(f64::NAN).is_err());

        let bad = FixedProbability { p: 2.0 };
        let err = build_connectivity(&bad, 3, 3, &mut SimRng::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_probability_extremes() {
        let mut rng = SimRng::new(1);
        let none = build_connectivity(&FixedProbability { p: 0.0 }, 5, 4, &mut rng).unwrap();
        assert_eq!(none.edge_count(), 0);
        assert!(none.pre_index().iter().all(Vec::is_empty));

        let all = build_connectivity(&FixedProbability { p: 1.0 }, 5, 4, &mut rng).unwrap();
        assert_eq!(all.edge_count(), 20);
    }

    #[test]
    fn test_seeded_reproducibility() {
        let pattern = FixedProbability { p: 0.3 };
        let a = build_connectivity(&pattern, 40, 30, &mut SimRng::new(99)).unwrap();
        let b = build_connectivity(&pattern, 40, 30, &mut SimRng::new(99)).unwrap();
        let c = build_connectivity(&pattern, 40, 30, &mut SimRng::new(100)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sources_ascending() {
        let c = build_connectivity(&Gaussian { sigma: 3.0 }, 50, 50, &mut SimRng::new(5)).unwrap();
        for sources in c.pre_index() {
            assert!(sources.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_gaussian_self_pair_always_included() {
        // exp(0) == 1.0 and unit() < 1.0
        let c = build_connectivity(&Gaussian { sigma: 0.5 }, 10, 10, &mut SimRng::new(8)).unwrap();
        for (post, sources) in c.pre_index().iter().enumerate() {
            assert!(sources.contains(&post));
        }
        assert!(Gaussian::new(0.0).is_err());
    }

    #[test]
    fn test_dog_negative_probability_never_connects() {
        // sigma2 > sigma1: g1 - g2 <= 0 at every distance
        let dog = DifferenceOfGaussians::new(1.0, 4.0).unwrap();
        for d in 0..10 {
            assert!(dog.probability(d, 0) <= 0.0);
        }
        let c = build_connectivity(&dog, 20, 20, &mut SimRng::new(2)).unwrap();
        assert_eq!(c.edge_count(), 0);
        assert_eq!(c.pre_index().len(), 20);
    }

    #[test]
    fn test_dog_positive_band() {
        let dog = DifferenceOfGaussians::new(4.0, 1.0).unwrap();
        // zero at distance 0, positive further out
        assert_eq!(dog.probability(3, 3), 0.0);
        assert!(dog.probability(0, 3) > 0.0);
        assert!(DifferenceOfGaussians::new(1.0, -1.0).is_err());
    }

    #[test]
    fn test_fn_pattern() {
        let one_to_one = FnPattern::new("one_to_one", |pre, post, _rng: &mut SimRng| pre == post);
        let c = build_connectivity(&one_to_one, 3, 4, &mut SimRng::default()).unwrap();
        assert_eq!(c.pre_index(), &[vec![0], vec![1], vec![2], vec![]]);
        assert_eq!(one_to_one.name(), "one_to_one");
    }

    #[test]
    fn test_empty_groups() {
        let c = build_connectivity(&AllToAll, 0, 2, &mut SimRng::default()).unwrap();
        assert_eq!(c.pre_index(), &[Vec::<usize>::new(), Vec::new()]);
    }

    #[test]
    fn test_manual_connectivity_validation() {
        assert!(Connectivity::new(3, 4, vec![1, 3], vec![vec![0, 2], vec![1]]).is_ok());
        // length mismatch
        assert!(Connectivity::new(3, 4, vec![1], vec![vec![0], vec![1]]).is_err());
        // destination out of range
        assert!(Connectivity::new(3, 4, vec![4], vec![vec![0]]).is_err());
        // duplicate destination
        assert!(Connectivity::new(3, 4, vec![1, 1], vec![vec![0], vec![1]]).is_err());
        // source out of range
        assert!(Connectivity::new(3, 4, vec![0], vec![vec![3]]).is_err());
    }
}
