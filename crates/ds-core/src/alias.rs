//! Vose alias-table sampling over mixture components.
//!
//! Construction is O(k) over the component weights; each draw is O(1):
//! pick a component via the alias table, then sample within it (atom
//! position, uniform over a bin, inverse-CDF for an exponential tail).

use rand::Rng;

use crate::component::{Component, TailSide};

/// Alias table over a fixed component list.
pub struct AliasTable {
    prob: Vec<f64>,
    alias: Vec<usize>,
    components: Vec<Component>,
}

impl AliasTable {
    /// Build the table. Zero-total weights degenerate to the identity
    /// table (every draw returns component 0's position semantics).
    pub fn new(components: Vec<Component>) -> Self {
        let n = components.len();
        if n == 0 {
            return Self { prob: vec![], alias: vec![], components };
        }

        let weights: Vec<f64> = components.iter().map(Component::weight).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Self { prob: vec![1.0; n], alias: (0..n).collect(), components };
        }

        let mut prob: Vec<f64> = weights.iter().map(|w| w / total * n as f64).collect();
        let mut alias: Vec<usize> = vec![0; n];

        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        for (i, &p) in prob.iter().enumerate() {
            if p < 1.0 { small.push(i) } else { large.push(i) }
        }

        while let (Some(&l), Some(&g)) = (small.last(), large.last()) {
            small.pop();
            large.pop();
            alias[l] = g;
            prob[g] = prob[g] + prob[l] - 1.0;
            if prob[g] < 1.0 { small.push(g) } else { large.push(g) }
        }

        // Floating-point residue: whatever survives in either stack is a
        // full slot.
        while let Some(g) = large.pop() {
            prob[g] = 1.0;
        }
        while let Some(l) = small.pop() {
            prob[l] = 1.0;
        }

        Self { prob, alias, components }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Draw one value from the mixture.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.components.is_empty() {
            return 0.0;
        }

        let n = self.components.len();
        let u: f64 = rng.random::<f64>() * n as f64;
        let i = (u as usize).min(n - 1);
        let y = u - i as f64;
        let idx = if y < self.prob[i] { i } else { self.alias[i] };

        match &self.components[idx] {
            Component::Atom { x, .. } => *x,
            Component::Bin { a, b, .. } => a + rng.random::<f64>() * (b - a),
            tail @ Component::Tail { side, x0, .. } => {
                // Exponential inverse CDF; non-exponential families fall
                // back to the anchor.
                match tail.lambda() {
                    Some(lambda) => {
                        let e = -(1.0 - rng.random::<f64>()).ln() / lambda;
                        match side {
                            TailSide::Right => x0 + e,
                            TailSide::Left => x0 - e,
                        }
                    }
                    None => *x0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn empty_table_samples_zero() {
        let table = AliasTable::new(vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(table.sample(&mut rng), 0.0);
    }

    #[test]
    fn single_atom_always_hits() {
        let table = AliasTable::new(vec![Component::Atom { x: 7.5, p: 1.0 }]);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            assert_eq!(table.sample(&mut rng), 7.5);
        }
    }

    #[test]
    fn two_atom_frequencies() {
        let table = AliasTable::new(vec![
            Component::Atom { x: 0.0, p: 0.25 },
            Component::Atom { x: 1.0, p: 0.75 },
        ]);
        let mut rng = StdRng::seed_from_u64(3);
        let n = 100_000;
        let ones = (0..n).filter(|_| table.sample(&mut rng) == 1.0).count();
        let freq = ones as f64 / n as f64;
        // 4-sigma band for a Bernoulli(0.75) over 1e5 draws.
        assert!((freq - 0.75).abs() < 4.0 * (0.75f64 * 0.25 / n as f64).sqrt());
    }

    #[test]
    fn bin_samples_stay_inside() {
        let table = AliasTable::new(vec![Component::Bin {
            a: 2.0,
            b: 5.0,
            p: 1.0,
            repr: 3.5,
            shape: crate::component::BinShape::Uniform,
        }]);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..1000 {
            let x = table.sample(&mut rng);
            assert!((2.0..=5.0).contains(&x));
        }
    }

    #[test]
    fn right_tail_samples_above_anchor() {
        let table =
            AliasTable::new(vec![Component::exp_tail(TailSide::Right, 3.0, 1.0, 2.0).unwrap()]);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            assert!(table.sample(&mut rng) >= 3.0);
        }
    }

    #[test]
    fn zero_weight_degenerates() {
        let table = AliasTable::new(vec![
            Component::Atom { x: 1.0, p: 0.0 },
            Component::Atom { x: 2.0, p: 0.0 },
        ]);
        let mut rng = StdRng::seed_from_u64(6);
        let x = table.sample(&mut rng);
        assert!(x == 1.0 || x == 2.0);
    }
}
