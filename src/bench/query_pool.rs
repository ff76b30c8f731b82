//! Synthetic query vectors shared read-only by every worker of a level.

use rand::Rng;

/// Fixed-size pool of random query vectors
#[derive(Debug, Clone)]
pub struct QueryPool {
    dimension: usize,
    queries: Vec<Vec<f32>>,
}

impl QueryPool {
    /// Generate `pool_size` vectors of `dimension` uniform floats in `[0, 1)`
    pub fn generate(pool_size: usize, dimension: usize) -> Self {
        Self::generate_with_rng(pool_size, dimension, &mut rand::thread_rng())
    }

    /// Generate the pool from a caller-supplied RNG
    pub fn generate_with_rng<R: Rng + ?Sized>(
        pool_size: usize,
        dimension: usize,
        rng: &mut R,
    ) -> Self {
        let queries = (0..pool_size)
            .map(|_| (0..dimension).map(|_| rng.gen::<f32>()).collect())
            .collect();
        Self { dimension, queries }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, index: usize) -> &[f32] {
        &self.queries[index]
    }

    /// Independent cursor over the pool, starting at index 0
    pub fn cursor(&self) -> PoolCursor {
        PoolCursor {
            next: 0,
            len: self.queries.len(),
        }
    }
}

/// Yields pool indices `0, 1, ..., len-1, 0, 1, ...` forever
#[derive(Debug, Clone)]
pub struct PoolCursor {
    next: usize,
    len: usize,
}

impl Iterator for PoolCursor {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let current = self.next;
        self.next = (self.next + 1) % self.len;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_shape_and_range() {
        let pool = QueryPool::generate(50, 16);
        assert_eq!(pool.len(), 50);
        assert_eq!(pool.dimension(), 16);
        for i in 0..pool.len() {
            let q = pool.get(i);
            assert_eq!(q.len(), 16);
            assert!(q.iter().all(|v| (0.0..1.0).contains(v)));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = QueryPool::generate_with_rng(4, 8, &mut StdRng::seed_from_u64(7));
        let b = QueryPool::generate_with_rng(4, 8, &mut StdRng::seed_from_u64(7));
        for i in 0..4 {
            assert_eq!(a.get(i), b.get(i));
        }
    }

    #[test]
    fn test_cursor_wraps_without_skips() {
        let pool = QueryPool::generate(3, 2);
        let indices: Vec<usize> = pool.cursor().take(8).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_cursors_are_independent() {
        let pool = QueryPool::generate(5, 2);
        let mut first = pool.cursor();
        first.next();
        first.next();
        let mut second = pool.cursor();
        assert_eq!(second.next(), Some(0));
        assert_eq!(first.next(), Some(2));
    }

    #[test]
    fn test_empty_pool_cursor_yields_nothing() {
        let pool = QueryPool::generate(0, 4);
        assert!(pool.is_empty());
        assert_eq!(pool.cursor().next(), None);
    }
}
