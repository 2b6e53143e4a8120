//! Conditional parallel iteration helpers.
//!
//! With the `parallel` feature these run on rayon; without it they fall back
//! to plain sequential iterators. Output order always matches input order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map every item of a Vec, returning results in input order.
#[cfg(feature = "parallel")]
pub fn map_vec<T, R, F>(items: Vec<T>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    items.into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub fn map_vec<T, R, F>(items: Vec<T>, f: F) -> Vec<R>
where
    F: Fn(T) -> R,
{
    items.into_iter().map(f).collect()
}

/// Map every index of a range, returning results in index order.
#[cfg(feature = "parallel")]
pub fn map_range<R, F>(range: std::ops::Range<usize>, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    range.into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub fn map_range<R, F>(range: std::ops::Range<usize>, f: F) -> Vec<R>
where
    F: Fn(usize) -> R,
{
    range.into_iter().map(f).collect()
}

/// Run `f` inside a pool limited to `num_threads` workers (0 = all cores).
#[cfg(feature = "parallel")]
pub fn with_thread_limit<R, F>(num_threads: usize, f: F) -> anyhow::Result<R>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;
    Ok(pool.install(f))
}

#[cfg(not(feature = "parallel"))]
pub fn with_thread_limit<R, F>(_num_threads: usize, f: F) -> anyhow::Result<R>
where
    F: FnOnce() -> R,
{
    Ok(f())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_range_preserves_order() {
        let out = map_range(0..100, |i| i * 2);
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn thread_limit_runs_closure() {
        let out = with_thread_limit(2, || map_vec(vec![1, 2, 3], |x| x + 1)).unwrap();
        assert_eq!(out, vec![2, 3, 4]);
    }
}
