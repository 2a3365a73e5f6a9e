//! Utility functions.

use std::thread;

/// Number of CPUs available to this process, at least one.
pub fn available_jobs() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Resolver workers for `jobs` scanners: one per eight, at least one.
/// Resolving a unit costs roughly eight times as much as scanning it.
pub fn resolver_workers(jobs: usize) -> usize {
    (jobs / 8).max(1)
}

/// Splits a comma-separated list, dropping empty items.
pub fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_ratio() {
        assert_eq!(resolver_workers(1), 1);
        assert_eq!(resolver_workers(7), 1);
        assert_eq!(resolver_workers(16), 2);
        assert_eq!(resolver_workers(64), 8);
    }

    #[test]
    fn splits_comma_lists() {
        let items: Vec<_> = split_list("/a, /b,,/c ").collect();
        assert_eq!(items, vec!["/a", "/b", "/c"]);
        assert_eq!(split_list("").count(), 0);
    }
}
