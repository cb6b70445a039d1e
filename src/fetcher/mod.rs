pub mod parallel;

pub use parallel::ParallelFetcher;
