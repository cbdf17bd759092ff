//! Criterion benchmarks for the Nestling hot paths. See `benches/`.
