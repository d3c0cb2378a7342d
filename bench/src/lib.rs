//! Benchmarks live in `benches/`; run with `cargo bench -p seqface-bench`.
