//! Benchmark harness utilities.

use std::sync::Arc;
use throttled_lb::modules::load_balancer::Backend;

/// Create a multi-threaded Tokio runtime for async benchmarks.
pub fn bench_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime for benchmarks")
}

/// `count` backends on distinct private addresses, all healthy.
pub fn backends(count: usize) -> Vec<Arc<Backend>> {
    (0..count)
        .map(|i| {
            let address = format!("http://10.{}.{}.{}:8080", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff);
            Arc::new(Backend::parse(&address).expect("valid backend address"))
        })
        .collect()
}

/// Mark every `stride`-th backend unhealthy.
pub fn degrade(backends: &[Arc<Backend>], stride: usize) {
    for backend in backends.iter().step_by(stride.max(1)) {
        backend.set_healthy(false);
    }
}

/// Client identifiers `client-0 .. client-{count}`.
pub fn client_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("client-{i}")).collect()
}

/// Standard benchmark sizes.
pub struct BenchSizes;

impl BenchSizes {
    /// Backend pool sizes.
    pub const POOLS: [usize; 4] = [3, 10, 50, 200];
    /// Distinct client counts.
    pub const CLIENTS: [usize; 3] = [1, 100, 10_000];
}
