pub const PROCESSED_ROUTE: &str = "/static/processed";

pub const PROCESSED_FILE_PREFIX: &str = "processed";

pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

pub const VALID_IMAGE_EXTENSIONS: &'static [&'static str] = &[
    "jpg", "jpeg", "jfif", "jpe", "png", "tif", "tiff", "webp", "bmp", "gif",
];

use std::sync::LazyLock;
use std::thread::available_parallelism;

use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> =
    LazyLock::new(|| available_parallelism().map(|n| n.get()).unwrap_or(1));

// Rocket-specific Tokio Runtime
// Every request, including its remote calls to the analysis server, runs here.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});
