pub mod fingerprint;
pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use fingerprint::fingerprint;
pub use image_ops::{
    encode_png_async,
    fetch_image_bytes,
    load_image_from_memory_async,
    open_page_image,
    prepare_page_image,
};
pub use metrics::{Metrics, MetricsSnapshot};
