pub mod page;
pub mod pipeline;

pub use page::{Page, PageLoader, PageSnapshot, PageStatus, RedrawSignal};
pub use pipeline::{PagePipeline, PipelineView, SelectedText};
