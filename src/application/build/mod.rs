//! The build sequence: generate every edition, capture every edition, then
//! publish every edition. Each phase hands the next an explicit result value.

pub mod batch;
pub mod layout;
pub mod pool;
pub mod publish;
pub mod run;

pub use batch::{BatchError, BatchOrchestrator, CaptureOptions, CapturedBatch, GeneratedBatch};
pub use layout::BuildLayout;
pub use pool::{BoundedPool, CancelHandle, CancelSignal, cancellation};
pub use publish::{
    PublicationOrchestrator, PublishError, PublishFailure, PublishFailureCause, PublishOptions,
    PublishReport,
};
pub use run::{BuildError, BuildOutcome, BuildPlan, BuildSequence};

pub const METRIC_RENDER_TOTAL: &str = "pressrun_render_total";
pub const METRIC_RENDER_MS: &str = "pressrun_render_ms";
pub const METRIC_UPLOAD_TOTAL: &str = "pressrun_upload_total";
pub const METRIC_UPLOAD_FAILED_TOTAL: &str = "pressrun_upload_failed_total";
pub const METRIC_UPLOAD_MS: &str = "pressrun_upload_ms";
