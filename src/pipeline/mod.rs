pub mod controller;
pub mod events;
pub mod state;
pub mod store;

pub use controller::{ControllerOptions, ExportRequest, PipelineController, PipelineRequest};
pub use events::PipelineEvent;
pub use state::PipelineState;
pub use store::{finalize, unique_result_path, PipelineResult, ResultStore};
