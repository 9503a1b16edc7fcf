pub mod export;

pub use export::{
    default_output_base, export_audio, reconstruct, resolve_output, ExportPlan, OutputFormat, Reconstruction,
};
