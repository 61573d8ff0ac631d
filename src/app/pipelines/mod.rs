pub mod companies_pipeline;
pub mod overlay_pipeline;
pub mod postcode_pipeline;
pub mod template_pipeline;

pub use companies_pipeline::CompaniesPipeline;
pub use overlay_pipeline::OverlayPipeline;
pub use postcode_pipeline::PostcodePipeline;
pub use template_pipeline::TemplatePipeline;
