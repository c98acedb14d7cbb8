pub(crate) mod controller;
pub(crate) mod loop_worker;
pub mod phash;

pub(crate) use controller::SensingController;
pub(crate) use loop_worker::PipelineCtx;
