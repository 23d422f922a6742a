// Analysis pipelines and report rendering behind the `dugout` binary.

pub mod pipeline;
pub mod report;
