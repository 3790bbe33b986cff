//! Essence analysis with the videoparser tool.

use tb_core::{Params, Resources, Result};
use tb_worker::workers::{videoparser, VideoparserTool};
use tb_worker::Worker;

use crate::action::{Action, SetupContext};

/// Runs videoparser on input 1 and publishes its report as metadata
/// `infos`. A snapshot is written to `snapshot.jpg` in the working
/// directory.
#[derive(Debug, Default)]
pub struct VideoparserAction;

impl VideoparserAction {
    pub fn create(_params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self))
    }
}

impl Action for VideoparserAction {
    fn name(&self) -> &'static str {
        "videoparser_extract"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let input = ctx.input_path("1")?;
        let snapshot = ctx.working_dir().join("snapshot.jpg");
        let mut worker = ctx.worker(VideoparserTool::analyze(&snapshot));
        worker.add_input_file(input, Params::new())?;
        Ok(vec![worker])
    }

    fn finalize(&mut self, workers: &[Worker], resources: &mut Resources) -> Result<()> {
        let infos = workers
            .first()
            .map(|w| videoparser::parse_metadata(w.stdout()))
            .unwrap_or_default();
        resources.set_metadata("infos", infos.into_value());
        Ok(())
    }
}
