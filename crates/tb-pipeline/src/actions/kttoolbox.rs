//! Subtitle extraction with kt-toolbox.

use std::path::{Path, PathBuf};

use tb_core::{Params, Resources, Result, Section};
use tb_worker::workers::{kttoolbox, KtToolboxTool};
use tb_worker::Worker;

use crate::action::{Action, SetupContext};

use super::file_payload;

/// Extracts STL tracks from input 1 into the working directory.
///
/// Every track announced by the tool is published as output `N` and as
/// metadata `kttoolbox_extract-track_N_path`. A `track_N_path` parameter
/// moves track `N` to that path, relative to the working directory.
#[derive(Debug)]
pub struct KtToolboxAction {
    params: Params,
    working_dir: Option<PathBuf>,
}

impl KtToolboxAction {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            working_dir: None,
        }
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::new(params.clone())))
    }

    fn place(&self, track: &str, produced: &Path) -> Result<PathBuf> {
        let (Some(dest), Some(dir)) = (
            self.params.path(&format!("track_{track}_path")),
            self.working_dir.as_deref(),
        ) else {
            return Ok(produced.to_path_buf());
        };
        let dest = dir.join(dest);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(produced, &dest)?;
        tracing::debug!("Moved track {track} to {}", dest.display());
        Ok(dest)
    }
}

impl Action for KtToolboxAction {
    fn name(&self) -> &'static str {
        "kttoolbox_extract"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let input = ctx.input_path("1")?;
        let mut worker = ctx.worker(KtToolboxTool::from_params(&self.params));
        worker.add_input_file(input, Params::new())?;
        worker.add_output_file(ctx.working_dir(), Params::new())?;
        self.working_dir = Some(ctx.working_dir().to_path_buf());
        Ok(vec![worker])
    }

    fn finalize(&mut self, workers: &[Worker], resources: &mut Resources) -> Result<()> {
        let Some(worker) = workers.first() else {
            return Ok(());
        };
        let mut tracks: Vec<(String, String)> =
            kttoolbox::parse_outputs(worker.stdout()).into_iter().collect();
        tracks.sort_by_key(|(n, _)| n.parse::<u64>().unwrap_or(u64::MAX));

        for (track, produced) in tracks {
            let path = self.place(&track, Path::new(&produced))?;
            resources.set_metadata(
                format!("kttoolbox_extract-track_{track}_path"),
                path.to_string_lossy().into_owned(),
            );
            resources.update(Section::Outputs, track, &file_payload(&path));
        }
        Ok(())
    }
}
