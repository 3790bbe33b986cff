//! Streaming hinters: `qt-faststart` for mp4/mov and `flvtool2` for flv.

use std::path::{Path, PathBuf};

use tb_core::{Error, Params, Result};

use crate::worker::{FileSpec, Options, Tool};

pub const QT_FASTSTART_NAME: &str = "qt-faststart";
pub const FLVTOOL2_NAME: &str = "flvtool2";

/// `qt-faststart IN OUT`: moves the moov atom to the head of the file.
#[derive(Debug, Clone, Default)]
pub struct QtFaststartTool {
    options: Options,
}

impl QtFaststartTool {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Hinted sibling of `path`: `<stem>-hint<.ext>`.
pub fn hinted_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-hint.{}", ext.to_string_lossy()),
        None => format!("{stem}-hint"),
    };
    path.with_file_name(name)
}

fn single(tool: &str, kind: &str, existing: &[FileSpec]) -> Result<()> {
    if existing.is_empty() {
        Ok(())
    } else {
        Err(Error::argument(tool, format!("{tool} only supports one {kind} file")))
    }
}

impl Tool for QtFaststartTool {
    fn name(&self) -> &str {
        QT_FASTSTART_NAME
    }

    fn accept_input(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        single(QT_FASTSTART_NAME, "input", existing)
    }

    fn accept_output(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        single(QT_FASTSTART_NAME, "output", existing)
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        let (Some(input), Some(output)) = (inputs.first(), outputs.first()) else {
            return Err(Error::argument(QT_FASTSTART_NAME, "requires one input and one output file"));
        };
        let mut args = self.options.to_args();
        args.push(input.path_str());
        args.push(output.path_str());
        Ok(args)
    }
}

/// `flvtool2 [-U] IN [OUT]`; with `-U` the input is updated in place.
#[derive(Debug, Clone, Default)]
pub struct Flvtool2Tool {
    options: Options,
}

impl Flvtool2Tool {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-place metadata update, used for hinting.
    pub fn update() -> Self {
        let mut tool = Self::new();
        tool.options.flag("-U");
        tool
    }
}

impl Tool for Flvtool2Tool {
    fn name(&self) -> &str {
        FLVTOOL2_NAME
    }

    fn accept_input(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        single(FLVTOOL2_NAME, "input", existing)
    }

    fn accept_output(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        single(FLVTOOL2_NAME, "output", existing)
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        let input = inputs
            .first()
            .ok_or_else(|| Error::argument(FLVTOOL2_NAME, "no input file specified"))?;
        let mut args = self.options.to_args();
        args.push(input.path_str());
        args.extend(outputs.iter().map(FileSpec::path_str));
        Ok(args)
    }
}

/// Output spec for a hinted copy of `path`.
pub fn hinted_output(path: &Path) -> FileSpec {
    FileSpec::new(hinted_path(path), Params::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> FileSpec {
        FileSpec::new(path, Params::new())
    }

    #[test]
    fn hint_names() {
        assert_eq!(hinted_path(Path::new("/w/clip.mp4")), PathBuf::from("/w/clip-hint.mp4"));
        assert_eq!(hinted_path(Path::new("/w/clip")), PathBuf::from("/w/clip-hint"));
    }

    #[test]
    fn faststart_args() {
        let tool = QtFaststartTool::new();
        let args = tool
            .build_args(Path::new("/w"), &[file("/w/a.mov")], &[hinted_output(Path::new("/w/a.mov"))])
            .unwrap();
        assert_eq!(args, ["/w/a.mov", "/w/a-hint.mov"]);
        assert!(tool.build_args(Path::new("/w"), &[file("/w/a.mov")], &[]).is_err());
    }

    #[test]
    fn faststart_single_files() {
        let mut tool = QtFaststartTool::new();
        assert!(tool.accept_input(&[file("/a")], &file("/b")).is_err());
        assert!(tool.accept_output(&[file("/a")], &file("/b")).is_err());
    }

    #[test]
    fn flvtool2_update_in_place() {
        let tool = Flvtool2Tool::update();
        let args = tool.build_args(Path::new("/w"), &[file("/w/a.flv")], &[]).unwrap();
        assert_eq!(args, ["-U", "/w/a.flv"]);
        assert!(tool.build_args(Path::new("/w"), &[], &[]).is_err());
    }
}
