/// Partitioning of a run's raw output files into independently plotted groups
use crate::errors::{ApiError, ApiResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tracing::debug;

/// One group of output files, copied into its own staging directory.
///
/// The staging directory is removed when the group is dropped.
#[derive(Debug)]
pub struct OutputGroup {
    pub index: u32,
    pub files: Vec<PathBuf>,
    staging: TempDir,
}

impl OutputGroup {
    pub fn dir(&self) -> &Path {
        self.staging.path()
    }

    /// Remove the staging directory, reporting any failure
    pub fn close(self) -> ApiResult<()> {
        self.staging.close()?;
        Ok(())
    }
}

fn group_token() -> &'static Regex {
    static GROUP: OnceLock<Regex> = OnceLock::new();
    GROUP.get_or_init(|| Regex::new(r"_group([0-9]+)").expect("valid group token regex"))
}

/// Group index embedded in an output file name as `_group<N>`
pub fn group_index(filename: &str) -> ApiResult<u32> {
    group_token()
        .captures(filename)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| {
            ApiError::MalformedOutput(format!("Cannot identify group number in {filename}"))
        })
}

pub fn is_output_file(filename: &str) -> bool {
    filename.contains("_group") && filename.ends_with(".txt")
}

/// Every `*_group*.txt` file in `dir`, sorted by name
pub fn find_output_files(dir: &Path) -> ApiResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ApiError::DataNotFound(format!("Cannot read output directory {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_file() && is_output_file(&name.to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ApiError::DataNotFound(
            "Unable to find any output files. File names must be named \"*_group*.txt\""
                .to_string(),
        ));
    }
    Ok(files)
}

/// Copy every `.txt` output into a fresh staging directory per group index.
///
/// Groups come back ordered by index. A text file without a group token fails the
/// whole staging and any directories created so far are removed.
pub fn stage_groups(
    outputs_dir: &Path,
    staging_root: Option<&Path>,
) -> ApiResult<BTreeMap<u32, OutputGroup>> {
    let mut names: Vec<String> = fs::read_dir(outputs_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".txt"))
        .collect();
    names.sort();

    let mut groups: BTreeMap<u32, OutputGroup> = BTreeMap::new();
    for name in names {
        let index = group_index(&name)?;

        if !groups.contains_key(&index) {
            let prefix = format!("group{index}_");
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            let staging = match staging_root {
                Some(root) => builder.tempdir_in(root)?,
                None => builder.tempdir()?,
            };
            debug!("staging group {index} in {}", staging.path().display());
            groups.insert(
                index,
                OutputGroup {
                    index,
                    files: Vec::new(),
                    staging,
                },
            );
        }

        if let Some(group) = groups.get_mut(&index) {
            let target = group.dir().join(&name);
            fs::copy(outputs_dir.join(&name), &target)?;
            group.files.push(target);
        }
    }
    Ok(groups)
}
