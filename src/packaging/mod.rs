/// Turning a directory of rendered plots into the deliverable artifact
use crate::domain::PlotArtifact;
use crate::errors::{ApiError, ApiResult};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const NO_PLOTS_MESSAGE: &str = "No plots created, check input options";

/// Create a fresh output directory named after `base`, adding a numeric suffix when
/// another request already holds that name
pub fn reserve_dir(base: &Path) -> ApiResult<PathBuf> {
    let mut candidate = base.to_path_buf();
    for attempt in 1..=100 {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let mut name = base.as_os_str().to_owned();
                name.push(format!("_{attempt}"));
                candidate = PathBuf::from(name);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Internal(format!(
        "could not reserve an output directory next to {}",
        base.display()
    )))
}

fn regular_files(dir: &Path) -> ApiResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Write `files` into a zip archive at `archive`, each stored under its file name
pub fn zip_files(files: &[PathBuf], archive: &Path) -> ApiResult<()> {
    let mut zip = ZipWriter::new(File::create(archive)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::Internal(format!("no file name in {}", path.display())))?;
        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;
    debug!(
        "Zipped file: {} ({} bytes)",
        archive.display(),
        fs::metadata(archive)?.len()
    );
    Ok(())
}

/// Zip every regular file directly inside `dir`
pub fn zip_dir(dir: &Path, archive: &Path) -> ApiResult<()> {
    let files = regular_files(dir)?;
    zip_files(&files, archive)
}

/// Decide what a plot request hands back: nothing, a single image, or a zip of all images
pub fn package(outdir: &Path, run_id: &str) -> ApiResult<PlotArtifact> {
    if !outdir.is_dir() {
        debug!("Did not create any plots");
        return Ok(no_plots());
    }

    let mut files = regular_files(outdir)?;
    match files.len() {
        0 => {
            debug!("Did not create any plots");
            Ok(no_plots())
        }
        1 => {
            debug!("Only one output plot");
            Ok(PlotArtifact::Image {
                path: files.remove(0),
            })
        }
        _ => {
            let archive = outdir.join(format!("{run_id}_plots.zip"));
            zip_files(&files, &archive)?;
            Ok(PlotArtifact::Archive { path: archive })
        }
    }
}

fn no_plots() -> PlotArtifact {
    PlotArtifact::NoPlots {
        message: NO_PLOTS_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::ZipArchive;

    #[test]
    fn test_missing_dir_means_no_plots() {
        let root = tempfile::tempdir().unwrap();
        let artifact = package(&root.path().join("plots_1"), "run").unwrap();
        assert_eq!(
            artifact,
            PlotArtifact::NoPlots {
                message: NO_PLOTS_MESSAGE.to_string()
            }
        );
        assert_eq!(artifact.media_type(), "text/plain");
    }

    #[test]
    fn test_empty_dir_means_no_plots() {
        let root = tempfile::tempdir().unwrap();
        let artifact = package(root.path(), "run").unwrap();
        assert!(matches!(artifact, PlotArtifact::NoPlots { .. }));
    }

    #[test]
    fn test_single_file_returned_as_image() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.png"), b"png").unwrap();
        let artifact = package(root.path(), "run").unwrap();
        assert_eq!(
            artifact,
            PlotArtifact::Image {
                path: root.path().join("a.png")
            }
        );
    }

    #[test]
    fn test_multiple_files_zipped() {
        let root = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            fs::write(root.path().join(name), name.as_bytes()).unwrap();
        }
        let artifact = package(root.path(), "run7").unwrap();
        let PlotArtifact::Archive { path } = artifact else {
            panic!("expected an archive");
        };
        assert_eq!(path, root.path().join("run7_plots.zip"));

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);

        let mut contents = String::new();
        io::Read::read_to_string(&mut archive.by_name("b.png").unwrap(), &mut contents).unwrap();
        assert_eq!(contents, "b.png");
    }

    #[test]
    fn test_reserve_dir_adds_suffix() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("plots_1700000000");
        let first = reserve_dir(&base).unwrap();
        let second = reserve_dir(&base).unwrap();
        assert_eq!(first, base);
        assert_eq!(second, root.path().join("plots_1700000000_1"));
        assert!(second.is_dir());
    }
}
