//! On-disk layout for uploads and finished timelapses.
//!
//! Two directories on the same filesystem:
//!
//! - the **upload directory** holds published outputs (`<base>_timelapse.mp4`) and is the only one
//!   served over HTTP;
//! - the **work directory** holds per-request files named `<request-id>_<name>`, so concurrent
//!   uploads of the same filename never touch each other's bytes.
//!
//! A finished output is moved into the upload directory with a single rename, which replaces any
//! previous output of the same name atomically.

use crate::config::StorageConfig;
use crate::errors::{Error, Result};
use scopeguard::ScopeGuard;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Suffix appended to the base name of every output.
pub const OUTPUT_SUFFIX: &str = "_timelapse.mp4";

/// Reduce an uploaded filename to a token safe to use as a single path component.
///
/// The name is NFKD-normalized so accented letters keep their base letter, then path separators
/// become spaces, runs of whitespace become `_`, anything outside `[A-Za-z0-9_.-]` is dropped and
/// leading/trailing `.`/`_` are trimmed. Returns `None` when nothing is left.
pub fn sanitize_filename(file_name: &str) -> Option<String> {
    let spaced: String = file_name
        .nfkd()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `clip.mov` -> `clip_timelapse.mp4`. Expects a sanitized name.
pub fn output_name(sanitized: &str) -> String {
    let base = Path::new(sanitized)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| sanitized.to_string());
    format!("{base}{OUTPUT_SUFFIX}")
}

/// Files belonging to one upload request.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    /// Staged upload
    pub input: PathBuf,
    /// Where the transcoder writes
    pub output: PathBuf,
    /// Public file name of the finished output
    pub output_name: String,
    /// Public location of the finished output
    pub published: PathBuf,
}

impl Job {
    /// Best-effort removal of this job's work files. Failures are logged, never returned.
    pub fn discard(self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(job_id = %self.id, path = %path.display(), "Removed work file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(job_id = %self.id, path = %path.display(), error = %e, "Failed to remove work file"),
            }
        }
    }
}

/// A job whose work files are removed when it goes out of scope.
pub type StagedJob = ScopeGuard<Job, fn(Job)>;

#[derive(Debug, Clone)]
pub struct Workspace {
    upload_dir: PathBuf,
    work_dir: PathBuf,
}

impl Workspace {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create both directories if they are missing.
    pub async fn prepare(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.work_dir] {
            fs::create_dir_all(dir).await.map_err(|source| Error::Io {
                operation: "create directory",
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Allocate work paths for an upload whose sanitized name is `sanitized`.
    ///
    /// Nothing is written yet; the returned guard removes whatever ends up at the work paths
    /// unless it is explicitly released.
    pub fn stage(&self, id: Uuid, sanitized: &str) -> StagedJob {
        let output_name = output_name(sanitized);
        let job = Job {
            id,
            input: self.work_dir.join(format!("{id}_{sanitized}")),
            output: self.work_dir.join(format!("{id}_{output_name}")),
            published: self.upload_dir.join(&output_name),
            output_name,
        };
        scopeguard::guard(job, Job::discard as fn(Job))
    }

    /// Open the staged input for writing, recreating the work directory if needed.
    pub async fn create_input(&self, job: &Job) -> Result<fs::File> {
        fs::create_dir_all(&self.work_dir).await.map_err(|source| Error::Io {
            operation: "create directory",
            path: self.work_dir.clone(),
            source,
        })?;
        fs::File::create(&job.input).await.map_err(|source| Error::Io {
            operation: "create upload file",
            path: job.input.clone(),
            source,
        })
    }

    /// Delete a previously published output with the same name, if any.
    pub async fn remove_stale_output(&self, job: &Job) -> Result<()> {
        match fs::remove_file(&job.published).await {
            Ok(()) => {
                debug!(job_id = %job.id, path = %job.published.display(), "Removed stale output");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Io {
                operation: "remove stale output",
                path: job.published.clone(),
                source,
            }),
        }
    }

    /// Move a finished output to its public name and delete the staged input.
    pub async fn publish(&self, job: StagedJob) -> Result<PathBuf> {
        fs::create_dir_all(&self.upload_dir).await.map_err(|source| Error::Io {
            operation: "create directory",
            path: self.upload_dir.clone(),
            source,
        })?;
        fs::rename(&job.output, &job.published).await.map_err(|source| Error::Io {
            operation: "publish output",
            path: job.published.clone(),
            source,
        })?;

        let job = ScopeGuard::into_inner(job);
        if let Err(e) = fs::remove_file(&job.input).await {
            warn!(job_id = %job.id, path = %job.input.display(), error = %e, "Failed to remove uploaded input");
        }

        Ok(job.published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(&StorageConfig {
            upload_dir: root.join("videos"),
            work_dir: root.join(".work"),
            ..StorageConfig::default()
        })
    }

    #[test]
    fn test_sanitize_plain_names() {
        assert_eq!(sanitize_filename("clip.mov").as_deref(), Some("clip.mov"));
        assert_eq!(sanitize_filename("My Holiday Video.mp4").as_deref(), Some("My_Holiday_Video.mp4"));
        assert_eq!(sanitize_filename("take (2).MOV").as_deref(), Some("take_2.MOV"));
        assert_eq!(sanitize_filename("über-clip.mkv").as_deref(), Some("uber-clip.mkv"));
        assert_eq!(sanitize_filename("café.mp4").as_deref(), Some("cafe.mp4"));
        assert_eq!(sanitize_filename("ﬁnal Ｃut.mov").as_deref(), Some("final_Cut.mov"));
    }

    #[test]
    fn test_sanitize_strips_path_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(sanitize_filename("/var/tmp/clip.mov").as_deref(), Some("var_tmp_clip.mov"));
        assert_eq!(sanitize_filename("..\\..\\windows\\clip.avi").as_deref(), Some("windows_clip.avi"));
        assert_eq!(sanitize_filename(".hidden").as_deref(), Some("hidden"));
    }

    #[test]
    fn test_sanitize_to_nothing() {
        for name in ["", "..", "../", "/", "   ", "***", "._.", "日本語"] {
            assert_eq!(sanitize_filename(name), None, "name {name:?}");
        }
    }

    #[test]
    fn test_sanitized_names_are_single_components() {
        for name in ["../../etc/passwd", "a/../../b", "..\\x", "./././y.mp4"] {
            let sanitized = sanitize_filename(name).unwrap();
            let path = Path::new(&sanitized);
            assert_eq!(path.components().count(), 1, "{sanitized}");
            assert!(matches!(path.components().next(), Some(std::path::Component::Normal(_))), "{sanitized}");
        }
    }

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("clip.mov"), "clip_timelapse.mp4");
        assert_eq!(output_name("clip"), "clip_timelapse.mp4");
        assert_eq!(output_name("archive.tar.gz"), "archive.tar_timelapse.mp4");
        assert_eq!(output_name("clip_timelapse.mp4"), "clip_timelapse_timelapse.mp4");
    }

    #[test]
    fn test_stage_paths_are_keyed_on_request_id() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let first = ws.stage(Uuid::new_v4(), "clip.mov");
        let second = ws.stage(Uuid::new_v4(), "clip.mov");

        assert_ne!(first.input, second.input);
        assert_ne!(first.output, second.output);
        assert_eq!(first.published, second.published);
        assert_eq!(first.published, root.path().join("videos").join("clip_timelapse.mp4"));
        assert!(first.input.starts_with(root.path().join(".work")));
    }

    #[tokio::test]
    async fn test_dropped_job_removes_work_files() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        ws.prepare().await.unwrap();

        let job = ws.stage(Uuid::new_v4(), "clip.mov");
        let (input, output) = (job.input.clone(), job.output.clone());
        drop(ws.create_input(&job).await.unwrap());
        std::fs::write(&output, b"partial").unwrap();

        drop(job);

        assert!(!input.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_publish_replaces_previous_output() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        ws.prepare().await.unwrap();

        for content in [b"first".as_slice(), b"second".as_slice()] {
            let job = ws.stage(Uuid::new_v4(), "clip.mov");
            std::fs::write(&job.input, b"upload").unwrap();
            std::fs::write(&job.output, content).unwrap();
            let input = job.input.clone();

            let published = ws.publish(job).await.unwrap();

            assert_eq!(std::fs::read(&published).unwrap(), content);
            assert!(!input.exists());
        }

        let leftovers: Vec<_> = std::fs::read_dir(ws.work_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_output_fails_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        ws.prepare().await.unwrap();

        let job = ws.stage(Uuid::new_v4(), "clip.mov");
        let input = job.input.clone();
        std::fs::write(&input, b"upload").unwrap();

        let err = ws.publish(job).await.unwrap_err();

        assert!(matches!(err, Error::Io { operation: "publish output", .. }));
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_remove_stale_output() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        ws.prepare().await.unwrap();

        let job = ws.stage(Uuid::new_v4(), "clip.mov");
        // Nothing to remove is fine
        ws.remove_stale_output(&job).await.unwrap();

        std::fs::write(&job.published, b"old").unwrap();
        ws.remove_stale_output(&job).await.unwrap();
        assert!(!job.published.exists());
    }
}
