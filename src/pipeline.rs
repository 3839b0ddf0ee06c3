//! Batch orchestration: toast every input, then publish.
//!
//! For each configured input image:
//!
//! 1. load the source and pick a depth from its longest edge
//! 2. build the pyramid into `<work_dir>/<name>_toast/`
//! 3. write `thumb.jpg` and `index_rel.wtml`
//! 4. rewrite `index_rel.wtml` to `index.wtml` against the base URL
//!
//! Once every image is toasted, each output directory is published into
//! `public_dir`. Images are handled one at a time; the tiling inside one image
//! runs on the rayon pool.
//!
//! ## Failures
//!
//! Any failure aborts the run unless `keep_going` is set, in which case the
//! image is recorded as failed in the [`PipelineReport`], skipped at publish
//! time, and the next image is processed. A failed build never leaves a
//! partial output directory behind.
//!
//! ## Progress
//!
//! Callers may pass an `mpsc::Sender<PipelineEvent>`; the CLI drains it on a
//! printer thread through [`crate::output::format_pipeline_event`].

use crate::config::{ConfigError, PipelineConfig};
use crate::imaging::{
    ImagingError, PlateCarreeSampler, Quality, SourceImage, toast_depth, write_thumbnail,
};
use crate::naming::{NamingError, OutputNames, check_unique, output_names};
use crate::publish::{PublishError, publish};
use crate::rewrite::{ManifestRewriter, RewriteError, verify_absolute};
use crate::toast::{BuildError, PyramidBackend, PyramidIo, TileSet};
use crate::wtml::{ABSOLUTE_MANIFEST, ImageSetManifest, RELATIVE_MANIFEST, THUMBNAIL_FILE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("{0}")]
    Imaging(#[from] ImagingError),
    #[error("Pyramid build failed: {0}")]
    Build(#[from] BuildError),
    #[error("Manifest rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// One input image and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub names: OutputNames,
    /// `<work_dir>/<names.dir>`
    pub output_dir: PathBuf,
    pub base_url: String,
}

/// Progress events sent while the pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ImageStarted {
        index: usize,
        total: usize,
        input: PathBuf,
    },
    ImageLoaded {
        width: u32,
        height: u32,
        channels: u8,
        depth: u32,
    },
    LevelWritten {
        level: u32,
        tiles: u64,
    },
    ManifestRewritten {
        base_url: String,
        rewriter: String,
    },
    ImageToasted {
        input: PathBuf,
        output_dir: PathBuf,
        tiles: u64,
    },
    ImageFailed {
        input: PathBuf,
        error: String,
    },
    Published {
        from: PathBuf,
        to: PathBuf,
    },
}

/// Outcome for one input image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub input: PathBuf,
    pub dataset: String,
    pub output_dir: PathBuf,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles: Option<TileSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageReport {
    fn new(job: &Job) -> Self {
        Self {
            input: job.input.clone(),
            dataset: job.names.dataset.clone(),
            output_dir: job.output_dir.clone(),
            base_url: job.base_url.clone(),
            tiles: None,
            published: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run, serialisable for `--json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub images: Vec<ImageReport>,
}

impl PipelineReport {
    pub fn failed(&self) -> usize {
        self.images.iter().filter(|i| !i.succeeded()).count()
    }
}

/// What [`run`] does after toasting.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Record per-image failures and continue instead of aborting.
    pub keep_going: bool,
    /// Move finished output into the public directory.
    pub publish: bool,
}

fn emit(events: Option<&Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

/// Derive jobs for every configured input, rejecting name collisions.
pub fn plan(config: &PipelineConfig) -> Result<Vec<Job>, PipelineError> {
    let jobs = config
        .input_paths()
        .into_iter()
        .map(|input| {
            let names = output_names(&input, &config.naming)?;
            Ok(Job {
                output_dir: config.work_dir().join(&names.dir),
                base_url: names.base_url(&config.naming.url_prefix),
                input,
                names,
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;
    check_unique(jobs.iter().map(|j| (j.input.as_path(), &j.names)))?;
    Ok(jobs)
}

fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Everything after loading: pyramid, thumbnail, both manifests.
fn write_output(
    job: &Job,
    config: &PipelineConfig,
    source: &SourceImage,
    depth: u32,
    backend: &impl PyramidBackend,
    rewriter: &dyn ManifestRewriter,
    events: Option<&Sender<PipelineEvent>>,
) -> Result<TileSet, PipelineError> {
    let quality = Quality::new(config.tiles.quality);
    let io = PyramidIo::new(&job.output_dir, config.tiles.format).with_quality(quality);
    let sampler = PlateCarreeSampler::new(source.pixels(), config.sampler.frame);

    let tiles = backend.build(&sampler, depth, &io, &mut |level, tiles| {
        emit(events, PipelineEvent::LevelWritten { level, tiles });
    })?;

    let thumbnail = &config.thumbnail;
    if thumbnail.enabled {
        write_thumbnail(
            source.pixels(),
            &job.output_dir.join(THUMBNAIL_FILE),
            thumbnail.width,
            thumbnail.height,
            quality,
        )?;
    }

    let relative = job.output_dir.join(RELATIVE_MANIFEST);
    ImageSetManifest {
        name: job.names.dataset.clone(),
        tile_levels: depth,
        url: io.url_template(),
        file_type: config.tiles.format.wtml_file_type(),
        thumbnail_url: thumbnail.enabled.then(|| THUMBNAIL_FILE.to_string()),
    }
    .write(&relative)?;

    let absolute = job.output_dir.join(ABSOLUTE_MANIFEST);
    rewriter.rewrite(&relative, &job.base_url, &absolute)?;
    verify_absolute(&absolute, &job.base_url)?;
    emit(
        events,
        PipelineEvent::ManifestRewritten {
            base_url: job.base_url.clone(),
            rewriter: rewriter.describe(),
        },
    );
    Ok(tiles)
}

/// Toast one image into its output directory.
///
/// Any earlier output directory is replaced. On failure the directory is
/// removed again.
pub fn toast_image(
    job: &Job,
    config: &PipelineConfig,
    backend: &impl PyramidBackend,
    rewriter: &dyn ManifestRewriter,
    events: Option<&Sender<PipelineEvent>>,
) -> Result<TileSet, PipelineError> {
    let source = SourceImage::load(&job.input)?;
    let depth = toast_depth(source.longest_edge(), config.tiles.size);
    debug!(input = %job.input.display(), depth, "loaded source");
    emit(
        events,
        PipelineEvent::ImageLoaded {
            width: source.width(),
            height: source.height(),
            channels: source.channels(),
            depth,
        },
    );

    remove_dir_if_exists(&job.output_dir)?;
    let result = write_output(job, config, &source, depth, backend, rewriter, events);
    if result.is_err() {
        if let Err(e) = remove_dir_if_exists(&job.output_dir) {
            warn!(dir = %job.output_dir.display(), error = %e, "failed to remove partial output");
        }
    }
    result
}

/// Toast every configured input, then publish the ones that succeeded.
pub fn run(
    config: &PipelineConfig,
    backend: &impl PyramidBackend,
    rewriter: &dyn ManifestRewriter,
    options: RunOptions,
    events: Option<Sender<PipelineEvent>>,
) -> Result<PipelineReport, PipelineError> {
    let events = events.as_ref();
    let jobs = plan(config)?;
    let total = jobs.len();
    let mut report = PipelineReport::default();

    for (index, job) in jobs.iter().enumerate() {
        emit(
            events,
            PipelineEvent::ImageStarted {
                index: index + 1,
                total,
                input: job.input.clone(),
            },
        );
        let mut entry = ImageReport::new(job);
        match toast_image(job, config, backend, rewriter, events) {
            Ok(tiles) => {
                emit(
                    events,
                    PipelineEvent::ImageToasted {
                        input: job.input.clone(),
                        output_dir: job.output_dir.clone(),
                        tiles: tiles.total_tiles(),
                    },
                );
                entry.tiles = Some(tiles);
            }
            Err(e) if options.keep_going => {
                warn!(input = %job.input.display(), error = %e, "image failed");
                emit(
                    events,
                    PipelineEvent::ImageFailed {
                        input: job.input.clone(),
                        error: e.to_string(),
                    },
                );
                entry.error = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }
        report.images.push(entry);
    }

    if options.publish {
        let public_dir = config.public_dir();
        for entry in report.images.iter_mut().filter(|i| i.succeeded()) {
            match publish(&entry.output_dir, public_dir) {
                Ok(dest) => {
                    emit(
                        events,
                        PipelineEvent::Published {
                            from: entry.output_dir.clone(),
                            to: dest.clone(),
                        },
                    );
                    entry.published = Some(dest);
                }
                Err(e) if options.keep_going => {
                    emit(
                        events,
                        PipelineEvent::ImageFailed {
                            input: entry.input.clone(),
                            error: e.to_string(),
                        },
                    );
                    entry.error = Some(e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(report)
}

/// Publish already-built output directories.
pub fn publish_dirs(
    dirs: &[PathBuf],
    public_dir: &Path,
    events: Option<Sender<PipelineEvent>>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let events = events.as_ref();
    dirs.iter()
        .map(|dir| {
            let dest = publish(dir, public_dir)?;
            emit(
                events,
                PipelineEvent::Published {
                    from: dir.clone(),
                    to: dest.clone(),
                },
            );
            Ok(dest)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::BuiltinRewriter;
    use crate::test_helpers::{list_files, test_config, write_test_tiff};
    use crate::toast::backend::tests::MockBackend;
    use crate::wtml::manifest_urls;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn publish_all() -> RunOptions {
        RunOptions {
            keep_going: false,
            publish: true,
        }
    }

    /// Rewriter that always fails.
    struct BrokenRewriter;

    impl ManifestRewriter for BrokenRewriter {
        fn rewrite(&self, _: &Path, _: &str, _: &Path) -> Result<(), RewriteError> {
            Err(RewriteError::Failed {
                program: "broken".into(),
                status: "exit status: 1".into(),
                stderr: "nope".into(),
            })
        }

        fn describe(&self) -> String {
            "broken".into()
        }
    }

    /// Rewriter that copies the manifest unchanged.
    struct CopyRewriter;

    impl ManifestRewriter for CopyRewriter {
        fn rewrite(&self, input: &Path, _: &str, output: &Path) -> Result<(), RewriteError> {
            fs::copy(input, output)?;
            Ok(())
        }

        fn describe(&self) -> String {
            "copy".into()
        }
    }

    /// Rewriter that makes URLs absolute against the wrong base.
    struct WrongBaseRewriter;

    impl ManifestRewriter for WrongBaseRewriter {
        fn rewrite(&self, input: &Path, _: &str, output: &Path) -> Result<(), RewriteError> {
            let xml = fs::read_to_string(input)?;
            fs::write(output, crate::wtml::rewrite_urls(&xml, "/elsewhere/"))?;
            Ok(())
        }

        fn describe(&self) -> String {
            "wrong-base".into()
        }
    }

    // =========================================================================
    // Planning
    // =========================================================================

    #[test]
    fn plan_derives_dirs_and_urls() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), &["Test_equirectangular.tif", "stars.tif"]);
        let jobs = plan(&config).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].names.dir, "Test_toast");
        assert_eq!(jobs[0].output_dir, tmp.path().join("work/Test_toast"));
        assert_eq!(jobs[0].base_url, "/Test_toast/");
        assert_eq!(jobs[1].names.dir, "stars_toast");
    }

    #[test]
    fn plan_rejects_colliding_names() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), &["a/Sky_equirectangular.tif", "b/Sky.tif"]);
        assert!(matches!(
            plan(&config),
            Err(PipelineError::Naming(NamingError::Collision { .. }))
        ));
    }

    // =========================================================================
    // Toasting a single image
    // =========================================================================

    #[test]
    fn toast_image_writes_manifests_and_thumbnail() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("Test_equirectangular.tif"), 1024, 512);
        let config = test_config(tmp.path(), &["Test_equirectangular.tif"]);
        let job = &plan(&config).unwrap()[0];
        let backend = MockBackend::new();

        let tiles = toast_image(job, &config, &backend, &BuiltinRewriter, None).unwrap();

        assert_eq!(backend.recorded_depths(), vec![2]);
        assert_eq!(tiles.total_tiles(), 1);
        assert_eq!(
            list_files(&job.output_dir),
            vec!["0/0/0_0.png", "index.wtml", "index_rel.wtml", "thumb.jpg"]
        );

        let absolute = fs::read_to_string(job.output_dir.join(ABSOLUTE_MANIFEST)).unwrap();
        assert!(!absolute.contains("index_rel"));
        assert!(absolute.contains(r#"TileLevels="2""#));
        assert!(absolute.contains(r#"Name="Test_equirectangular""#));
        for url in manifest_urls(&absolute) {
            assert!(url.starts_with("/Test_toast/"), "{url}");
        }

        let thumb = image::open(job.output_dir.join(THUMBNAIL_FILE)).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (96, 45));
    }

    #[test]
    fn toast_image_without_thumbnail() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let mut config = test_config(tmp.path(), &["sky.tif"]);
        config.thumbnail.enabled = false;
        let job = &plan(&config).unwrap()[0];

        toast_image(job, &config, &MockBackend::new(), &BuiltinRewriter, None).unwrap();

        assert!(!job.output_dir.join(THUMBNAIL_FILE).exists());
        let absolute = fs::read_to_string(job.output_dir.join(ABSOLUTE_MANIFEST)).unwrap();
        assert!(!absolute.contains("ThumbnailUrl"));
    }

    #[test]
    fn toast_image_replaces_stale_output() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let job = &plan(&config).unwrap()[0];
        fs::create_dir_all(job.output_dir.join("7/7")).unwrap();
        fs::write(job.output_dir.join("7/7/7_7.png"), b"stale").unwrap();

        toast_image(job, &config, &MockBackend::new(), &BuiltinRewriter, None).unwrap();

        assert!(!job.output_dir.join("7").exists());
    }

    #[test]
    fn failed_build_removes_partial_output() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let job = &plan(&config).unwrap()[0];

        let result = toast_image(
            job,
            &config,
            &MockBackend::failing("disk full"),
            &BuiltinRewriter,
            None,
        );

        assert!(matches!(result, Err(PipelineError::Build(BuildError::Failed(_)))));
        assert!(!job.output_dir.exists());
    }

    #[test]
    fn rewrite_failure_is_reported_and_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let job = &plan(&config).unwrap()[0];

        let err = toast_image(job, &config, &MockBackend::new(), &BrokenRewriter, None)
            .unwrap_err();

        assert!(err.to_string().contains("nope"), "{err}");
        assert!(!job.output_dir.exists());
    }

    #[test]
    fn rewriter_leaving_relative_urls_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let job = &plan(&config).unwrap()[0];

        let result = toast_image(job, &config, &MockBackend::new(), &CopyRewriter, None);

        assert!(matches!(
            result,
            Err(PipelineError::Rewrite(RewriteError::RelativeUrls { .. }))
        ));
    }

    #[test]
    fn rewriter_with_wrong_base_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let job = &plan(&config).unwrap()[0];
        assert_eq!(job.base_url, "/sky_toast/");

        let result = toast_image(job, &config, &MockBackend::new(), &WrongBaseRewriter, None);

        match result {
            Err(PipelineError::Rewrite(RewriteError::OutsideBase { base_url, urls, .. })) => {
                assert_eq!(base_url, "/sky_toast/");
                assert!(!urls.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!job.output_dir.exists());
    }

    #[test]
    fn missing_source_is_imaging_error() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), &["missing.tif"]);
        let job = &plan(&config).unwrap()[0];
        let backend = MockBackend::new();

        let result = toast_image(job, &config, &backend, &BuiltinRewriter, None);

        assert!(matches!(result, Err(PipelineError::Imaging(_))));
        assert!(backend.recorded_depths().is_empty());
    }

    // =========================================================================
    // Full runs
    // =========================================================================

    #[test]
    fn run_toasts_then_publishes() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("A_equirectangular.tif"), 64, 32);
        write_test_tiff(&tmp.path().join("B_equirectangular.tif"), 64, 32);
        let config = test_config(
            tmp.path(),
            &["A_equirectangular.tif", "B_equirectangular.tif"],
        );
        let (tx, rx) = mpsc::channel();

        let report = run(&config, &MockBackend::new(), &BuiltinRewriter, publish_all(), Some(tx))
            .unwrap();

        assert_eq!(report.failed(), 0);
        let public = tmp.path().join("public");
        assert!(public.join("A_toast/index.wtml").exists());
        assert!(public.join("B_toast/index.wtml").exists());
        assert!(!tmp.path().join("work/A_toast").exists());

        // Both images are toasted before anything is published
        let events: Vec<PipelineEvent> = rx.iter().collect();
        let last_toast = events
            .iter()
            .rposition(|e| matches!(e, PipelineEvent::ImageToasted { .. }))
            .unwrap();
        let first_publish = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::Published { .. }))
            .unwrap();
        assert!(last_toast < first_publish);
    }

    #[test]
    fn run_without_publish_leaves_output_in_work_dir() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);

        let report = run(
            &config,
            &MockBackend::new(),
            &BuiltinRewriter,
            RunOptions::default(),
            None,
        )
        .unwrap();

        assert!(report.images[0].published.is_none());
        assert!(tmp.path().join("work/sky_toast/index.wtml").exists());
        assert!(!tmp.path().join("public").exists());
    }

    #[test]
    fn run_twice_gives_identical_public_tree() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);
        let backend = MockBackend::new();

        run(&config, &backend, &BuiltinRewriter, publish_all(), None).unwrap();
        let public = tmp.path().join("public");
        let first = list_files(&public);
        let manifest = fs::read(public.join("sky_toast/index.wtml")).unwrap();

        run(&config, &backend, &BuiltinRewriter, publish_all(), None).unwrap();

        assert_eq!(list_files(&public), first);
        assert_eq!(fs::read(public.join("sky_toast/index.wtml")).unwrap(), manifest);
    }

    #[test]
    fn run_aborts_on_first_failure_by_default() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("good.tif"), 64, 32);
        let config = test_config(tmp.path(), &["missing.tif", "good.tif"]);
        let backend = MockBackend::new();

        let result = run(&config, &backend, &BuiltinRewriter, publish_all(), None);

        assert!(matches!(result, Err(PipelineError::Imaging(_))));
        assert!(backend.recorded_depths().is_empty());
        assert!(!tmp.path().join("public").exists());
    }

    #[test]
    fn keep_going_skips_failed_images() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("good.tif"), 64, 32);
        let config = test_config(tmp.path(), &["missing.tif", "good.tif"]);
        let options = RunOptions {
            keep_going: true,
            publish: true,
        };

        let report = run(&config, &MockBackend::new(), &BuiltinRewriter, options, None).unwrap();

        assert_eq!(report.failed(), 1);
        assert!(report.images[0].error.is_some());
        assert!(report.images[0].published.is_none());
        assert!(report.images[1].published.is_some());
        assert!(!tmp.path().join("public/missing_toast").exists());
        assert!(tmp.path().join("public/good_toast/index.wtml").exists());
    }

    #[test]
    fn report_serializes_to_json() {
        let tmp = TempDir::new().unwrap();
        write_test_tiff(&tmp.path().join("sky.tif"), 64, 32);
        let config = test_config(tmp.path(), &["sky.tif"]);

        let report = run(&config, &MockBackend::new(), &BuiltinRewriter, publish_all(), None)
            .unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();

        let image = &json["images"][0];
        assert_eq!(image["dataset"], "sky");
        assert_eq!(image["base_url"], "/sky_toast/");
        assert_eq!(image["tiles"]["depth"], 0);
        assert!(image.get("error").is_none());
    }

    #[test]
    fn publish_dirs_moves_each_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("work/Foo_toast");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.wtml"), b"x").unwrap();

        let published =
            publish_dirs(&[dir.clone()], &tmp.path().join("public"), None).unwrap();

        assert_eq!(published, vec![tmp.path().join("public/Foo_toast")]);
        assert!(!dir.exists());
    }
}
