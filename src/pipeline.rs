//! Pipeline runner: the per-job state machine.
//!
//! ```text
//! queued -> active(prepare) -> active(generate) -> active(install)
//!        -> active(build) -> active(upload-src) -> active(upload-build)
//!        -> completed
//! ```
//!
//! Any stage error moves the job to `failed` with the error text. Nothing
//! already uploaded or installed is rolled back; the workspace is removed
//! either way unless retention is configured.

use std::path::Path;
use std::sync::Arc;

use tracing::Instrument;

use crate::config::SiteGenConfig;
use crate::errors::{JobError, JobResult};
use crate::generate::{
    GenerateOptions, GenerationResult, Generator, PROJECT_SYSTEM_PROMPT, ResponseParser,
    build_project_prompt,
};
use crate::materialize::{apply_site_title, materialize, resolve_site_title};
use crate::publish::{ObjectStore, PublishOptions, publish, source_ignore_dirs};
use crate::store::{JobRecorder, JobStatus, JobStep, JobUpdate, SiteResult, WorkItem};
use crate::toolchain::{BuildExecutor, RunOptions};
use crate::util::sanitize_client_id;
use crate::workspace::{Scaffold, Workspace};

pub struct PipelineRunner {
    config: Arc<SiteGenConfig>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn ObjectStore>,
    recorder: Arc<dyn JobRecorder>,
    executor: BuildExecutor,
    scaffold: Scaffold,
}

impl PipelineRunner {
    pub fn new(
        config: Arc<SiteGenConfig>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ObjectStore>,
        recorder: Arc<dyn JobRecorder>,
    ) -> Self {
        let scaffold = Scaffold::from_template_dir(config.build.template_dir.as_deref());
        Self {
            config,
            generator,
            store,
            recorder,
            executor: BuildExecutor::new(),
            scaffold,
        }
    }

    /// Run one job to a terminal state.
    pub async fn run(&self, job_id: &str, item: &WorkItem) -> JobResult<SiteResult> {
        let client_id = sanitize_client_id(&item.client_id);
        let span = tracing::info_span!("job", job_id = %job_id, client_id = %client_id);
        async {
            if let Err(err) = validate(&client_id, item, &self.config) {
                self.record_failure(job_id, &err).await;
                return Err(err);
            }
            tracing::info!(prompt_len = item.prompt.len(), "job started");
            self.log(job_id, "Job started").await;

            let mut workspace = None;
            let outcome = self.execute(job_id, &client_id, item, &mut workspace).await;
            match &outcome {
                Ok(result) => tracing::info!(build_url = %result.build_url, "job completed"),
                Err(err) => {
                    tracing::error!(kind = err.kind(), error = %err, "job failed");
                    self.record_failure(job_id, err).await;
                }
            }
            if let Some(ws) = workspace.take()
                && let Some(kept) = ws.teardown()
            {
                tracing::info!(path = %kept.display(), "workspace kept");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job_id: &str,
        client_id: &str,
        item: &WorkItem,
        workspace: &mut Option<Workspace>,
    ) -> JobResult<SiteResult> {
        // Validated above.
        let bucket = self.config.storage.bucket.as_deref().unwrap_or_default();

        self.recorder
            .record_transition(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Active),
                    step: Some(JobStep::Prepare),
                    error: Some(None),
                    ..JobUpdate::default()
                },
            )
            .await?;
        self.log(job_id, "Preparing workspace").await;
        let ws = workspace.insert(Workspace::allocate(self.config.worker.keep_workdir)?);
        let copied = ws.install_scaffold(&self.scaffold).await?;
        tracing::debug!(root = %ws.root().display(), files = copied, "workspace ready");
        let project_dir = ws.project_dir().to_path_buf();

        self.enter(job_id, JobStep::Generate, "Generating project files").await?;
        let generated = self.generate(&item.prompt).await?;
        self.recorder
            .record_transition(
                job_id,
                JobUpdate {
                    tokens: Some(generated.usage),
                    model: Some(generated.model.clone()),
                    ..JobUpdate::default()
                },
            )
            .await?;
        self.write_project(job_id, &project_dir, &generated, client_id).await?;

        let build = &self.config.build;
        self.enter(job_id, JobStep::Install, "Installing dependencies").await?;
        self.executor
            .run_argv(
                &build.install_command,
                &self.run_options(job_id, &project_dir, true),
                self.recorder.as_ref(),
            )
            .await?;

        self.enter(job_id, JobStep::Build, "Building project").await?;
        self.executor
            .run_argv(
                &build.build_command,
                &self.run_options(job_id, &project_dir, false),
                self.recorder.as_ref(),
            )
            .await?;

        let src_prefix = format!("{}/src", client_id);
        let build_prefix = format!("{}/build", client_id);
        let storage = &self.config.storage;

        self.enter(job_id, JobStep::UploadSrc, "Uploading src").await?;
        let options = PublishOptions {
            ignore_dirs: source_ignore_dirs(&build.output_dir),
            cache_control: storage.cache_control.clone(),
            acl: storage.acl.clone(),
        };
        let src = publish(self.store.as_ref(), bucket, &project_dir, &src_prefix, &options).await?;
        tracing::info!(files = src.files, bytes = src.bytes, "source uploaded");

        self.enter(job_id, JobStep::UploadBuild, "Uploading build").await?;
        let options = PublishOptions {
            ignore_dirs: Vec::new(),
            ..options
        };
        let output_dir = project_dir.join(&build.output_dir);
        let out = publish(self.store.as_ref(), bucket, &output_dir, &build_prefix, &options).await?;
        tracing::info!(files = out.files, bytes = out.bytes, "build uploaded");

        let result = SiteResult {
            client_id: client_id.to_string(),
            build_url: self.config.build_url(bucket, &build_prefix),
            s3_src: format!("s3://{}/{}", bucket, src_prefix),
            s3_build: format!("s3://{}/{}", bucket, build_prefix),
            src_prefix,
            build_prefix,
        };
        self.recorder
            .record_transition(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    step: Some(JobStep::Completed),
                    result: Some(result.clone()),
                    error: Some(None),
                    tokens: Some(generated.usage),
                    model: Some(generated.model.clone()),
                },
            )
            .await?;
        self.log(job_id, &format!("Completed. Tokens: {}", generated.usage.total))
            .await;
        Ok(result)
    }

    async fn generate(&self, brief: &str) -> JobResult<GenerationResult> {
        let generation = self
            .generator
            .generate(
                PROJECT_SYSTEM_PROMPT,
                &build_project_prompt(brief),
                &GenerateOptions::default(),
            )
            .await?;
        ResponseParser::new(self.generator.as_ref(), &self.config.repair)
            .parse(generation)
            .await
    }

    async fn write_project(
        &self,
        job_id: &str,
        project_dir: &Path,
        generated: &GenerationResult,
        client_id: &str,
    ) -> JobResult<()> {
        let report = materialize(project_dir, &generated.files).await?;
        if !report.skipped.is_empty() {
            tracing::warn!(skipped = ?report.skipped, "skipped generated files");
        }
        self.log(
            job_id,
            &format!(
                "Wrote {} generated files ({} skipped)",
                report.written.len(),
                report.skipped.len()
            ),
        )
        .await;
        let title = resolve_site_title(generated.site_title.as_deref(), client_id);
        if !apply_site_title(project_dir, title).await? {
            tracing::warn!("index.html missing, site title not applied");
        }
        Ok(())
    }

    fn run_options(&self, job_id: &str, project_dir: &Path, install: bool) -> RunOptions {
        RunOptions {
            cwd: project_dir.to_path_buf(),
            env: if install {
                self.config.build.install_env.clone()
            } else {
                Default::default()
            },
            job_id: job_id.to_string(),
        }
    }

    async fn enter(&self, job_id: &str, step: JobStep, message: &str) -> JobResult<()> {
        tracing::info!(step = step.as_str(), "{}", message);
        self.recorder
            .record_transition(job_id, JobUpdate::step(step))
            .await?;
        self.log(job_id, message).await;
        Ok(())
    }

    /// Log lines are best effort; a failed append never fails the job.
    async fn log(&self, job_id: &str, message: &str) {
        if let Err(e) = self.recorder.append_log(job_id, message).await {
            tracing::warn!(error = %e, "failed to append job log");
        }
    }

    async fn record_failure(&self, job_id: &str, err: &JobError) {
        let message = err.to_string();
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            step: Some(JobStep::Failed),
            error: Some(Some(message.clone())),
            ..JobUpdate::default()
        };
        if let Err(e) = self.recorder.record_transition(job_id, update).await {
            tracing::error!(error = %e, "failed to record job failure");
        }
        self.log(job_id, &format!("Failed: {}", message)).await;
    }
}

fn validate(client_id: &str, item: &WorkItem, config: &SiteGenConfig) -> JobResult<()> {
    if client_id.is_empty() {
        return Err(JobError::Validation("Invalid clientId".to_string()));
    }
    if item.prompt.trim().is_empty() {
        return Err(JobError::Validation("Missing prompt".to_string()));
    }
    if config.storage.bucket.as_deref().is_none_or(str::is_empty) {
        return Err(JobError::Validation("Missing S3_BUCKET".to_string()));
    }
    Ok(())
}
