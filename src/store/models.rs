use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Pipeline stage reported through `progress.step`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobStep {
    Prepare,
    Generate,
    Install,
    Build,
    UploadSrc,
    UploadBuild,
    Completed,
    Failed,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Generate => "generate",
            Self::Install => "install",
            Self::Build => "build",
            Self::UploadSrc => "upload-src",
            Self::UploadBuild => "upload-build",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepare" => Ok(Self::Prepare),
            "generate" => Ok(Self::Generate),
            "install" => Ok(Self::Install),
            "build" => Ok(Self::Build),
            "upload-src" => Ok(Self::UploadSrc),
            "upload-build" => Ok(Self::UploadBuild),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job step: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobProgress {
    pub step: JobStep,
}

/// Published locations of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteResult {
    pub client_id: String,
    pub src_prefix: String,
    pub build_prefix: String,
    pub build_url: String,
    pub s3_src: String,
    pub s3_build: String,
}

/// Token accounting summed over every model call of one job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub owner_id: Option<String>,
    pub client_id: String,
    pub prompt: String,
    pub status: JobStatus,
    pub progress: Option<JobProgress>,
    pub result: Option<SiteResult>,
    pub error: Option<String>,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    pub tokens_total: Option<i64>,
    pub model: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    #[serde(skip_serializing)]
    pub job_id: String,
    pub message: String,
    pub created_at: String,
}

/// Partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub step: Option<JobStep>,
    pub result: Option<SiteResult>,
    /// `Some(None)` clears the column.
    pub error: Option<Option<String>>,
    pub tokens: Option<TokenUsage>,
    pub model: Option<String>,
}

impl JobUpdate {
    pub fn step(step: JobStep) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.step.is_none()
            && self.result.is_none()
            && self.error.is_none()
            && self.tokens.is_none()
            && self.model.is_none()
    }
}

/// Payload delivered by the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub client_id: String,
    pub prompt: String,
}

/// Raw row shape; converted with `into_record`.
pub(crate) struct JobRow {
    pub job_id: String,
    pub owner_id: Option<String>,
    pub client_id: String,
    pub prompt: String,
    pub status: String,
    pub progress_step: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    pub tokens_total: Option<i64>,
    pub model: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    pub fn into_record(self) -> anyhow::Result<JobRecord> {
        let status = self.status.parse::<JobStatus>().map_err(|e| anyhow::anyhow!(e))?;
        let progress = match self.progress_step {
            Some(step) => Some(JobProgress {
                step: step.parse::<JobStep>().map_err(|e| anyhow::anyhow!(e))?,
            }),
            None => None,
        };
        let result = match self.result {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(JobRecord {
            id: self.job_id,
            owner_id: self.owner_id,
            client_id: self.client_id,
            prompt: self.prompt,
            status,
            progress,
            result,
            error: self.error,
            tokens_prompt: self.tokens_prompt,
            tokens_completion: self.tokens_completion,
            tokens_total: self.tokens_total,
            model: self.model,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [JobStatus::Queued, JobStatus::Active, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }

    #[test]
    fn test_step_serializes_kebab_case() {
        let json = serde_json::to_string(&JobProgress { step: JobStep::UploadSrc }).unwrap();
        assert_eq!(json, r#"{"step":"upload-src"}"#);
        assert_eq!("upload-build".parse::<JobStep>().unwrap(), JobStep::UploadBuild);
    }

    #[test]
    fn test_site_result_uses_camel_case() {
        let result = SiteResult {
            client_id: "Acme-Co".into(),
            src_prefix: "Acme-Co/src".into(),
            build_prefix: "Acme-Co/build".into(),
            build_url: "https://cdn/Acme-Co/build/index.html".into(),
            s3_src: "s3://b/Acme-Co/src".into(),
            s3_build: "s3://b/Acme-Co/build".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["clientId"], "Acme-Co");
        assert_eq!(value["buildPrefix"], "Acme-Co/build");
        assert_eq!(value["s3Src"], "s3://b/Acme-Co/src");
    }

    #[test]
    fn test_token_usage_add() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage { prompt: 10, completion: 5, total: 15 });
        total.add(&TokenUsage { prompt: 1, completion: 2, total: 3 });
        assert_eq!(total, TokenUsage { prompt: 11, completion: 7, total: 18 });
    }

    #[test]
    fn test_job_update_is_empty() {
        assert!(JobUpdate::default().is_empty());
        assert!(!JobUpdate::step(JobStep::Build).is_empty());
        let clear_error = JobUpdate {
            error: Some(None),
            ..JobUpdate::default()
        };
        assert!(!clear_error.is_empty());
    }
}
