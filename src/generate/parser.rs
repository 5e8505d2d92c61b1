//! Response parser: model text to `GenerationResult`, with at most one
//! repair call when the text is not valid JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::config::RepairConfig;
use crate::errors::{JobError, JobResult};
use crate::store::TokenUsage;
use crate::util::{clip_chars, outer_brace_span, strip_code_fence};

use super::client::{GenerateOptions, Generation, Generator};
use super::prompt::{REPAIR_SYSTEM_PROMPT, build_repair_prompt};

/// One file proposed by the model. Paths are untrusted until the
/// materializer has normalised them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeneratedFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub site_title: Option<String>,
    pub files: Vec<GeneratedFile>,
    pub usage: TokenUsage,
    pub model: String,
}

pub struct ResponseParser<'a> {
    generator: &'a dyn Generator,
    repair: &'a RepairConfig,
}

impl<'a> ResponseParser<'a> {
    pub fn new(generator: &'a dyn Generator, repair: &'a RepairConfig) -> Self {
        Self { generator, repair }
    }

    /// Parse `generation` into a result. Usage from the repair call, when one
    /// is made, is added to the original call's usage.
    pub async fn parse(&self, generation: Generation) -> JobResult<GenerationResult> {
        let mut usage = generation.usage;
        let value = match parse_json_lenient(&generation.content) {
            Some(value) => value,
            None => {
                let repaired = self.repair_call(&generation.content).await?;
                usage.add(&repaired.usage);
                parse_json_lenient(&repaired.content).ok_or_else(|| {
                    JobError::Generation("model returned an invalid response".to_string())
                })?
            }
        };
        let (site_title, files) = extract_project(value)?;
        Ok(GenerationResult {
            site_title,
            files,
            usage,
            model: generation.model_used,
        })
    }

    async fn repair_call(&self, raw: &str) -> JobResult<Generation> {
        if !self.repair.enabled {
            return Err(JobError::Generation(
                "model returned an invalid response and repair is disabled".to_string(),
            ));
        }
        let clipped = clip_chars(raw, self.repair.max_chars);
        tracing::warn!(chars = clipped.chars().count(), "attempting JSON repair");
        let options = GenerateOptions {
            model_override: self.repair.model.clone(),
            response_format_override: self.repair.response_format.clone(),
        };
        self.generator
            .generate(REPAIR_SYSTEM_PROMPT, &build_repair_prompt(clipped), &options)
            .await
    }
}

/// Strict parse, then a retry on the outermost brace span.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    let cleaned = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Some(value);
    }
    let span = outer_brace_span(&cleaned)?;
    serde_json::from_str::<Value>(span).ok()
}

#[derive(Deserialize)]
struct ProjectPayload {
    #[serde(rename = "siteTitle")]
    site_title: Option<Value>,
    files: Option<Value>,
}

fn extract_project(value: Value) -> JobResult<(Option<String>, Vec<GeneratedFile>)> {
    let payload: ProjectPayload = serde_json::from_value(value).map_err(|_| {
        JobError::Generation("model returned an invalid response: expected an object".to_string())
    })?;
    let Some(Value::Array(entries)) = payload.files else {
        return Err(JobError::Generation(
            "model returned an invalid response: missing files array".to_string(),
        ));
    };
    // Malformed entries are handed to the materializer as blanks and skipped there.
    let files = entries
        .into_iter()
        .map(|entry| serde_json::from_value::<GeneratedFile>(entry).unwrap_or_default())
        .collect();
    let site_title = payload
        .site_title
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);
    Ok((site_title, files))
}
