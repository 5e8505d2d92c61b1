//! Artifact publisher: uploads a local tree to object storage under a key
//! prefix.

pub mod store;

use std::path::{Path, PathBuf};

pub use store::{ObjectStore, PutObject, S3ObjectStore};

use crate::errors::{JobError, JobResult};

/// Directories never uploaded with the source tree, besides the build output.
const SOURCE_IGNORE_DIRS: &[&str] = &["node_modules", ".git"];

/// Ignore set for a source upload whose build writes into `output_dir`.
pub fn source_ignore_dirs(output_dir: &str) -> Vec<String> {
    let mut dirs: Vec<String> = SOURCE_IGNORE_DIRS.iter().map(|s| s.to_string()).collect();
    dirs.push(output_dir.to_string());
    dirs
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub ignore_dirs: Vec<String>,
    pub cache_control: String,
    pub acl: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Extensions served as JavaScript regardless of what `mime_guess` reports
/// (it maps `.ts` to MPEG transport streams, for one).
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "jsx", "ts", "tsx"];

/// Content-Type for an uploaded file. Text types carry a utf-8 charset.
pub fn content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if SCRIPT_EXTENSIONS.contains(&ext.as_str()) {
        return "text/javascript; charset=utf-8".to_string();
    }
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT || mime == mime_guess::mime::APPLICATION_JSON {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// Regular files under `root` as `(absolute, relative-with-slashes)`,
/// sorted by relative path. Directories whose name is in `ignore_dirs` are
/// pruned at any depth; symlinks are not followed.
pub async fn list_files(root: &Path, ignore_dirs: &[String]) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                let name = entry.file_name();
                if ignore_dirs.iter().any(|d| name.to_str() == Some(d.as_str())) {
                    continue;
                }
                pending.push(path);
            } else if file_type.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .map_err(std::io::Error::other)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, rel));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Upload every file under `local_dir` to `key_prefix/<relative path>`.
/// The first failed write aborts; objects already written stay in place.
pub async fn publish(
    store: &dyn ObjectStore,
    bucket: &str,
    local_dir: &Path,
    key_prefix: &str,
    options: &PublishOptions,
) -> JobResult<PublishSummary> {
    let files = list_files(local_dir, &options.ignore_dirs)
        .await
        .map_err(|e| JobError::Publish(format!("failed to list {}: {}", key_prefix, e)))?;

    let mut summary = PublishSummary::default();
    for (path, rel) in files {
        let key = format!("{}/{}", key_prefix, rel);
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| JobError::Publish(format!("failed to read {}: {}", rel, e)))?;
        let size = body.len() as u64;
        store
            .put_object(PutObject {
                bucket: bucket.to_string(),
                key: key.clone(),
                body,
                content_type: content_type(&path),
                cache_control: options.cache_control.clone(),
                acl: options.acl.clone(),
            })
            .await
            .map_err(|e| JobError::Publish(format!("upload of {} failed: {:#}", key, e)))?;
        summary.files += 1;
        summary.bytes += size;
    }
    tracing::debug!(prefix = key_prefix, files = summary.files, bytes = summary.bytes, "published tree");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::store::testing::MemoryStore;
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(ignore: &[&str]) -> PublishOptions {
        PublishOptions {
            ignore_dirs: ignore.iter().map(|s| s.to_string()).collect(),
            cache_control: "public, max-age=300".to_string(),
            acl: None,
        }
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("assets/app.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("data.json")), "application/json; charset=utf-8");
        assert_eq!(content_type(Path::new("a/B.JSX")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(Path::new("src/main.ts")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(Path::new("logo.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("favicon.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn test_source_ignore_dirs_follow_output_dir() {
        let dirs = source_ignore_dirs("dist");
        assert!(dirs.contains(&"dist".to_string()));
        assert!(dirs.contains(&"node_modules".to_string()));
        assert!(dirs.contains(&".git".to_string()));
        assert!(!dirs.contains(&"build".to_string()));
    }

    #[tokio::test]
    async fn test_list_files_prunes_ignored_dirs_at_any_depth() {
        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "<html>");
        write(dir.path(), "src/App.jsx", "x");
        write(dir.path(), "node_modules/react/index.js", "x");
        write(dir.path(), "build/index.html", "x");
        write(dir.path(), "src/.git/HEAD", "x");

        let files = list_files(dir.path(), &source_ignore_dirs("build")).await.unwrap();
        let rels: Vec<&str> = files.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(rels, vec!["index.html", "src/App.jsx"]);
    }

    #[tokio::test]
    async fn test_list_files_deep_tree() {
        let dir = tempdir().unwrap();
        let deep = (0..40).map(|i| format!("d{}", i)).collect::<Vec<_>>().join("/");
        write(dir.path(), &format!("{}/leaf.txt", deep), "x");
        let files = list_files(dir.path(), &[]).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.ends_with("d39/leaf.txt"));
    }

    #[tokio::test]
    async fn test_publish_keys_and_metadata() {
        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "<html>");
        write(dir.path(), "assets/app.css", "body{}");
        let store = MemoryStore::default();
        let opts = PublishOptions {
            acl: Some("public-read".into()),
            ..options(&[])
        };
        let summary = publish(&store, "sites", dir.path(), "Acme-Co/build", &opts)
            .await
            .unwrap();
        assert_eq!(summary, PublishSummary { files: 2, bytes: 12 });
        assert_eq!(
            store.keys(),
            vec!["sites/Acme-Co/build/assets/app.css", "sites/Acme-Co/build/index.html"]
        );
        let index = store.get("sites/Acme-Co/build/index.html").unwrap();
        assert_eq!(index.content_type, "text/html; charset=utf-8");
        assert_eq!(index.cache_control, "public, max-age=300");
        assert_eq!(index.acl.as_deref(), Some("public-read"));
    }

    #[tokio::test]
    async fn test_publish_aborts_on_first_failure() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");
        write(dir.path(), "c.txt", "c");
        let store = MemoryStore {
            fail_on: Some("b.txt".into()),
            ..MemoryStore::default()
        };
        let err = publish(&store, "sites", dir.path(), "x/src", &options(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "publish");
        assert!(err.to_string().contains("x/src/b.txt"));
        assert_eq!(store.keys(), vec!["sites/x/src/a.txt"]);
    }

    #[tokio::test]
    async fn test_publish_missing_dir_is_publish_error() {
        let store = MemoryStore::default();
        let err = publish(&store, "b", Path::new("/no/such/dir"), "p", &options(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "publish");
    }
}
