// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem accessor confined to a set of allowed roots.
//!
//! Every path goes through [`FileSandbox::resolve`]: it is made absolute,
//! `.` and `..` are folded lexically, and the deepest existing ancestor is
//! canonicalized so a symlink cannot point outside the roots. Only then is
//! the root check applied.

use super::SandboxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Read,
    Write,
    List,
    Exists,
    Stat,
    Mkdir,
}

impl FileOperation {
    pub const ALL: [&'static str; 6] = ["read", "write", "list", "exists", "stat", "mkdir"];
}

#[derive(Debug, Clone)]
pub struct FileRequest {
    pub operation: FileOperation,
    pub path: String,
    pub content: Option<String>,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
    #[serde(rename = "isFile")]
    pub is_file: bool,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum FileOutcome {
    Read {
        path: String,
        content: String,
        size: u64,
    },
    Write {
        path: String,
        #[serde(rename = "bytesWritten")]
        bytes_written: u64,
    },
    List {
        path: String,
        entries: Vec<DirEntryInfo>,
    },
    Exists {
        path: String,
        exists: bool,
    },
    Stat {
        path: String,
        size: u64,
        #[serde(rename = "isDirectory")]
        is_directory: bool,
        #[serde(rename = "isFile")]
        is_file: bool,
        readonly: bool,
        modified: Option<DateTime<Utc>>,
        created: Option<DateTime<Utc>>,
    },
    Mkdir {
        path: String,
        recursive: bool,
    },
}

#[derive(Debug, Clone)]
pub struct FileSandbox {
    allowed_roots: Vec<PathBuf>,
}

impl FileSandbox {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut allowed_roots = Vec::new();
        for root in roots {
            let root = root.as_ref();
            let Ok(abs) = absolute(root) else {
                tracing::warn!("Skipping unresolvable sandbox root {:?}", root);
                continue;
            };
            let normalized = normalize(&abs);
            let canonical = std::fs::canonicalize(&normalized).unwrap_or(normalized);
            if !allowed_roots.contains(&canonical) {
                allowed_roots.push(canonical);
            }
        }
        Self { allowed_roots }
    }

    /// Current directory, the system temp directory, `/tmp` and `/var/tmp`,
    /// plus any extra roots.
    pub fn with_default_roots(extra: &[PathBuf]) -> Self {
        let mut roots: Vec<PathBuf> = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }
        roots.push(std::env::temp_dir());
        roots.push(PathBuf::from("/tmp"));
        roots.push(PathBuf::from("/var/tmp"));
        roots.extend(extra.iter().cloned());
        Self::new(roots)
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Resolve `path` and confirm it descends from an allowed root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        if path.trim().is_empty() {
            return Err(SandboxError::InvalidInput("path must not be empty".into()));
        }
        let abs =
            absolute(Path::new(path)).map_err(|e| SandboxError::io(path, Path::new(path), e))?;
        let resolved = match resolve_existing_prefix(&normalize(&abs)) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Could not resolve {:?}: {}", abs, e);
                return Err(SandboxError::PathDenied {
                    path: path.to_string(),
                });
            }
        };

        if self
            .allowed_roots
            .iter()
            .any(|root| resolved.starts_with(root))
        {
            Ok(resolved)
        } else {
            tracing::warn!("Denied filesystem access to {:?}", resolved);
            Err(SandboxError::PathDenied {
                path: path.to_string(),
            })
        }
    }

    pub async fn perform(&self, request: FileRequest) -> Result<FileOutcome, SandboxError> {
        let path = self.resolve(&request.path)?;
        let display = path.display().to_string();
        let requested = request.path.clone();
        let io_err = |e: io::Error| SandboxError::io(&requested, &path, e);

        match request.operation {
            FileOperation::Read => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(io_err)?;
                Ok(FileOutcome::Read {
                    path: display,
                    size: content.len() as u64,
                    content,
                })
            }
            FileOperation::Write => {
                let content = request
                    .content
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        SandboxError::InvalidInput("content is required for write".into())
                    })?;
                tokio::fs::write(&path, content.as_bytes())
                    .await
                    .map_err(io_err)?;
                Ok(FileOutcome::Write {
                    path: display,
                    bytes_written: content.len() as u64,
                })
            }
            FileOperation::List => {
                let mut dir = tokio::fs::read_dir(&path)
                    .await
                    .map_err(io_err)?;
                let mut entries = Vec::new();
                while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
                    let meta = entry.metadata().await.map_err(io_err)?;
                    entries.push(DirEntryInfo {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        is_directory: meta.is_dir(),
                        is_file: meta.is_file(),
                        size: meta.len(),
                    });
                }
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(FileOutcome::List {
                    path: display,
                    entries,
                })
            }
            FileOperation::Exists => {
                let exists = tokio::fs::try_exists(&path)
                    .await
                    .map_err(io_err)?;
                Ok(FileOutcome::Exists {
                    path: display,
                    exists,
                })
            }
            FileOperation::Stat => {
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(io_err)?;
                Ok(FileOutcome::Stat {
                    path: display,
                    size: meta.len(),
                    is_directory: meta.is_dir(),
                    is_file: meta.is_file(),
                    readonly: meta.permissions().readonly(),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    created: meta.created().ok().map(DateTime::<Utc>::from),
                })
            }
            FileOperation::Mkdir => {
                let result = if request.recursive {
                    tokio::fs::create_dir_all(&path).await
                } else {
                    tokio::fs::create_dir(&path).await
                };
                result.map_err(io_err)?;
                Ok(FileOutcome::Mkdir {
                    path: display,
                    recursive: request.recursive,
                })
            }
        }
    }
}

pub(super) fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Fold `.` and `..` without touching the filesystem.
pub(super) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Symlinks followed by hand before the path is refused.
const MAX_SYMLINK_HOPS: usize = 40;

/// Canonicalize the deepest existing ancestor and re-append the rest.
///
/// A dangling symlink on the way is followed to its target, so a link whose
/// target does not exist yet still resolves to where a write would land.
fn resolve_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        let mut existing = current.clone();
        let mut tail: Vec<OsString> = Vec::new();
        loop {
            if let Ok(canonical) = std::fs::canonicalize(&existing) {
                return Ok(rejoin(canonical, &tail));
            }
            let is_link = std::fs::symlink_metadata(&existing)
                .map(|meta| meta.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                let target = std::fs::read_link(&existing)?;
                let base = existing.parent().unwrap_or_else(|| Path::new("/"));
                current = rejoin(normalize(&base.join(target)), &tail);
                break;
            }
            match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
                (Some(name), Some(parent)) => {
                    tail.push(name);
                    existing = parent.to_path_buf();
                }
                _ => return Ok(current),
            }
        }
    }
    Err(io::Error::new(
        io::ErrorKind::Other,
        "too many levels of symbolic links",
    ))
}

fn rejoin(mut base: PathBuf, tail: &[OsString]) -> PathBuf {
    for part in tail.iter().rev() {
        base.push(part);
    }
    base
}
