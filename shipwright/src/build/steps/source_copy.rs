//! Step: copy the source tree into the image.
//!
//! Runs after dependency installation so the dependency layer caches
//! independently of source edits. The tree is staged into a scratch
//! directory on the same filesystem and swapped into place, so prior
//! partial state is replaced rather than merged over.

use super::{log_step_error, step_start};
use crate::build::types::{BuildCtx, commit_layer};
use crate::errors::{ShipwrightError, ShipwrightResult};
use crate::manifest::hex_sha256;
use crate::pipeline::SequencerStep;
use async_trait::async_trait;
use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

pub const STEP_NAME: &str = "copy_source";

pub struct SourceCopyStep;

#[async_trait]
impl SequencerStep<BuildCtx> for SourceCopyStep {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> ShipwrightResult<()> {
        let step_name = self.name();
        let build_id = step_start(&ctx, step_name).await;

        let (source_dir, workdir, tmp_dir, slot) = {
            let ctx = ctx.lock().await;
            let digest = tree_digest(&ctx.spec.source_dir)
                .inspect_err(|e| log_step_error(&build_id, step_name, e))?;
            let slot = ctx.resolve_layer(step_name, &digest);
            (
                ctx.spec.source_dir.clone(),
                ctx.staged_workdir(),
                ctx.home.tmp_dir(),
                slot,
            )
        };

        if !slot.cached {
            // Tree copies block; keep the runtime free while they run.
            let staged = tokio::task::spawn_blocking(move || {
                copy_tree_via_scratch(&source_dir, &workdir, &tmp_dir)
            })
            .await
            .map_err(|e| ShipwrightError::Internal(format!("source copy task failed: {}", e)))?;
            staged.inspect_err(|e| log_step_error(&build_id, step_name, e))?;
        }

        let mut ctx = ctx.lock().await;
        commit_layer(&mut ctx, step_name, slot);
        Ok(())
    }

    fn name(&self) -> &str {
        STEP_NAME
    }
}

/// Content digest of a source tree: relative paths and file bytes, in sorted
/// order, so the digest is stable across filesystems and copy order.
pub fn tree_digest(root: &Path) -> ShipwrightResult<String> {
    let mut entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ShipwrightError::Storage(format!("failed to walk {}: {}", root.display(), e)))?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut hasher = Sha256::new();
    for entry in entries {
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ShipwrightError::Internal(format!("walk escaped root: {}", e)))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0]);
        if entry.file_type().is_file() {
            let bytes = std::fs::read(entry.path()).map_err(|e| {
                ShipwrightError::Storage(format!(
                    "failed to read {}: {}",
                    entry.path().display(),
                    e
                ))
            })?;
            hasher.update(&bytes);
            hasher.update([0]);
        }
    }
    Ok(hex_sha256(hasher.finalize().as_slice()))
}

/// Copy `source` into a scratch dir under `tmp_dir`, then replace `dest`.
fn copy_tree_via_scratch(source: &Path, dest: &Path, tmp_dir: &Path) -> ShipwrightResult<()> {
    std::fs::create_dir_all(tmp_dir)?;
    let scratch = tempfile::tempdir_in(tmp_dir)
        .map_err(|e| ShipwrightError::Storage(format!("failed to create scratch dir: {}", e)))?;
    let staged = scratch.path().join("workdir");

    copy_tree(source, &staged)?;

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| {
            ShipwrightError::Storage(format!(
                "failed to clear staged workdir {}: {}",
                dest.display(),
                e
            ))
        })?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&staged, dest).map_err(|e| {
        ShipwrightError::Storage(format!(
            "failed to move staged source into {}: {}",
            dest.display(),
            e
        ))
    })?;
    Ok(())
}

fn copy_tree(source: &Path, dest: &Path) -> ShipwrightResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            ShipwrightError::Storage(format!("failed to walk {}: {}", source.display(), e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ShipwrightError::Internal(format!("walk escaped root: {}", e)))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| {
                ShipwrightError::Storage(format!(
                    "failed to copy {}: {}",
                    entry.path().display(),
                    e
                ))
            })?;
            // Preserve mtimes so rebuild digests and downstream tools see a
            // stable tree.
            if let Ok(meta) = entry.metadata() {
                let mtime = FileTime::from_last_modification_time(&meta);
                let _ = filetime::set_file_mtime(&target, mtime);
            }
        }
        // Symlinks and special files are not part of the contract; skip.
    }
    Ok(())
}
