// src/deploy.rs

//! Putting test binaries on the target and fetching their reports.
//!
//! Binaries are built into a staging tree that mirrors the target's layout
//! below an `opt` directory, e.g. `bazel-bin/pkg/opt/score/tests/smoke`
//! lands at `/opt/score/tests/smoke`.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::control::ControlInterface;
use crate::errors::{Result, TargetError};
use crate::files::FileTransfer;
use crate::types::CommandSpec;

/// Map a staged binary to its install path on the target.
///
/// Re-roots `local` at its last `opt` component. `None` if the path has no
/// such component.
pub fn remote_path_for(local: &Path) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = local.components().collect();
    let idx = components
        .iter()
        .rposition(|c| matches!(c, Component::Normal(name) if name.to_str() == Some("opt")))?;

    let mut remote = PathBuf::from("/");
    remote.extend(components[idx..].iter());
    Some(remote)
}

/// Upload each binary to its mapped path.
///
/// When `make_executable` is set (targets with their own filesystem), the
/// uploaded file is `chmod +x`ed through `control`; a non-zero status is an
/// error. Returns the remote paths in input order.
pub async fn deploy_binaries(
    files: &dyn FileTransfer,
    control: &dyn ControlInterface,
    binaries: &[PathBuf],
    make_executable: bool,
    timeout: Duration,
) -> Result<Vec<PathBuf>> {
    let mut deployed = Vec::with_capacity(binaries.len());
    for binary in binaries {
        if !binary.is_file() {
            return Err(TargetError::TransferError(format!(
                "{} is not a file",
                binary.display()
            )));
        }
        let remote = remote_path_for(binary).ok_or_else(|| {
            TargetError::TransferError(format!(
                "{} has no 'opt' component to map onto the target",
                binary.display()
            ))
        })?;

        info!(local = %binary.display(), remote = %remote.display(), "deploying binary");
        files.upload(binary, &remote).await?;

        if make_executable {
            let spec = CommandSpec::new(format!("chmod +x {}", remote.display())).timeout(timeout);
            let res = control.exec_command_blocking(&spec).await;
            if !res.success() {
                return Err(TargetError::TransferError(format!(
                    "chmod +x {} failed ({}, code {}): {}",
                    remote.display(),
                    res.outcome,
                    res.exit_code,
                    res.stderr.trim()
                )));
            }
        }
        deployed.push(remote);
    }
    Ok(deployed)
}

/// Download every `.xml` report found below `remote_dir` into `local_dir`.
///
/// Files are flattened by name. Returns the local paths written.
pub async fn download_results(
    files: &dyn FileTransfer,
    remote_dir: &Path,
    local_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut downloaded = Vec::new();
    for file in files.walk_files(remote_dir).await? {
        if file.extension().is_none_or(|ext| ext != "xml") {
            continue;
        }
        let Some(name) = file.file_name() else {
            continue;
        };
        let local = local_dir.join(name);
        info!(remote = %file.display(), local = %local.display(), "downloading test result");
        files.download(&file, &local).await?;
        downloaded.push(local);
    }
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_paths_are_rerooted_at_opt() {
        assert_eq!(
            remote_path_for(Path::new("/build/out/opt/score/tests/smoke")),
            Some(PathBuf::from("/opt/score/tests/smoke"))
        );
        assert_eq!(
            remote_path_for(Path::new("bazel-bin/pkg/opt/score/launch_manager")),
            Some(PathBuf::from("/opt/score/launch_manager"))
        );
    }

    #[test]
    fn last_opt_component_wins() {
        assert_eq!(
            remote_path_for(Path::new("/opt/ci/build/opt/score/bin")),
            Some(PathBuf::from("/opt/score/bin"))
        );
    }

    #[test]
    fn paths_without_opt_are_unmapped() {
        assert_eq!(remote_path_for(Path::new("/usr/bin/true")), None);
        assert_eq!(remote_path_for(Path::new("/build/options/bin")), None);
    }
}
