/// Terraform execution against a cluster asset directory
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::utils::command::CommandBuilder;
use crate::{Error, Result};

/// Name of the rendered cluster definition inside the Terraform root
pub const CLUSTER_FILE_NAME: &str = "cluster.tf";

const LOCK_FILE_NAME: &str = ".railyard.lock";
const DEFAULT_BINARY: &str = "terraform";

/// Directory Terraform runs in for a given asset directory
pub fn root_dir(asset_dir: &Path) -> PathBuf {
    asset_dir.join("terraform")
}

/// Check if terraform is installed
pub async fn check_terraform_installed() -> anyhow::Result<()> {
    crate::utils::command::check_tool_installed(
        DEFAULT_BINARY,
        &["version"],
        "https://developer.hashicorp.com/terraform/install",
    )
    .await
}

/// Drives Terraform for exactly one asset directory.
///
/// Opening an executor takes a lock file in the asset directory, so a second
/// executor for the same directory (in this process or another one) fails with
/// `Error::AssetDirLocked` until the first is dropped or its process exits.
/// Operations take `&mut self`, which keeps a single executor from overlapping
/// with itself.
pub struct Executor {
    root_dir: PathBuf,
    binary: String,
    _lock: DirLock,
}

impl Executor {
    /// Open the asset directory, creating it if needed, and take its lock
    pub fn open(asset_dir: impl Into<PathBuf>) -> Result<Self> {
        let asset_dir = asset_dir.into();
        let lock = DirLock::acquire(&asset_dir)?;

        Ok(Self {
            root_dir: root_dir(&asset_dir),
            binary: DEFAULT_BINARY.to_string(),
            _lock: lock,
        })
    }

    /// Use a different Terraform-compatible binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Run `init` followed by `apply`
    pub async fn apply(&mut self) -> Result<()> {
        info!("Applying infrastructure in {}", self.root_dir.display());
        self.init().await?;
        self.run("apply", &["apply", "-auto-approve", "-input=false", "-no-color"])
            .await?;
        info!("Infrastructure applied successfully");
        Ok(())
    }

    /// Run `init` followed by `destroy`
    pub async fn destroy(&mut self) -> Result<()> {
        info!("Destroying infrastructure in {}", self.root_dir.display());
        self.init().await?;
        self.run(
            "destroy",
            &["destroy", "-auto-approve", "-input=false", "-no-color"],
        )
        .await?;
        info!("Infrastructure destroyed successfully");
        Ok(())
    }

    async fn init(&self) -> Result<()> {
        self.run("init", &["init", "-input=false", "-no-color"]).await
    }

    async fn run(&self, step: &str, args: &[&str]) -> Result<()> {
        debug!(step, binary = %self.binary, "Running terraform");

        let output = CommandBuilder::new(&self.binary)
            .args(args)
            .current_dir(&self.root_dir)
            .env("TF_IN_AUTOMATION", "1")
            .context(format!("Failed to execute {} {}", self.binary, step))
            .output()
            .await
            .map_err(|e| Error::InfrastructureTool {
                step: step.to_string(),
                status: None,
                output: format!("{:#}", e),
            })?;

        if !output.success {
            return Err(Error::InfrastructureTool {
                step: step.to_string(),
                status: output.status,
                output: output.combined(),
            });
        }

        debug!("{}", output.stdout.trim_end());
        Ok(())
    }
}

/// Lock file held for the lifetime of an `Executor`.
///
/// The file records the owner's PID. A lock left behind by a process that is
/// no longer running is taken over.
#[derive(Debug)]
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::io(format!("Failed to create {}", dir.display()), e))?;

        let path = dir.join(LOCK_FILE_NAME);
        match Self::create(&path)? {
            Some(lock) => Ok(lock),
            None => {
                if let Some(pid) = read_owner(&path).filter(|pid| !process_alive(*pid)) {
                    warn!(
                        "Removing stale lock {} left by process {}",
                        path.display(),
                        pid
                    );
                    std::fs::remove_file(&path).map_err(|e| {
                        Error::io(format!("Failed to remove stale lock {}", path.display()), e)
                    })?;

                    // Someone else may have taken it in between
                    if let Some(lock) = Self::create(&path)? {
                        return Ok(lock);
                    }
                }

                Err(Error::AssetDirLocked {
                    owner: read_owner(&path),
                    path,
                })
            }
        }
    }

    /// Create the lock file, or `None` when it already exists
    fn create(path: &Path) -> Result<Option<Self>> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(Error::io(
                    format!("Failed to create lock file {}", path.display()),
                    e,
                ))
            }
        };

        let lock = Self {
            path: path.to_path_buf(),
        };
        writeln!(file, "{}", std::process::id())
            .map_err(|e| Error::io(format!("Failed to write {}", lock.path.display()), e))?;

        Ok(Some(lock))
    }
}

/// PID recorded in a lock file, if it can be read
fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether `pid` names a running process.
///
/// Without `/proc` there is no way to tell, so the owner is assumed alive.
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable stand-in for terraform that records each step in
    /// `calls.log` next to itself, then runs `body`.
    pub(crate) fn stub_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("terraform-stub");
        let script = format!(
            "#!/bin/sh\necho \"$1\" >> \"$(dirname \"$0\")/calls.log\"\n{}\n",
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub(crate) fn recorded_calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn open_with_stub(asset: &Path, stub: &Path) -> Executor {
        std::fs::create_dir_all(root_dir(asset)).unwrap();
        Executor::open(asset)
            .unwrap()
            .with_binary(stub.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_apply_runs_init_then_apply() {
        let tools = tempfile::tempdir().unwrap();
        let asset = tempfile::tempdir().unwrap();
        let stub = stub_tool(tools.path(), "exit 0");

        let mut executor = open_with_stub(asset.path(), &stub);
        tokio_test::assert_ok!(executor.apply().await);

        assert_eq!(recorded_calls(tools.path()), ["init", "apply"]);
    }

    #[tokio::test]
    async fn test_destroy_runs_init_then_destroy() {
        let tools = tempfile::tempdir().unwrap();
        let asset = tempfile::tempdir().unwrap();
        let stub = stub_tool(tools.path(), "exit 0");

        let mut executor = open_with_stub(asset.path(), &stub);
        tokio_test::assert_ok!(executor.destroy().await);

        assert_eq!(recorded_calls(tools.path()), ["init", "destroy"]);
    }

    #[tokio::test]
    async fn test_failure_carries_tool_output_verbatim() {
        let tools = tempfile::tempdir().unwrap();
        let asset = tempfile::tempdir().unwrap();
        let stub = stub_tool(
            tools.path(),
            "if [ \"$1\" = apply ]; then echo 'Plan: 3 to add'; echo 'Error: Unauthorized\n  on cluster.tf line 4' >&2; exit 1; fi",
        );

        let mut executor = open_with_stub(asset.path(), &stub);
        match executor.apply().await {
            Err(Error::InfrastructureTool {
                step,
                status,
                output,
            }) => {
                assert_eq!(step, "apply");
                assert_eq!(status, Some(1));
                assert!(output.starts_with("Plan: 3 to add\n"));
                assert!(output.contains("Error: Unauthorized"));
                assert!(output.contains("on cluster.tf line 4"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_init_failure_skips_apply() {
        let tools = tempfile::tempdir().unwrap();
        let asset = tempfile::tempdir().unwrap();
        let stub = stub_tool(tools.path(), "echo 'backend unreachable' >&2; exit 2");

        let mut executor = open_with_stub(asset.path(), &stub);
        let err = executor.apply().await.unwrap_err();

        assert!(matches!(err, Error::InfrastructureTool { ref step, status: Some(2), .. } if step == "init"));
        assert_eq!(recorded_calls(tools.path()), ["init"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_error() {
        let asset = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root_dir(asset.path())).unwrap();
        let mut executor = Executor::open(asset.path())
            .unwrap()
            .with_binary("/nonexistent/terraform");

        let err = executor.apply().await.unwrap_err();
        assert!(matches!(err, Error::InfrastructureTool { status: None, .. }));
    }

    #[test]
    fn test_second_executor_is_refused_until_first_drops() {
        let asset = tempfile::tempdir().unwrap();

        let first = Executor::open(asset.path()).unwrap();
        match Executor::open(asset.path()) {
            Err(Error::AssetDirLocked { path, owner }) => {
                assert_eq!(path, asset.path().join(LOCK_FILE_NAME));
                assert_eq!(owner, Some(std::process::id()));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        drop(first);
        assert!(Executor::open(asset.path()).is_ok());
    }

    /// PID of a child that has already exited and been reaped
    fn exited_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_lock_left_by_exited_process_is_taken_over() {
        let asset = tempfile::tempdir().unwrap();
        let lock_path = asset.path().join(LOCK_FILE_NAME);

        // An executor whose process died without running Drop
        std::mem::forget(Executor::open(asset.path()).unwrap());
        std::fs::write(&lock_path, format!("{}\n", exited_pid())).unwrap();

        let executor = Executor::open(asset.path()).unwrap();
        assert_eq!(read_owner(&lock_path), Some(std::process::id()));

        drop(executor);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_unreadable_owner_keeps_lock() {
        let asset = tempfile::tempdir().unwrap();
        std::fs::write(asset.path().join(LOCK_FILE_NAME), "").unwrap();

        let err = Executor::open(asset.path()).map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::AssetDirLocked { owner: None, .. }));
        assert!(err.to_string().contains(LOCK_FILE_NAME));
    }

    #[test]
    fn test_open_creates_asset_dir() {
        let parent = tempfile::tempdir().unwrap();
        let asset = parent.path().join("clusters").join("demo");

        let executor = Executor::open(&asset).unwrap();
        assert!(asset.is_dir());
        assert_eq!(executor.root_dir(), asset.join("terraform"));
    }

    #[test]
    fn test_different_directories_are_independent() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();

        let _first = Executor::open(a.path()).unwrap();
        assert!(Executor::open(b.path()).is_ok());
    }
}
