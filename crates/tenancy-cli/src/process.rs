//! Chunk runner that re-invokes this binary as an isolated worker process.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tenancy_common::{TenancyError, TenancyResult};
use tenancy_coord::{ChunkRunner, TenantChunk, WorkerExit};
use tracing::debug;

/// Spawns `tenancy migrate` for each chunk with the chunk's tenant keys
/// passed explicitly, so the child resolves nothing but its own adapters.
pub struct ProcessChunkRunner {
    exe: PathBuf,
    global_args: Vec<OsString>,
    skip_failing: bool,
}

impl ProcessChunkRunner {
    pub fn new(exe: PathBuf, global_args: Vec<OsString>, skip_failing: bool) -> Self {
        Self {
            exe,
            global_args,
            skip_failing,
        }
    }

    /// Runner for the currently executing binary.
    pub fn current(global_args: Vec<OsString>, skip_failing: bool) -> TenancyResult<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| TenancyError::Worker(format!("cannot locate own executable: {e}")))?;
        Ok(Self::new(exe, global_args, skip_failing))
    }

    fn command(&self, chunk: &TenantChunk) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.global_args)
            .args(["migrate", "--processes", "1", "--with-pending", "--force"]);
        if self.skip_failing {
            cmd.arg("--skip-failing");
        }
        // `--tenant` takes each key verbatim, commas and leading dashes included.
        for tenant in &chunk.tenants {
            cmd.arg(format!("--tenant={}", tenant.key));
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl ChunkRunner for ProcessChunkRunner {
    type Handle = Child;

    fn spawn(&self, chunk: TenantChunk) -> TenancyResult<Child> {
        // An empty key list would select every tenant in the child.
        if chunk.is_empty() {
            return Err(TenancyError::Worker(format!("chunk {} is empty", chunk.index)));
        }
        let child = self.command(&chunk).spawn().map_err(|e| {
            TenancyError::Worker(format!("cannot start worker for chunk {}: {e}", chunk.index))
        })?;
        debug!(chunk = chunk.index, pid = child.id(), "worker started");
        Ok(child)
    }

    fn wait(&self, mut handle: Child) -> WorkerExit {
        match handle.wait() {
            Ok(status) => match status.code() {
                Some(0) => WorkerExit::Completed { success: true },
                Some(1) => WorkerExit::Completed { success: false },
                Some(code) => WorkerExit::Abnormal(format!("worker exited with code {code}")),
                None => WorkerExit::Abnormal("worker terminated by signal".into()),
            },
            Err(e) => WorkerExit::Abnormal(format!("cannot wait for worker: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenancy_coord::Tenant;

    fn chunk(keys: &[&str]) -> TenantChunk {
        TenantChunk {
            index: 0,
            tenants: keys.iter().map(|k| Tenant::new(*k)).collect(),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn child_receives_resolved_keys() {
        let runner = ProcessChunkRunner::new(
            PathBuf::from("tenancy"),
            vec!["--root".into(), "/srv/tenants".into()],
            true,
        );
        let cmd = runner.command(&chunk(&["a", "b"]));
        assert_eq!(
            args(&cmd),
            vec![
                "--root",
                "/srv/tenants",
                "migrate",
                "--processes",
                "1",
                "--with-pending",
                "--force",
                "--skip-failing",
                "--tenant=a",
                "--tenant=b",
            ]
        );
    }

    #[test]
    fn keys_with_commas_forwarded_whole() {
        let runner = ProcessChunkRunner::new(PathBuf::from("tenancy"), Vec::new(), false);
        let cmd = runner.command(&chunk(&["a,b", "-c"]));
        let args = args(&cmd);
        assert!(args.ends_with(&["--tenant=a,b".to_string(), "--tenant=-c".to_string()]));
    }

    #[test]
    fn abort_policy_omits_skip_failing() {
        let runner = ProcessChunkRunner::new(PathBuf::from("tenancy"), Vec::new(), false);
        let cmd = runner.command(&chunk(&["a"]));
        assert!(!args(&cmd).contains(&"--skip-failing".to_string()));
    }

    #[test]
    fn empty_chunk_not_spawned() {
        let runner = ProcessChunkRunner::new(PathBuf::from("tenancy"), Vec::new(), false);
        assert!(runner.spawn(chunk(&[])).is_err());
    }

    #[test]
    fn missing_executable_fails_spawn() {
        let runner =
            ProcessChunkRunner::new(PathBuf::from("/nonexistent/tenancy"), Vec::new(), false);
        let err = runner.spawn(chunk(&["a"])).unwrap_err();
        assert!(matches!(err, TenancyError::Worker(_)));
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_mapping() {
        let runner = ProcessChunkRunner::new(PathBuf::from("sh"), Vec::new(), false);
        let status = |script: &str| {
            let child = Command::new("sh").args(["-c", script]).spawn().unwrap();
            runner.wait(child)
        };
        assert_eq!(status("exit 0"), WorkerExit::Completed { success: true });
        assert_eq!(status("exit 1"), WorkerExit::Completed { success: false });
        assert!(matches!(status("exit 7"), WorkerExit::Abnormal(_)));
        assert!(matches!(status("kill -9 $$"), WorkerExit::Abnormal(_)));
    }
}
