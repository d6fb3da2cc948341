//! rsync process adapter
//!
//! Translates a [`MirrorRequest`] into an `rsync -a --delete` invocation.
//! The program's output is forwarded to the log verbatim and never parsed.
//! On unix the program runs in its own process group so a timeout also
//! kills the processes rsync forks.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{Mirror, MirrorRequest};
use crate::config::MirrorSettings;
use crate::error::{BackupError, BackupResult};

/// Interval between exit checks while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Mirrors sources by running rsync
#[derive(Debug, Clone)]
pub struct RsyncMirror {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl RsyncMirror {
    /// Create a mirror from settings
    pub fn new(settings: &MirrorSettings) -> Self {
        Self {
            program: settings.program.clone(),
            timeout: settings.timeout,
        }
    }

    /// Command-line arguments for a request
    pub fn command_args(request: &MirrorRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-a".into(), "--delete".into()];

        // Recycled and resumed staging trees may hold files that are excluded now
        if !request.excludes.is_empty() {
            args.push("--delete-excluded".into());
        }

        for pattern in &request.excludes {
            args.push(format!("--exclude={}", pattern).into());
        }

        if let Some(link_dest) = &request.link_dest {
            let mut arg = OsString::from("--link-dest=");
            arg.push(link_dest);
            args.push(arg);
        }

        let mut log_arg = OsString::from("--log-file=");
        log_arg.push(absolute(&request.log_file));
        args.push(log_arg);

        // Trailing slash: copy the contents, not the directory itself
        let mut source = absolute(&request.source_root).into_os_string();
        if !source.to_string_lossy().ends_with('/') {
            source.push("/");
        }
        args.push(source);
        args.push(absolute(&request.destination).into_os_string());

        args
    }
}

impl Mirror for RsyncMirror {
    fn mirror(&self, request: &MirrorRequest) -> BackupResult<()> {
        let label = &request.source_label;
        let args = Self::command_args(request);

        info!(
            source = %label,
            "Executing: {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            BackupError::mirror(
                label,
                format!("failed to start {}: {}", self.program.display(), e),
            )
        })?;

        // Drain both pipes while waiting so a chatty child cannot block
        let stdout = child.stdout.take().map(|pipe| thread::spawn(move || read_all(pipe)));
        let stderr = child.stderr.take().map(|pipe| thread::spawn(move || read_all(pipe)));

        let status = wait_with_timeout(&mut child, self.timeout).map_err(|e| {
            BackupError::mirror(label, format!("failed to wait for mirror process: {}", e))
        })?;

        // After a kill a surviving grandchild may still hold a pipe open
        let (stdout, stderr) = match status {
            Some(_) => (join_output(stdout), join_output(stderr)),
            None => (String::new(), String::new()),
        };

        if !stdout.trim().is_empty() {
            info!(source = %label, "Mirror produced the following output on stdout:\n{}", stdout);
        }
        if !stderr.trim().is_empty() {
            warn!(source = %label, "Mirror produced the following output on stderr:\n{}", stderr);
        }

        match status {
            Some(status) if status.success() => {
                debug!(source = %label, "Mirror finished");
                Ok(())
            }
            Some(status) => Err(BackupError::mirror(
                label,
                format!("{} exited with {}", self.program.display(), status),
            )),
            None => Err(BackupError::mirror(
                label,
                format!(
                    "{} timed out after {}s and was killed",
                    self.program.display(),
                    self.timeout.map(|t| t.as_secs()).unwrap_or_default()
                ),
            )),
        }
    }
}

/// Wait for a child, killing it once `timeout` elapses
///
/// Returns `Ok(None)` if the child was killed.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return terminate(child);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill a child and its process group
///
/// Returns the child's own exit status if it finished before the kill.
#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use std::os::unix::process::ExitStatusExt;

    if killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL).is_err() {
        // Not a group leader
        let _ = child.kill();
    }

    let status = child.wait()?;
    if status.signal().is_none() {
        debug!("Mirror exited before it could be killed");
        return Ok(Some(status));
    }
    Ok(None)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
    let exited = matches!(
        child.kill(),
        Err(ref e) if e.kind() == std::io::ErrorKind::InvalidInput
    );
    let status = child.wait()?;
    Ok(exited.then_some(status))
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn read_all(mut pipe: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MirrorRequest {
        MirrorRequest {
            source_label: "DATA".into(),
            source_root: PathBuf::from("/data"),
            destination: PathBuf::from("/backup/tmp_partial_backup/DATA"),
            link_dest: Some(PathBuf::from("../../2024-01-02_00:00:00/DATA")),
            excludes: vec!["*.tmp".into(), "/cache/".into()],
            log_file: PathBuf::from("/logs/2024-01-03_00:00:00_DATA_rsync.log"),
        }
    }

    fn args_as_strings(request: &MirrorRequest) -> Vec<String> {
        RsyncMirror::command_args(request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_args() {
        assert_eq!(
            args_as_strings(&request()),
            vec![
                "-a",
                "--delete",
                "--delete-excluded",
                "--exclude=*.tmp",
                "--exclude=/cache/",
                "--link-dest=../../2024-01-02_00:00:00/DATA",
                "--log-file=/logs/2024-01-03_00:00:00_DATA_rsync.log",
                "/data/",
                "/backup/tmp_partial_backup/DATA",
            ]
        );
    }

    #[test]
    fn test_command_args_without_link_or_excludes() {
        let mut request = request();
        request.link_dest = None;
        request.excludes.clear();
        request.source_root = PathBuf::from("/data/");

        let args = args_as_strings(&request);
        assert!(!args.iter().any(|a| a.starts_with("--link-dest")));
        assert!(!args.iter().any(|a| a.starts_with("--exclude")));
        assert!(!args.contains(&"--delete-excluded".to_string()));
        assert!(args.contains(&"/data/".to_string()));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let mut request = request();
        request.log_file = PathBuf::from("log-files/run.log");

        let args = args_as_strings(&request);
        let log_arg = args.iter().find(|a| a.starts_with("--log-file=")).unwrap();
        let log_path = Path::new(log_arg.trim_start_matches("--log-file="));
        assert!(log_path.is_absolute());
        assert!(log_path.ends_with("log-files/run.log"));
    }

    #[test]
    fn test_missing_program_is_mirror_error() {
        let mirror = RsyncMirror::new(&MirrorSettings {
            program: PathBuf::from("/nonexistent/linkback-test-rsync"),
            timeout: None,
        });

        let err = mirror.mirror(&request()).unwrap_err();
        assert!(matches!(err, BackupError::Mirror { ref source_label, .. } if source_label == "DATA"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_decides_outcome() {
        let ok = RsyncMirror::new(&MirrorSettings {
            program: PathBuf::from("true"),
            timeout: None,
        });
        assert!(ok.mirror(&request()).is_ok());

        let failing = RsyncMirror::new(&MirrorSettings {
            program: PathBuf::from("false"),
            timeout: Some(Duration::from_secs(30)),
        });
        let err = failing.mirror(&request()).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_with_timeout_kills_hung_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        let started = Instant::now();
        let status = wait_with_timeout(&mut child, Some(Duration::from_millis(200))).unwrap();

        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_forked_helpers() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let program = temp_dir.path().join("hanging-rsync");
        std::fs::write(&program, "#!/bin/sh\nsleep 8 &\nsleep 8\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mirror = RsyncMirror::new(&MirrorSettings {
            program,
            timeout: Some(Duration::from_secs(1)),
        });

        let started = Instant::now();
        let err = mirror.mirror(&request()).unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_child_exiting_at_deadline_keeps_its_status() {
        use std::os::unix::process::CommandExt;

        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        thread::sleep(Duration::from_millis(300));

        let status = terminate(&mut child).unwrap();

        assert!(status.unwrap().success());
    }
}
