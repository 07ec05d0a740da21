//! OS service registration
//!
//! | Platform | Backend | Registration |
//! |----------|---------|--------------|
//! | Linux | [`SystemdBackend`] | `~/.config/systemd/user/<name>.service`, `systemctl --user` |
//! | Windows | [`TaskSchedulerBackend`] | `schtasks` task run at startup as SYSTEM |
//!
//! Both launch `crab-print-agent --work-dir <dir> run`. Operator actions are
//! synchronous: they return only once the OS tool has answered.

use crate::core::ErrorClass;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

const SERVICE_PREFIX: &str = "crab-print-agent";
const USER_SYSTEMD_DIR: &str = ".config/systemd/user";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service management is not supported on {0}")]
    Unsupported(String),

    #[error("Service {0} is not installed")]
    NotInstalled(String),

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline restarted {restarts} times within {window:?}, giving up")]
    RestartBudgetExceeded { restarts: u32, window: Duration },
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Unsupported(_) | ServiceError::NotInstalled(_) => ErrorClass::Config,
            _ => ErrorClass::Transient,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// `crab-print-agent-<locationId>`, id reduced to `[A-Za-z0-9_-]`
pub fn service_name(location_id: &str) -> String {
    let id: String = location_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}-{}", SERVICE_PREFIX, id)
}

/// What gets registered
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub exe: PathBuf,
    pub work_dir: PathBuf,
}

impl ServiceSpec {
    pub fn new(location_id: &str, location_name: &str, exe: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            name: service_name(location_id),
            description: format!("Crab print agent ({})", location_name),
            exe,
            work_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    NotInstalled,
    Stopped,
    Running,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::NotInstalled => write!(f, "not installed"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Running => write!(f, "running"),
        }
    }
}

/// Install/start/stop/uninstall for one platform
pub trait ServiceBackend {
    fn name(&self) -> &str;
    fn install(&self) -> ServiceResult<()>;
    fn start(&self) -> ServiceResult<()>;
    fn stop(&self) -> ServiceResult<()>;
    /// Stops a running instance first, then removes the registration
    fn uninstall(&self) -> ServiceResult<()>;
    fn status(&self) -> ServiceResult<ServiceStatus>;
}

// ========== Command execution ==========

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs OS service tools (replaced in tests)
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> ServiceResult<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> ServiceResult<CommandOutput> {
        tracing::debug!(program, args = ?args, "Running service command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Spawn {
                command: render_command(program, args),
                source,
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run and fail on a non-zero exit
fn run_checked<R: CommandRunner>(
    runner: &R,
    program: &str,
    args: &[&str],
) -> ServiceResult<CommandOutput> {
    let output = runner.run(program, args)?;
    if !output.success {
        return Err(ServiceError::CommandFailed {
            command: render_command(program, args),
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

// ========== systemd ==========

const SYSTEMD_UNIT_TEMPLATE: &str = "\
[Unit]\n\
Description=%description%\n\
After=network-online.target\n\
Wants=network-online.target\n\
\n\
[Service]\n\
Type=simple\n\
ExecStart=\"%exe_path%\" --work-dir \"%work_dir%\" run\n\
WorkingDirectory=%work_dir%\n\
Restart=on-failure\n\
RestartSec=10\n\
\n\
[Install]\n\
WantedBy=default.target\n\
";

/// systemd user unit
pub struct SystemdBackend<R: CommandRunner = SystemCommandRunner> {
    spec: ServiceSpec,
    unit_dir: PathBuf,
    runner: R,
}

impl SystemdBackend<SystemCommandRunner> {
    /// Units go under `$HOME/.config/systemd/user`
    pub fn for_current_user(spec: ServiceSpec) -> ServiceResult<Self> {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| ServiceError::Unsupported("a session without HOME".into()))?;
        Ok(Self::new(
            spec,
            Path::new(&home).join(USER_SYSTEMD_DIR),
            SystemCommandRunner,
        ))
    }
}

impl<R: CommandRunner> SystemdBackend<R> {
    pub fn new(spec: ServiceSpec, unit_dir: PathBuf, runner: R) -> Self {
        Self {
            spec,
            unit_dir,
            runner,
        }
    }

    fn unit(&self) -> String {
        format!("{}.service", self.spec.name)
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit())
    }

    pub fn unit_content(&self) -> String {
        SYSTEMD_UNIT_TEMPLATE
            .replace("%description%", &self.spec.description)
            .replace("%exe_path%", &self.spec.exe.display().to_string())
            .replace("%work_dir%", &self.spec.work_dir.display().to_string())
    }

    fn systemctl(&self, args: &[&str]) -> ServiceResult<CommandOutput> {
        let mut full = vec!["--user"];
        full.extend_from_slice(args);
        run_checked(&self.runner, "systemctl", &full)
    }

    fn ensure_installed(&self) -> ServiceResult<()> {
        if !self.unit_path().exists() {
            return Err(ServiceError::NotInstalled(self.spec.name.clone()));
        }
        Ok(())
    }
}

impl<R: CommandRunner> ServiceBackend for SystemdBackend<R> {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn install(&self) -> ServiceResult<()> {
        let path = self.unit_path();
        std::fs::create_dir_all(&self.unit_dir).map_err(|source| ServiceError::Io {
            path: self.unit_dir.clone(),
            source,
        })?;
        std::fs::write(&path, self.unit_content()).map_err(|source| ServiceError::Io {
            path: path.clone(),
            source,
        })?;

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.unit()])?;
        tracing::info!(unit = %path.display(), "Installed systemd user unit");
        Ok(())
    }

    fn start(&self) -> ServiceResult<()> {
        self.ensure_installed()?;
        self.systemctl(&["start", &self.unit()])?;
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.ensure_installed()?;
        self.systemctl(&["stop", &self.unit()])?;
        Ok(())
    }

    fn uninstall(&self) -> ServiceResult<()> {
        if self.status()? == ServiceStatus::Running {
            self.stop()?;
        }
        self.systemctl(&["disable", &self.unit()])?;

        let path = self.unit_path();
        std::fs::remove_file(&path).map_err(|source| ServiceError::Io {
            path: path.clone(),
            source,
        })?;
        self.systemctl(&["daemon-reload"])?;
        tracing::info!(unit = %path.display(), "Removed systemd user unit");
        Ok(())
    }

    fn status(&self) -> ServiceResult<ServiceStatus> {
        if self.ensure_installed().is_err() {
            return Ok(ServiceStatus::NotInstalled);
        }
        // is-active exits non-zero for inactive units; only the answer matters
        let output = self
            .runner
            .run("systemctl", &["--user", "is-active", &self.unit()])?;
        if output.stdout.trim() == "active" {
            Ok(ServiceStatus::Running)
        } else {
            Ok(ServiceStatus::Stopped)
        }
    }
}

// ========== Windows Task Scheduler ==========

/// Task Scheduler task, started at boot under the SYSTEM account
pub struct TaskSchedulerBackend<R: CommandRunner = SystemCommandRunner> {
    spec: ServiceSpec,
    runner: R,
}

impl<R: CommandRunner> TaskSchedulerBackend<R> {
    pub fn new(spec: ServiceSpec, runner: R) -> Self {
        Self { spec, runner }
    }

    pub fn task_command(&self) -> String {
        format!(
            "\"{}\" --work-dir \"{}\" run",
            self.spec.exe.display(),
            self.spec.work_dir.display()
        )
    }

    fn schtasks(&self, args: &[&str]) -> ServiceResult<CommandOutput> {
        run_checked(&self.runner, "schtasks", args)
    }
}

impl<R: CommandRunner> ServiceBackend for TaskSchedulerBackend<R> {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn install(&self) -> ServiceResult<()> {
        let command = self.task_command();
        self.schtasks(&[
            "/Create",
            "/TN",
            &self.spec.name,
            "/TR",
            &command,
            "/SC",
            "ONSTART",
            "/RU",
            "SYSTEM",
            "/RL",
            "HIGHEST",
            "/F",
        ])?;
        tracing::info!(task = %self.spec.name, "Registered scheduled task");
        Ok(())
    }

    fn start(&self) -> ServiceResult<()> {
        if self.status()? == ServiceStatus::NotInstalled {
            return Err(ServiceError::NotInstalled(self.spec.name.clone()));
        }
        self.schtasks(&["/Run", "/TN", &self.spec.name])?;
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        if self.status()? == ServiceStatus::NotInstalled {
            return Err(ServiceError::NotInstalled(self.spec.name.clone()));
        }
        self.schtasks(&["/End", "/TN", &self.spec.name])?;
        Ok(())
    }

    fn uninstall(&self) -> ServiceResult<()> {
        match self.status()? {
            ServiceStatus::NotInstalled => {
                return Err(ServiceError::NotInstalled(self.spec.name.clone()));
            }
            ServiceStatus::Running => self.stop()?,
            ServiceStatus::Stopped => {}
        }
        self.schtasks(&["/Delete", "/TN", &self.spec.name, "/F"])?;
        tracing::info!(task = %self.spec.name, "Removed scheduled task");
        Ok(())
    }

    fn status(&self) -> ServiceResult<ServiceStatus> {
        let output = self
            .runner
            .run("schtasks", &["/Query", "/TN", &self.spec.name, "/FO", "LIST"])?;
        if !output.success {
            return Ok(ServiceStatus::NotInstalled);
        }
        if output.stdout.contains("Running") {
            Ok(ServiceStatus::Running)
        } else {
            Ok(ServiceStatus::Stopped)
        }
    }
}

/// Backend for the current OS
#[cfg(target_os = "linux")]
pub fn platform_backend(spec: ServiceSpec) -> ServiceResult<Box<dyn ServiceBackend>> {
    Ok(Box::new(SystemdBackend::for_current_user(spec)?))
}

/// Backend for the current OS
#[cfg(windows)]
pub fn platform_backend(spec: ServiceSpec) -> ServiceResult<Box<dyn ServiceBackend>> {
    Ok(Box::new(TaskSchedulerBackend::new(spec, SystemCommandRunner)))
}

/// Backend for the current OS
#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_backend(_spec: ServiceSpec) -> ServiceResult<Box<dyn ServiceBackend>> {
    Err(ServiceError::Unsupported(std::env::consts::OS.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records calls; `is-active` / `/Query` answers come from `running`
    struct RecordingRunner {
        calls: RefCell<Vec<(String, bool)>>,
        running: bool,
        watch: Option<PathBuf>,
        installed_task: bool,
    }

    impl RecordingRunner {
        fn new(running: bool) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                running,
                watch: None,
                installed_task: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> ServiceResult<CommandOutput> {
            let unit_present = self.watch.as_ref().is_some_and(|p| p.exists());
            self.calls
                .borrow_mut()
                .push((render_command(program, args), unit_present));

            let querying = args.contains(&"is-active") || args.contains(&"/Query");
            let stdout = match (querying, self.running) {
                (true, true) if program == "systemctl" => "active",
                (true, false) if program == "systemctl" => "inactive",
                (true, true) => "Status: Running",
                (true, false) => "Status: Ready",
                _ => "",
            };
            Ok(CommandOutput {
                success: !(program == "schtasks" && querying && !self.installed_task),
                status: "exit status: 0".into(),
                stdout: stdout.into(),
                stderr: String::new(),
            })
        }
    }

    fn spec() -> ServiceSpec {
        ServiceSpec::new(
            "kadikoy/01",
            "Kadıköy",
            PathBuf::from("/opt/crab/crab-print-agent"),
            PathBuf::from("/var/lib/crab"),
        )
    }

    #[test]
    fn test_service_name_is_sanitized() {
        assert_eq!(service_name("kadikoy-01"), "crab-print-agent-kadikoy-01");
        assert_eq!(service_name("kadikoy/01 ş"), "crab-print-agent-kadikoy-01--");
    }

    #[test]
    fn test_systemd_install_writes_unit() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemdBackend::new(spec(), dir.path().to_path_buf(), RecordingRunner::new(false));

        backend.install().unwrap();

        let unit = std::fs::read_to_string(backend.unit_path()).unwrap();
        assert!(unit.contains(
            "ExecStart=\"/opt/crab/crab-print-agent\" --work-dir \"/var/lib/crab\" run"
        ));
        assert!(unit.contains("Restart=on-failure"));
        assert_eq!(
            backend.runner.calls(),
            vec![
                "systemctl --user daemon-reload",
                "systemctl --user enable crab-print-agent-kadikoy-01.service",
            ]
        );
    }

    #[test]
    fn test_systemd_uninstall_stops_before_removing() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = RecordingRunner::new(true);
        runner.watch = Some(dir.path().join("crab-print-agent-kadikoy-01.service"));
        let backend = SystemdBackend::new(spec(), dir.path().to_path_buf(), runner);
        backend.install().unwrap();

        backend.uninstall().unwrap();

        assert!(!backend.unit_path().exists());
        let calls = backend.runner.calls.borrow();
        let stop = calls
            .iter()
            .position(|(c, _)| c.ends_with("stop crab-print-agent-kadikoy-01.service"))
            .unwrap();
        // Unit file still present when stop ran
        assert!(calls[stop].1);
        assert_eq!(calls.last().unwrap().0, "systemctl --user daemon-reload");
        assert!(!calls.last().unwrap().1);
    }

    #[test]
    fn test_systemd_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemdBackend::new(spec(), dir.path().to_path_buf(), RecordingRunner::new(false));

        assert_eq!(backend.status().unwrap(), ServiceStatus::NotInstalled);
        let err = backend.start().unwrap_err();
        assert!(matches!(err, ServiceError::NotInstalled(_)));
        assert_eq!(err.class(), ErrorClass::Config);
        assert!(backend.runner.calls().is_empty());
    }

    #[test]
    fn test_task_scheduler_uninstall_order() {
        let backend = TaskSchedulerBackend::new(spec(), RecordingRunner::new(true));

        backend.uninstall().unwrap();

        let calls = backend.runner.calls();
        let end = calls.iter().position(|c| c.starts_with("schtasks /End")).unwrap();
        let delete = calls
            .iter()
            .position(|c| c.starts_with("schtasks /Delete"))
            .unwrap();
        assert!(end < delete);
    }

    #[test]
    fn test_task_scheduler_install_command() {
        let backend = TaskSchedulerBackend::new(spec(), RecordingRunner::new(false));
        backend.install().unwrap();

        let calls = backend.runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("schtasks /Create /TN crab-print-agent-kadikoy-01 /TR"));
        assert!(calls[0].contains("/SC ONSTART /RU SYSTEM"));
    }

    #[test]
    fn test_task_scheduler_missing_task() {
        let mut runner = RecordingRunner::new(false);
        runner.installed_task = false;
        let backend = TaskSchedulerBackend::new(spec(), runner);

        assert_eq!(backend.status().unwrap(), ServiceStatus::NotInstalled);
        assert!(matches!(
            backend.uninstall(),
            Err(ServiceError::NotInstalled(_))
        ));
    }
}
