use std::process::{Command as ProcessCommand, Stdio};

use nix::unistd::geteuid;

/// Whether an operation must run with administrative rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    None,
    Require,
}

/// Reports whether elevated operations are currently permitted.
///
/// `None` means the answer is not known yet; watchers wait until it is.
pub trait PrivilegeMonitor {
    fn allowed(&self) -> Option<bool>;
}

/// Root is always allowed; anyone else is allowed when the superuser
/// command succeeds without prompting.
#[derive(Debug, Clone)]
pub struct SuperuserMonitor {
    elevation: Elevation,
}

impl SuperuserMonitor {
    pub fn new(elevation: Elevation) -> Self {
        Self { elevation }
    }
}

impl PrivilegeMonitor for SuperuserMonitor {
    fn allowed(&self) -> Option<bool> {
        if self.elevation.is_root {
            return Some(true);
        }
        if self.elevation.superuser_command.is_empty() {
            return Some(false);
        }
        let mut probe = self.elevation.command(&["true".to_owned()], Privilege::Require);
        probe
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match probe.status() {
            Ok(status) => Some(status.success()),
            Err(error) => {
                log::debug!("superuser probe failed to start: {error}");
                Some(false)
            }
        }
    }
}

/// Builds commands that run with administrative rights when required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    pub superuser_command: Vec<String>,
    pub is_root: bool,
}

impl Elevation {
    pub fn new(superuser_command: Vec<String>) -> Self {
        Self {
            superuser_command,
            is_root: geteuid().is_root(),
        }
    }

    pub fn argv(&self, argv: &[String], privilege: Privilege) -> Vec<String> {
        let mut full = Vec::with_capacity(argv.len() + self.superuser_command.len());
        if privilege == Privilege::Require && !self.is_root {
            full.extend(self.superuser_command.iter().cloned());
        }
        full.extend(argv.iter().cloned());
        full
    }

    pub fn command(&self, argv: &[String], privilege: Privilege) -> ProcessCommand {
        let full = self.argv(argv, privilege);
        let mut process = ProcessCommand::new(full.first().map(String::as_str).unwrap_or("true"));
        process.args(full.iter().skip(1));
        process
    }
}
