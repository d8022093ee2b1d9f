//! Remote command construction for DHCP deployment
//!
//! Privileged commands run under `sudo -S`. The password travels on the
//! channel's stdin, followed by any file payload, so it never appears in the
//! remote command line, process listing, or shell history.

use std::fmt;

use zeroize::Zeroizing;

use crate::config::DhcpTargets;

/// First line of every block this tool appends
pub const MARKER_BEGIN: &str = "# Configuración añadida por VLSM Calculator";

/// Last line of every block this tool appends
pub const MARKER_END: &str = "# Fin de configuración de VLSM Calculator";

/// `-k` ignores cached sudo credentials so the password line is always consumed
/// by sudo, never by the command; `-p ''` suppresses the prompt on stderr.
const SUDO_PREFIX: &str = "sudo -k -S -p ''";

/// What to do when a command exits non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Abort the sequence and report the failure
    MustSucceed,
    /// Log the exit status and continue
    BestEffort,
}

/// Individual commands of the deployment sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    BackupConfig,
    BackupInterfaces,
    RemoveManagedBlock,
    AppendBlock,
    WriteInterfaces,
    ReadBack,
    RestartService,
}

impl DeployStep {
    pub fn name(self) -> &'static str {
        match self {
            DeployStep::BackupConfig => "backup-config",
            DeployStep::BackupInterfaces => "backup-interfaces",
            DeployStep::RemoveManagedBlock => "remove-managed-block",
            DeployStep::AppendBlock => "append-block",
            DeployStep::WriteInterfaces => "write-interfaces",
            DeployStep::ReadBack => "read-back",
            DeployStep::RestartService => "restart-service",
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One command of the sequence, with its stdin and failure policy
pub struct RemoteCommand {
    pub step: DeployStep,
    /// Literal command text; never contains secrets
    pub command: String,
    pub policy: StepPolicy,
    stdin: Option<Zeroizing<Vec<u8>>>,
}

impl RemoteCommand {
    /// Unprivileged command
    pub fn plain(step: DeployStep, command: impl Into<String>, policy: StepPolicy) -> Self {
        Self {
            step,
            command: command.into(),
            policy,
            stdin: None,
        }
    }

    /// Command run through sudo, password supplied on stdin
    pub fn elevated(
        step: DeployStep,
        command: &str,
        password: &str,
        policy: StepPolicy,
    ) -> Self {
        let mut stdin = Zeroizing::new(Vec::with_capacity(password.len() + 1));
        stdin.extend_from_slice(password.as_bytes());
        stdin.push(b'\n');

        Self {
            step,
            command: format!("{} {}", SUDO_PREFIX, command),
            policy,
            stdin: Some(stdin),
        }
    }

    /// Append `input` to the command's stdin (after the password, if any)
    pub fn with_input(mut self, input: &str) -> Self {
        self.stdin
            .get_or_insert_with(|| Zeroizing::new(Vec::new()))
            .extend_from_slice(input.as_bytes());
        self
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_ref().map(|s| s.as_slice())
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("step", &self.step)
            .field("command", &self.command)
            .field("policy", &self.policy)
            .field("stdin", &self.stdin.as_ref().map(|s| format!("<{} bytes>", s.len())))
            .finish()
    }
}

/// Builds the command sequence for one ISC DHCP server
pub struct DhcpCommandSet<'a> {
    targets: &'a DhcpTargets,
    password: &'a str,
}

impl<'a> DhcpCommandSet<'a> {
    pub fn new(targets: &'a DhcpTargets, password: &'a str) -> Self {
        Self { targets, password }
    }

    /// Full ordered sequence for deploying `block`
    pub fn sequence(&self, block: &str) -> Vec<RemoteCommand> {
        vec![
            self.backup_config(),
            self.backup_interfaces(),
            self.remove_managed_block(),
            self.append_block(block),
            self.write_interfaces(),
            self.read_back(),
            self.restart_service(),
        ]
    }

    pub fn backup_config(&self) -> RemoteCommand {
        self.backup(DeployStep::BackupConfig, &self.targets.config_path)
    }

    pub fn backup_interfaces(&self) -> RemoteCommand {
        self.backup(DeployStep::BackupInterfaces, &self.targets.interfaces_path)
    }

    fn backup(&self, step: DeployStep, path: &str) -> RemoteCommand {
        let command = format!(
            "cp -p {} {}",
            shell_quote(path),
            shell_quote(&format!("{}.bak", path))
        );
        RemoteCommand::elevated(step, &command, self.password, StepPolicy::BestEffort)
    }

    /// Delete every begin..end range; a legacy block without an end marker
    /// is removed through the end of the file. `$a\` restores a missing
    /// final newline so the next block starts on its own line.
    pub fn remove_managed_block(&self) -> RemoteCommand {
        let script = format!(
            "/^{}$/,/^{}$/d",
            sed_escape(MARKER_BEGIN),
            sed_escape(MARKER_END)
        );
        let command = format!(
            "sed -i -e {} -e {} {}",
            shell_quote(&script),
            shell_quote("$a\\"),
            shell_quote(&self.targets.config_path)
        );
        RemoteCommand::elevated(
            DeployStep::RemoveManagedBlock,
            &command,
            self.password,
            StepPolicy::BestEffort,
        )
    }

    pub fn append_block(&self, block: &str) -> RemoteCommand {
        let command = format!(
            "tee -a {} > /dev/null",
            shell_quote(&self.targets.config_path)
        );
        RemoteCommand::elevated(
            DeployStep::AppendBlock,
            &command,
            self.password,
            StepPolicy::MustSucceed,
        )
        .with_input(&managed_block(block))
    }

    pub fn write_interfaces(&self) -> RemoteCommand {
        let command = format!(
            "tee {} > /dev/null",
            shell_quote(&self.targets.interfaces_path)
        );
        RemoteCommand::elevated(
            DeployStep::WriteInterfaces,
            &command,
            self.password,
            StepPolicy::MustSucceed,
        )
        .with_input(&format!(
            "INTERFACESv4=\"{}\"\n",
            self.targets.interface_name
        ))
    }

    pub fn read_back(&self) -> RemoteCommand {
        RemoteCommand::plain(
            DeployStep::ReadBack,
            format!("cat {}", shell_quote(&self.targets.config_path)),
            StepPolicy::BestEffort,
        )
    }

    pub fn restart_service(&self) -> RemoteCommand {
        let command = format!(
            "systemctl restart {}",
            shell_quote(&self.targets.service_name)
        );
        RemoteCommand::elevated(
            DeployStep::RestartService,
            &command,
            self.password,
            StepPolicy::MustSucceed,
        )
    }
}

/// `block` wrapped in the begin/end markers, as appended to the config file
///
/// No leading blank line: removing the block must restore the file exactly.
pub fn managed_block(block: &str) -> String {
    format!(
        "{}\n{}\n{}\n",
        MARKER_BEGIN,
        block.trim_end_matches(['\r', '\n']),
        MARKER_END
    )
}

/// Single-quote for a POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Escape a literal line for use inside a sed basic regular expression
fn sed_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '/' | '.' | '*' | '[' | ']' | '^' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "p4ss'word";

    #[test]
    fn test_sequence_order_and_policies() {
        let targets = DhcpTargets::default();
        let commands = DhcpCommandSet::new(&targets, PASSWORD).sequence("subnet 10.0.0.0 {}");

        let steps: Vec<(DeployStep, StepPolicy)> =
            commands.iter().map(|c| (c.step, c.policy)).collect();
        assert_eq!(
            steps,
            vec![
                (DeployStep::BackupConfig, StepPolicy::BestEffort),
                (DeployStep::BackupInterfaces, StepPolicy::BestEffort),
                (DeployStep::RemoveManagedBlock, StepPolicy::BestEffort),
                (DeployStep::AppendBlock, StepPolicy::MustSucceed),
                (DeployStep::WriteInterfaces, StepPolicy::MustSucceed),
                (DeployStep::ReadBack, StepPolicy::BestEffort),
                (DeployStep::RestartService, StepPolicy::MustSucceed),
            ]
        );
    }

    #[test]
    fn test_password_only_on_stdin() {
        let targets = DhcpTargets::default();
        let commands = DhcpCommandSet::new(&targets, PASSWORD).sequence("option x;");

        for command in &commands {
            assert!(!command.command.contains(PASSWORD), "{:?}", command);
            assert!(!format!("{:?}", command).contains(PASSWORD));

            if command.step == DeployStep::ReadBack {
                assert!(command.stdin().is_none());
                assert!(!command.command.starts_with("sudo"));
            } else {
                assert!(command.command.starts_with(SUDO_PREFIX));
                let stdin = command.stdin().unwrap();
                assert!(stdin.starts_with(format!("{}\n", PASSWORD).as_bytes()));
            }
        }
    }

    #[test]
    fn test_append_payload() {
        let targets = DhcpTargets::default();
        let command = DhcpCommandSet::new(&targets, PASSWORD).append_block("subnet a {}\n\n");

        assert_eq!(
            command.command,
            "sudo -k -S -p '' tee -a '/etc/dhcp/dhcpd.conf' > /dev/null"
        );
        let stdin = String::from_utf8(command.stdin().unwrap().to_vec()).unwrap();
        assert_eq!(
            stdin,
            format!("{}\n{}\nsubnet a {{}}\n{}\n", PASSWORD, MARKER_BEGIN, MARKER_END)
        );
    }

    #[test]
    fn test_interfaces_payload() {
        let mut targets = DhcpTargets::default();
        targets.interface_name = "eth1".to_string();
        let command = DhcpCommandSet::new(&targets, PASSWORD).write_interfaces();

        let stdin = String::from_utf8(command.stdin().unwrap().to_vec()).unwrap();
        assert!(stdin.ends_with("\nINTERFACESv4=\"eth1\"\n"));
    }

    #[test]
    fn test_cleanup_script() {
        let targets = DhcpTargets::default();
        let command = DhcpCommandSet::new(&targets, PASSWORD).remove_managed_block();

        assert_eq!(
            command.command,
            format!(
                "sudo -k -S -p '' sed -i -e '/^{}$/,/^{}$/d' -e '$a\\' '/etc/dhcp/dhcpd.conf'",
                MARKER_BEGIN, MARKER_END
            )
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(shell_quote("/etc/it's"), "'/etc/it'\\''s'");
        assert_eq!(sed_escape("a.b/c$"), "a\\.b\\/c\\$");
    }
}
