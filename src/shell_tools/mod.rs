use crate::error::CommandError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq)]
pub struct RunDetails {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug)]
pub struct RunResult {
    result: Result<RunDetails, std::io::Error>,
    command: String,
}

impl RunResult {
    /// Returns true if the command could not be started (not installed, or a general I/O error)
    pub fn not_found(&self) -> bool {
        self.result.is_err()
    }

    /// Returns true if the command returned a non-zero exit code
    pub fn non_zero_exit(&self) -> bool {
        match &self.result {
            Ok(details) => details.exit_code != Some(0),
            Err(_) => false,
        }
    }

    /// Returns true if there was a failure of the command (either not found or non-zero exit code)
    pub fn failure(&self) -> bool {
        self.not_found() || self.non_zero_exit()
    }

    pub fn stdout(&self) -> &str {
        self.result.as_ref().map(|d| d.stdout.as_str()).unwrap_or("")
    }

    pub fn stderr(&self) -> &str {
        self.result.as_ref().map(|d| d.stderr.as_str()).unwrap_or("")
    }

    /// Turns any failure into a `CommandError`, keeping the captured output around.
    pub fn into_result(self) -> Result<RunDetails, CommandError> {
        let command = self.command;
        match self.result {
            Err(source) => Err(CommandError::NotFound { command, source }),
            Ok(details) if details.exit_code != Some(0) => Err(CommandError::NonZeroExit {
                command,
                code: details.exit_code,
                stdout: details.stdout,
                stderr: details.stderr,
            }),
            Ok(details) => Ok(details),
        }
    }
}

/// A program invocation. Arguments are passed as-is, no shell is involved.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: &str) -> Self {
        ShellCommand {
            program: program.to_string(),
            args: Vec::new(),
            dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Human readable form, for logs and error messages
    pub fn display(&self) -> String {
        let mut ret = self.program.clone();
        for arg in &self.args {
            ret.push(' ');
            ret.push_str(arg);
        }
        ret
    }

    pub fn run(&self) -> RunResult {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %self.display(), "running");
        let result = cmd.output().map(|o| RunDetails {
            stdout: String::from_utf8_lossy(&o.stdout).to_string(),
            stderr: String::from_utf8_lossy(&o.stderr).to_string(),
            exit_code: o.status.code(),
        });

        RunResult {
            result,
            command: self.display(),
        }
    }
}

/// The program is spawned directly, so paths containing spaces are fine.
pub fn check_command_exist(command: &str) -> bool {
    Command::new(command)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .is_ok()
}


#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn missing_program_is_not_found() {
        let res = ShellCommand::new("definitely-not-a-real-binary-4k2j").run();
        assert!(res.not_found());
        assert!(!res.non_zero_exit());
        assert!(res.failure());
        assert_eq!(res.stdout(), "");
        assert_matches!(res.into_result(), Err(CommandError::NotFound { .. }));
    }

    #[test]
    fn captures_output_and_exit_code() {
        let res = ShellCommand::new("sh").arg("-c").arg("echo out; echo err >&2; exit 3").run();
        assert!(res.non_zero_exit());
        assert_eq!(res.stdout().trim(), "out");
        assert_eq!(res.stderr().trim(), "err");
        match res.into_result() {
            Err(CommandError::NonZeroExit { code, stdout, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "err");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn env_and_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let env = vec![("DEPLOYCHECK_TEST_VAR".to_string(), "hello".to_string())];
        let res = ShellCommand::new("sh")
            .arg("-c")
            .arg("echo $DEPLOYCHECK_TEST_VAR; pwd")
            .current_dir(dir.path())
            .envs(env.iter().map(|(k, v)| (k, v)))
            .run();
        let details = res.into_result().unwrap();
        let mut lines = details.stdout.lines();
        assert_eq!(lines.next(), Some("hello"));
        let pwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn program_path_may_contain_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let program = testing::fake_program(&dir.path().join("my tools"), "terraform", "echo ran $1");

        let path = program.to_str().unwrap();
        assert!(check_command_exist(path));
        assert!(!check_command_exist(dir.path().join("my tools").join("absent").to_str().unwrap()));
        let details = ShellCommand::new(path).arg("version").run().into_result().unwrap();
        assert_eq!(details.stdout.trim(), "ran version");
    }

    #[test]
    fn display_joins_program_and_args() {
        let cmd = ShellCommand::new("terraform").args(vec!["output", "-json"]);
        assert_eq!(cmd.display(), "terraform output -json");
    }
}
