//! External process execution.
//!
//! All toolchain work (git, cmake, libtool) goes through [`run`], which
//! captures a tail of stderr for error reports and honours the interrupt
//! flag by killing the running child.

use crate::builder::error::BuildError;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Lines of stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 40;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared interrupt flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route Ctrl-C to this token.
    pub fn install_ctrlc_handler(&self) -> anyhow::Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, stopping current step...");
            token.cancel();
        })?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An argv with `{name}` placeholders.
///
/// A token that is exactly `{name}` expands to every value bound to
/// `name` (so `{inputs}` can become many arguments). Placeholders embedded
/// in a longer token are replaced by the values joined with spaces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(argv.into_iter().map(Into::into).collect())
    }

    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Substitute placeholders and return the full argv.
    pub fn render(&self, values: &BTreeMap<&str, Vec<String>>) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.0.len());
        for token in &self.0 {
            if let Some(list) = token
                .strip_prefix('{')
                .and_then(|t| t.strip_suffix('}'))
                .and_then(|name| values.get(name))
            {
                argv.extend(list.iter().cloned());
                continue;
            }

            let mut rendered = token.clone();
            for (name, list) in values {
                let needle = format!("{{{name}}}");
                if rendered.contains(&needle) {
                    rendered = rendered.replace(&needle, &list.join(" "));
                }
            }
            argv.push(rendered);
        }
        argv
    }

    /// Render into a ready-to-run [`Command`].
    pub fn command(&self, values: &BTreeMap<&str, Vec<String>>) -> Command {
        let argv = self.render(values);
        let mut cmd = Command::new(argv.first().map_or("", String::as_str));
        cmd.args(argv.iter().skip(1));
        cmd
    }
}

/// Run a command to completion.
///
/// stdout is inherited so tool progress stays visible; stderr is echoed
/// and its tail kept for the error. A non-zero exit is
/// [`BuildError::ExternalProcess`].
pub fn run(cmd: &mut Command, cancel: &CancelToken) -> Result<(), BuildError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(
        program = %program,
        args = ?cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect::<Vec<_>>(),
        "spawning"
    );

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled { program });
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| BuildError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stderr = child.stderr.take().map(|pipe| {
        thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(pipe).lines().map_while(Result::ok) {
                eprintln!("{line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
    });

    // On interrupt the reader is left detached: grandchildren of a killed
    // tool can hold the pipe open indefinitely.
    let status = wait(&mut child, &program, cancel)?;
    let stderr = stderr
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(BuildError::ExternalProcess {
            program,
            code: status.code(),
            stderr,
        })
    }
}

fn wait(
    child: &mut Child,
    program: &str,
    cancel: &CancelToken,
) -> Result<std::process::ExitStatus, BuildError> {
    loop {
        if cancel.is_cancelled() {
            warn!(program, pid = child.id(), "killing child after interrupt");
            // The child may already have exited; either way we only need it reaped.
            let _ = child.kill();
            let _ = child.wait();
            return Err(BuildError::Cancelled {
                program: program.to_string(),
            });
        }

        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(BuildError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&'static str, &[&str])]) -> BTreeMap<&'static str, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (*k, v.iter().map(ToString::to_string).collect()))
            .collect()
    }

    #[test]
    fn test_render_expands_list_placeholder() {
        let template = CommandTemplate::new(["libtool", "-static", "-o", "{output}", "{inputs}"]);
        let argv = template.render(&values(&[
            ("output", &["out/Libfoo.a"]),
            ("inputs", &["a.a", "b.a"]),
        ]));
        assert_eq!(
            argv,
            vec!["libtool", "-static", "-o", "out/Libfoo.a", "a.a", "b.a"]
        );
    }

    #[test]
    fn test_render_inline_placeholder() {
        let template = CommandTemplate::new(["cmake", "-DCMAKE_INSTALL_PREFIX={prefix}"]);
        let argv = template.render(&values(&[("prefix", &["/tmp/thin"])]));
        assert_eq!(argv, vec!["cmake", "-DCMAKE_INSTALL_PREFIX=/tmp/thin"]);
    }

    #[test]
    fn test_unknown_placeholder_left_alone() {
        let template = CommandTemplate::new(["echo", "{missing}"]);
        assert_eq!(template.render(&BTreeMap::new()), vec!["echo", "{missing}"]);
    }

    #[test]
    fn test_run_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 0"]);
        run(&mut cmd, &CancelToken::new()).unwrap();
    }

    #[test]
    fn test_run_failure_captures_exit_code_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'configure failed' >&2; exit 3"]);
        let err = run(&mut cmd, &CancelToken::new()).unwrap_err();
        match err {
            BuildError::ExternalProcess {
                program,
                code,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "configure failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stderr_keeps_only_the_tail() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "i=1; while [ $i -le 100 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 1"]);
        let err = run(&mut cmd, &CancelToken::new()).unwrap_err();
        let stderr = match err {
            BuildError::ExternalProcess { stderr, .. } => stderr,
            other => panic!("unexpected error: {other}"),
        };
        let lines: Vec<&str> = stderr.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.first(), Some(&"line 61"));
        assert_eq!(lines.last(), Some(&"line 100"));
    }

    #[test]
    fn test_run_missing_program_is_spawn_error() {
        let mut cmd = Command::new("definitely-not-a-real-tool-1234");
        let err = run(&mut cmd, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[test]
    fn test_cancelled_token_kills_child() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 30"]);
        let err = run(&mut cmd, &cancel).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, BuildError::Cancelled { .. }));
    }

    #[test]
    fn test_cancelled_before_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 0"]);
        assert!(matches!(
            run(&mut cmd, &cancel),
            Err(BuildError::Cancelled { .. })
        ));
    }
}
