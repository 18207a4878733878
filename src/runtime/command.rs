use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{CommandExecutor, CommandOutput, Invocation, RuntimeError};

const READ_CHUNK: usize = 8 * 1024;

/// Runs commands with tokio, merging stdout and stderr into one buffer.
///
/// Without a timeout a hung command holds its request open until it exits.
pub struct TokioCommandExecutor {
    timeout: Option<Duration>,
}

impl TokioCommandExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for TokioCommandExecutor {
    async fn execute(
        &self,
        invocation: &Invocation,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, RuntimeError> {
        let program = invocation.program.clone();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        debug!("Running {}", invocation.display());
        let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Feed stdin from its own task so a child that fills its output
        // pipes before draining stdin cannot deadlock us.
        let stdin_task = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                let result = pipe.write_all(&input).await;
                drop(pipe);
                result
            })),
            _ => None,
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = {
            let program = program.clone();
            async move {
                let (status, combined) =
                    tokio::join!(child.wait(), read_combined(stdout, stderr));
                let io_err = |source: std::io::Error| RuntimeError::Io {
                    program: program.clone(),
                    source,
                };
                let status = status.map_err(io_err)?;
                let combined = combined.map_err(io_err)?;
                if let Some(task) = stdin_task {
                    // A child that exits without reading stdin closes the
                    // pipe; its output and exit status are what matter.
                    if let Ok(Err(e)) = task.await {
                        debug!("{} did not consume stdin: {}", program, e);
                    }
                }
                Ok::<_, RuntimeError>(CommandOutput {
                    combined,
                    exit_code: status.code(),
                })
            }
        };

        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                // The child is owned by `run`; dropping it kills the process.
                Err(_) => Err(RuntimeError::Timeout { program, timeout }),
            },
            None => run.await,
        }
    }
}

/// Drains both pipes into one buffer in arrival order.
async fn read_combined<O, E>(stdout: Option<O>, stderr: Option<E>) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut combined = Vec::new();
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];
    let (mut stdout, mut stderr) = (stdout, stderr);

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            n = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                match n? {
                    0 => stdout = None,
                    n => combined.extend_from_slice(&out_buf[..n]),
                }
            }
            n = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                match n? {
                    0 => stderr = None,
                    n => combined.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }
    Ok(combined)
}

async fn read_some<R: AsyncRead + Unpin>(
    pipe: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let executor = TokioCommandExecutor::new(None);
        let output = executor
            .execute(&sh("echo out; echo err >&2"), None)
            .await
            .unwrap();
        assert!(output.success());
        let text = String::from_utf8(output.combined).unwrap();
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let executor = TokioCommandExecutor::new(None);
        let output = executor
            .execute(&sh("cat"), Some(b"services: {}\n".to_vec()))
            .await
            .unwrap();
        assert_eq!(output.combined, b"services: {}\n");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_with_output() {
        let executor = TokioCommandExecutor::new(None);
        let output = executor
            .execute(&sh("echo 'error: manifest invalid' >&2; exit 3"), None)
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.combined, b"error: manifest invalid\n");
        assert_eq!(output.status_text(), "exit status 3");
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executor = TokioCommandExecutor::new(None);
        let mut invocation = sh("pwd");
        invocation.working_dir = Some(dir.path().to_path_buf());
        let output = executor.execute(&invocation, None).await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let text = String::from_utf8(output.combined).unwrap();
        assert_eq!(text.trim(), expected.to_str().unwrap());
    }

    #[tokio::test]
    async fn keeps_non_utf8_output_intact() {
        let executor = TokioCommandExecutor::new(None);
        let output = executor
            .execute(&sh("printf 'caf\\351\\n'"), None)
            .await
            .unwrap();
        assert_eq!(output.combined, b"caf\xe9\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let executor = TokioCommandExecutor::new(None);
        let invocation = Invocation {
            program: "definitely-not-a-real-binary-xyz".into(),
            args: vec![],
            working_dir: None,
        };
        let err = executor.execute(&invocation, None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn times_out_hung_command() {
        let executor = TokioCommandExecutor::new(Some(Duration::from_millis(200)));
        let err = executor.execute(&sh("sleep 5"), None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
    }
}
