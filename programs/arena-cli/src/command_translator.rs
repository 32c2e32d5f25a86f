//! Translator backed by an external program.
//!
//! The program receives one `TranslationRequest` as JSON on stdin and must
//! print one `TranslationResponse` as JSON on stdout, then exit 0. A program
//! still running at the deadline is killed.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::bail;
use arena_core::{TranslationError, TranslationRequest, TranslationResponse, Translator};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTranslator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, timeout: Duration::from_secs(10) }
    }

    /// Split a command line on whitespace: program, then arguments.
    pub fn parse(command_line: &str) -> anyhow::Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("translator command is empty");
        };
        Ok(Self::new(program, parts.collect()))
    }

    /// How long the program may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Kill and wait, so the program leaves neither a process nor a zombie.
    fn reap(&self, child: &mut Child) {
        if let Err(e) = child.kill() {
            warn!(program = %self.program, error = %e, "could not kill translator");
        }
        let _ = child.wait();
    }
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl Translator for CommandTranslator {
    fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, TranslationError> {
        let payload = serde_json::to_vec(request).map_err(|e| TranslationError::Malformed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranslationError::Unavailable(format!("cannot start `{}`: {e}", self.program)))?;
        let deadline = Instant::now() + self.timeout;

        if let Some(mut stdin) = child.stdin.take() {
            // dropping stdin closes the pipe so the program sees EOF
            if let Err(e) = stdin.write_all(&payload) {
                self.reap(&mut child);
                return Err(TranslationError::Unavailable(format!("cannot write request: {e}")));
            }
        }

        // read both pipes while waiting so a chatty program cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    self.reap(&mut child);
                    return Err(TranslationError::Timeout { after: self.timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    self.reap(&mut child);
                    return Err(TranslationError::Unavailable(format!("`{}` failed: {e}", self.program)));
                }
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        if !status.success() {
            let stderr = stderr.join().unwrap_or_default();
            return Err(TranslationError::Unavailable(format!(
                "`{}` exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        serde_json::from_slice(&stdout).map_err(|e| TranslationError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{CacheKey, StrategyBase};

    fn request() -> TranslationRequest {
        TranslationRequest::new(&CacheKey::from_text("be like pavlov"))
    }

    fn shell(script: &str) -> CommandTranslator {
        CommandTranslator::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_parse() {
        let translator = CommandTranslator::parse("python3  translate.py --model small").unwrap();
        assert_eq!(translator.program, "python3");
        assert_eq!(translator.args, vec!["translate.py", "--model", "small"]);
        assert_eq!(translator.timeout, Duration::from_secs(10));
        assert!(CommandTranslator::parse("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_valid_response() {
        let translator = shell(r#"cat > /dev/null; echo '{"status":"template","name":"pavlov"}'"#);
        assert_eq!(translator.translate(&request()), Ok(TranslationResponse::template(StrategyBase::Pavlov)));
    }

    #[cfg(unix)]
    #[test]
    fn test_echoed_request_is_malformed() {
        // the request itself has no `status` tag
        let translator = CommandTranslator::new("cat", vec![]);
        assert!(matches!(translator.translate(&request()), Err(TranslationError::Malformed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_is_unavailable() {
        let translator = shell("cat > /dev/null; echo overloaded >&2; exit 3");
        let err = translator.translate(&request()).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("overloaded"));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_program_is_killed() {
        let timeout = Duration::from_millis(100);
        let translator = shell("exec sleep 30").with_timeout(timeout);

        let started = Instant::now();
        assert_eq!(translator.translate(&request()), Err(TranslationError::Timeout { after: timeout }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let translator = CommandTranslator::new("arena-no-such-translator", vec![]);
        assert!(matches!(translator.translate(&request()), Err(TranslationError::Unavailable(_))));
    }
}
