use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use weave::error::WeaveError;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the runner service.
///
/// Wraps [`WeaveError`] for workload failures and carries a backtrace for
/// infrastructure failures.
#[derive(Debug)]
pub enum RunnerError {
    /// The workload failed or ran past its deadline.
    Weave(WeaveError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl RunnerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            RunnerError::Weave(_) => "workload error",
            RunnerError::Config(_, _) => "configuration error",
            RunnerError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            RunnerError::Weave(err) => err.backtrace(),
            RunnerError::Config(_, cb) => Some(&cb.0),
            RunnerError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RunnerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("runner failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // Aggregated errors already list their members in the message.
        if !matches!(self, RunnerError::Weave(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Weave(err) => write!(f, "{err}"),
            RunnerError::Config(source, _) => write!(f, "configuration error: {source}"),
            RunnerError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for RunnerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunnerError::Weave(err) => err.source(),
            RunnerError::Config(source, _) => Some(source.as_ref()),
            RunnerError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<WeaveError> for RunnerError {
    fn from(err: WeaveError) -> Self {
        RunnerError::Weave(err)
    }
}

#[cfg(test)]
mod tests {
    use weave::concurrency::cancel::CancelCause;
    use weave_config::shared::ValidationError;

    use super::*;

    #[test]
    fn report_lists_category_and_causes() {
        let err = RunnerError::config(ValidationError::InvalidFieldValue {
            field: "pool.workers".to_string(),
            constraint: "must be greater than 0".to_string(),
        });

        let report = err.render_report();
        assert!(report.starts_with("runner failed\n"));
        assert!(report.contains("category: configuration error\n"));
        assert!(report.contains("cause 1: invalid value for `pool.workers`"));
    }

    #[test]
    fn workload_errors_keep_their_kind() {
        let err = RunnerError::from(WeaveError::from(CancelCause::DeadlineExceeded));

        assert_eq!(err.category(), "workload error");
        let RunnerError::Weave(inner) = &err else {
            panic!("expected a workload error");
        };
        assert_eq!(inner.cancel_cause(), Some(CancelCause::DeadlineExceeded));
    }
}
