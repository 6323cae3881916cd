//!Setup and control loop errors.
use std::fmt::{self, Debug, Display};

use thiserror::Error;

///Why the daemon could not be configured or brought up. Config validation collects every problem it finds before
///giving up, so one error may carry several.
pub enum T2tBuildError {
    Problem(String),
    Problems(Vec<String>),
}

impl T2tBuildError {
    pub fn new(problem: impl Into<String>) -> Self {
        T2tBuildError::Problem(problem.into())
    }

    pub fn from_problems(problems: Vec<String>) -> Self {
        T2tBuildError::Problems(problems)
    }

    ///Collect the problems of several errors into one.
    pub fn merge(errs: Vec<T2tBuildError>) -> Self {
        let problems = errs
            .into_iter()
            .flat_map(|err| match err {
                Self::Problem(problem) => vec![problem],
                Self::Problems(problems) => problems,
            })
            .collect();
        Self::Problems(problems)
    }

    pub fn problems(&self) -> &[String] {
        match self {
            Self::Problem(problem) => std::slice::from_ref(problem),
            Self::Problems(problems) => problems.as_slice(),
        }
    }
}

impl Debug for T2tBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problems = self.problems();
        if problems.len() == 1 {
            write!(f, "text2type setup failed: {}", problems[0])
        } else {
            write!(f, "text2type setup failed with {} problems:", problems.len())?;
            for problem in problems {
                write!(f, "\n  - {}", problem)?;
            }
            Ok(())
        }
    }
}

impl Display for T2tBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.problems().join("; "))
    }
}

impl std::error::Error for T2tBuildError {}

///Errors that take the control loop out of its running state.
#[derive(Debug, Error)]
pub enum DaemonError {
    ///The byte source could not be opened or re-opened.
    #[error("byte source unavailable: {0}")]
    ChannelSourceUnavailable(String),

    ///The actuator could not be reset after a degraded restart.
    #[error("actuator failed: {0}")]
    ActuatorFailed(String),
}
