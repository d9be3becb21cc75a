//! Tracking code generation.
//!
//! Codes are `qrgen_` followed by 8 ASCII alphanumerics. Uniqueness is not
//! checked up front; callers attempt the insert and report a conflict, and
//! the generator draws a fresh candidate until the attempt ceiling is hit.

use rand::distr::{Alphanumeric, SampleString};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub const CODE_PREFIX: &str = "qrgen_";
pub const CODE_RANDOM_LEN: usize = 8;

/// Source of candidate codes
pub trait CodeSource: Send + Sync {
    fn draw(&self) -> String;
}

/// Thread-local CSPRNG over `[A-Za-z0-9]`
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn draw(&self) -> String {
        let suffix = Alphanumeric.sample_string(&mut rand::rng(), CODE_RANDOM_LEN);
        format!("{CODE_PREFIX}{suffix}")
    }
}

/// Outcome of one insert attempt with a candidate code
#[derive(Debug)]
pub enum AttemptError<E> {
    /// The candidate is already taken; draw another one
    Conflict,
    Failed(E),
}

#[derive(Debug)]
pub enum GenerateError<E> {
    Exhausted { attempts: u32 },
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for GenerateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::Exhausted { attempts } => write!(
                f,
                "could not find an unused tracking code after {attempts} attempts"
            ),
            GenerateError::Failed(err) => err.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for GenerateError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerateError::Exhausted { .. } => None,
            GenerateError::Failed(err) => Some(err),
        }
    }
}

#[derive(Clone)]
pub struct CodeGenerator {
    source: Arc<dyn CodeSource>,
    max_attempts: u32,
}

impl CodeGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_source(Arc::new(RandomCodeSource), max_attempts)
    }

    pub fn with_source(source: Arc<dyn CodeSource>, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn candidate(&self) -> String {
        self.source.draw()
    }

    /// Run `attempt` with fresh candidates until it stops reporting a conflict.
    pub async fn with_unique_code<T, E, F, Fut>(&self, mut attempt: F) -> Result<T, GenerateError<E>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        for n in 1..=self.max_attempts {
            let code = self.candidate();
            match attempt(code.clone()).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Conflict) => {
                    tracing::warn!(
                        tracking_code = %code,
                        attempt = n,
                        max_attempts = self.max_attempts,
                        "tracking code collision, drawing another candidate"
                    );
                }
                Err(AttemptError::Failed(err)) => return Err(GenerateError::Failed(err)),
            }
        }

        Err(GenerateError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Whether `code` has the shape of a generated tracking code
pub fn is_well_formed(code: &str) -> bool {
    code.strip_prefix(CODE_PREFIX).is_some_and(|suffix| {
        suffix.len() == CODE_RANDOM_LEN && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
    })
}
