//! Ranked fallback: walk an ordered candidate list, first success wins.
//!
//! Used for typefaces, stock/generative providers, and the download tiers a
//! single provider offers. Candidates are attempted at most once each and in
//! order; when the list is exhausted the caller gets every failure back, the
//! last one being the most relevant.

use std::fmt;
use std::future::Future;

#[derive(Debug)]
pub struct Failure<E> {
    pub label: String,
    pub error: E,
}

#[derive(Debug)]
pub struct FallbackError<E> {
    pub failures: Vec<Failure<E>>,
}

impl<E> FallbackError<E> {
    pub fn attempts(&self) -> usize {
        self.failures.len()
    }

    pub fn last(&self) -> Option<&Failure<E>> {
        self.failures.last()
    }

    pub fn into_last(self) -> Option<Failure<E>> {
        self.failures.into_iter().last()
    }
}

impl<E: fmt::Display> FallbackError<E> {
    /// One line per failed attempt, in attempt order.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.label, f.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl<E: fmt::Display> fmt::Display for FallbackError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            None => write!(f, "no candidates available"),
            Some(last) => write!(
                f,
                "all {} candidates failed, last was {}: {}",
                self.attempts(),
                last.label,
                last.error
            ),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for FallbackError<E> {}

/// Tries `attempt` on each candidate in order and returns the first success.
pub async fn first_success<C, T, E, L, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    label: L,
    mut attempt: F,
) -> Result<T, FallbackError<E>>
where
    L: Fn(&C) -> String,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        let name = label(&candidate);
        match attempt(candidate).await {
            Ok(value) => return Ok(value),
            Err(error) => failures.push(Failure { label: name, error }),
        }
    }
    Err(FallbackError { failures })
}
