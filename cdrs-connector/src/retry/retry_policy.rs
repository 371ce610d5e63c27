use derive_more::Display;

use crate::frame::message_error::{ErrorBody, ErrorCode};
use crate::protocol_error::Error;

#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Copy, Clone, Display)]
pub enum RetryDecision {
    RetrySameNode,
    RetryNextNode,
    DontRetry,
}

/// Information about a failed query.
pub struct QueryInfo<'a> {
    pub error: &'a Error,
    pub is_idempotent: bool,
}

/// Query-specific information about current state of retrying.
pub trait RetrySession {
    /// Decide what to do with the failing query.
    fn decide(&mut self, query_info: QueryInfo) -> RetryDecision;
}

/// Retry policy determines what to do in case of communication error.
pub trait RetryPolicy {
    /// Called for each new query, starts a session of deciding about retries.
    fn new_session(&self) -> Box<dyn RetrySession + Send + Sync>;
}

/// Forwards all errors directly to the user, never retries
#[derive(Default)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn new_session(&self) -> Box<dyn RetrySession + Send + Sync> {
        Box::new(FallthroughRetrySession)
    }
}

struct FallthroughRetrySession;

impl RetrySession for FallthroughRetrySession {
    fn decide(&mut self, _query_info: QueryInfo) -> RetryDecision {
        RetryDecision::DontRetry
    }
}

/// Retries recoverable errors up to a fixed number of times per query. Errors which cannot get
/// better by retrying (syntax, invalid queries, authentication, ...) are never retried.
/// Non-idempotent queries are only retried when the node provably did not execute them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MultipleRetryPolicy {
    max_retries: usize,
}

impl MultipleRetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        MultipleRetryPolicy { max_retries }
    }

    #[inline]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

impl RetryPolicy for MultipleRetryPolicy {
    fn new_session(&self) -> Box<dyn RetrySession + Send + Sync> {
        Box::new(MultipleRetrySession {
            max_retries: self.max_retries,
            retries: 0,
        })
    }
}

struct MultipleRetrySession {
    max_retries: usize,
    retries: usize,
}

impl MultipleRetrySession {
    fn decision_for(query_info: &QueryInfo) -> RetryDecision {
        let idempotent = |decision| {
            if query_info.is_idempotent {
                decision
            } else {
                RetryDecision::DontRetry
            }
        };

        match query_info.error {
            // the coordinator rejected the request before executing it
            Error::Server {
                body:
                    ErrorBody {
                        error_code:
                            ErrorCode::Unavailable | ErrorCode::Overloaded | ErrorCode::IsBootstrapping,
                        ..
                    },
                ..
            } => RetryDecision::RetryNextNode,
            Error::Server {
                body:
                    ErrorBody {
                        error_code: ErrorCode::ReadTimeout | ErrorCode::WriteTimeout,
                        ..
                    },
                ..
            } => idempotent(RetryDecision::RetrySameNode),
            Error::Server {
                body:
                    ErrorBody {
                        error_code: ErrorCode::Server | ErrorCode::Truncate,
                        ..
                    },
                ..
            }
            | Error::Io(_)
            | Error::Timeout(_)
            | Error::General(_) => idempotent(RetryDecision::RetryNextNode),
            _ => RetryDecision::DontRetry,
        }
    }
}

impl RetrySession for MultipleRetrySession {
    fn decide(&mut self, query_info: QueryInfo) -> RetryDecision {
        if self.retries >= self.max_retries {
            return RetryDecision::DontRetry;
        }

        let decision = Self::decision_for(&query_info);
        if decision != RetryDecision::DontRetry {
            self.retries += 1;
        }

        decision
    }
}
