//! Policies deciding how failed requests are retried and how broken connections are
//! re-established.
mod reconnection_policy;
mod retry_policy;

pub use self::reconnection_policy::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, NeverReconnectionPolicy,
    ReconnectionPolicy, ReconnectionSchedule,
};
pub use self::retry_policy::{
    FallthroughRetryPolicy, MultipleRetryPolicy, QueryInfo, RetryDecision, RetryPolicy,
    RetrySession,
};
