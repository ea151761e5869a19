use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Remaining open attempts for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    initial: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(attempts: u32) -> Self {
        Self {
            initial: attempts,
            remaining: attempts,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.initial - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spends one attempt and returns how many are left.
    pub fn consume(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered<T> {
    pub value: T,
    /// Number of times `recover` ran before `op` succeeded.
    pub recoveries: u32,
}

/// Runs `op`, applying `recover` to the input and retrying on failure up to
/// `retries` times. The last error is returned once.
pub async fn with_recovery<S, T, E, Op, Fut, Rec>(
    mut input: S,
    retries: u32,
    mut recover: Rec,
    mut op: Op,
) -> Result<Recovered<T>, E>
where
    S: Clone,
    E: Display,
    Op: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Rec: FnMut(&mut S, &E),
{
    let mut recoveries = 0;
    loop {
        match op(input.clone()).await {
            Ok(value) => return Ok(Recovered { value, recoveries }),
            Err(err) if recoveries < retries => {
                warn!(error = %err, recoveries, "operation failed, retrying with recovered input");
                recover(&mut input, &err);
                recoveries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
