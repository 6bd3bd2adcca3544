//! The middleware chain wrapping every strategy dispatch (`spec.md` §4.4).

use async_trait::async_trait;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::result::StrategyResult;

/// One link in the chain wrapped around strategy dispatch: logging,
/// per-node-kind input shaping, rate limiting, and the like all implement
/// this rather than being hardwired into the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Run this middleware's logic, then call `next.run(ctx)` to continue
    /// the chain (or skip the call to short-circuit).
    async fn handle(&self, ctx: ActionContext, next: Next<'_>) -> Result<StrategyResult, ActionError>;
}

/// The terminal strategy dispatch a middleware chain eventually calls
/// into. Its future is boxed as `'static` so `Next`'s own lifetime only
/// has to cover the chain slice and this function pointer, not whatever
/// the strategy call internally borrows.
pub type DispatchFn =
    dyn Fn(ActionContext) -> futures::future::BoxFuture<'static, Result<StrategyResult, ActionError>> + Sync;

/// The remainder of the middleware chain, including the terminal strategy
/// dispatch itself.
pub struct Next<'a> {
    chain: &'a [std::sync::Arc<dyn Middleware>],
    dispatch: &'a DispatchFn,
}

impl<'a> Next<'a> {
    /// Build a `Next` over `chain`, terminating in `dispatch` once the
    /// chain is exhausted.
    #[must_use]
    pub fn new(chain: &'a [std::sync::Arc<dyn Middleware>], dispatch: &'a DispatchFn) -> Self {
        Self { chain, dispatch }
    }

    /// Invoke the next link, or the terminal dispatch when the chain is empty.
    pub async fn run(self, ctx: ActionContext) -> Result<StrategyResult, ActionError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next::new(rest, self.dispatch);
                head.handle(ctx, next).await
            }
            None => (self.dispatch)(ctx).await,
        }
    }
}

/// Run `ctx` through `chain`, terminating in `dispatch`.
pub async fn run_chain(
    chain: &[std::sync::Arc<dyn Middleware>],
    ctx: ActionContext,
    dispatch: &DispatchFn,
) -> Result<StrategyResult, ActionError> {
    Next::new(chain, dispatch).run(ctx).await
}
