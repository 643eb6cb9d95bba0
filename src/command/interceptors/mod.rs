//! Built-in stages of the command pipeline, outermost first:
//! logging, retry, context, transaction, invoker.

pub mod context;
pub mod invoker;
pub mod logging;
pub mod retry;
pub mod transaction;

pub use context::CommandContextInterceptor;
pub use invoker::CommandInvoker;
pub use logging::LogInterceptor;
pub use retry::RetryInterceptor;
pub use transaction::TransactionContextInterceptor;
