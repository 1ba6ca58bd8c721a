/*!
 * Core Module
 * Shared types and error definitions for the timeout machinery
 */

pub mod errors;
pub mod types;

pub use errors::{TimeoutError, TimeoutResult};
pub use types::{BoxedError, ErrorSpec, ExpiredTimeout, TimeoutId};
