//! Gated iteration loop controller.
//!
//! A loop runs a fixed sequence of agent roles over a workspace, one
//! iteration at a time, until the final role emits the completion promise and
//! every configured gate holds. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (promise extraction, checklist
//!   scanning, gate algebra, stuck streaks). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem artifacts, git,
//!   process execution, templates). Isolated behind traits where tests need
//!   fakes.
//!
//! Orchestration modules ([`iteration`], [`looping`]) and the command modules
//! ([`dry_run`], [`status`], [`approve`], [`validate`]) combine the two to
//! implement CLI commands.

pub mod approve;
pub mod core;
pub mod dry_run;
pub mod exit_codes;
pub mod io;
pub mod iteration;
pub mod logging;
pub mod looping;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
