use super::{registry, CommandResult};
use crate::task::worker::serve_stdio;

/// Serve one task over stdin/stdout. The exit status reflects the reply.
pub fn run_worker() -> CommandResult {
    Ok(serve_stdio(&registry())?)
}
