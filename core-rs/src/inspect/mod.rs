/**
 * inspect module
 * Detection of the primary process's own inspector port from its start flags
 */

pub mod parser;

pub use parser::{join_args, resolve_primary_debug_port, DEFAULT_INSPECT_PORT};
