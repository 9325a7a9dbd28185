//! Output handling: block formatting and buffered file output.

mod buffer_manager;
mod formatter;

pub use buffer_manager::{BufferManager, BufferStats, BufferSummary};
pub use formatter::{
    ERROR_MARKER, format_block, format_error_block, normalize_line_endings, strip_command_echo,
};
