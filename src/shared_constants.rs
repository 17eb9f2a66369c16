use core::time::Duration;

/// How many pending changes the coordinator's channel holds before a writer
/// applies the backlog itself.
pub const CHANGE_CHANNEL_CAPACITY: usize = 512;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// Glyphs for `Matrix::describe`
pub const BORDER_CHAR: char = '⬛';
pub const ON_CHAR: char = '⚪';
pub const OFF_CHAR: char = '⚫';
