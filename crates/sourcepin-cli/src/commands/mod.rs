pub mod completions;
pub mod man_pages;
pub mod pin;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;

/// Errors starting with this prefix exit with [`EXIT_INPUT_ERROR`].
pub const INPUT_ERROR_PREFIX: &str = "invalid input:";

pub fn input_error(e: impl std::fmt::Display) -> String {
    format!("{INPUT_ERROR_PREFIX} {e}")
}
