//! Terminal front-end: the three assistant screens plus terminal lifecycle.

mod screens;
mod terminal;

pub use screens::{
    bar_segments, draw_energy, draw_recording, draw_status, truncate_status, ENERGY_COLUMNS,
    MAX_STATUS_COLS,
};
pub use terminal::{install_terminal_panic_hook, restore_terminal, TerminalRestoreGuard};
