// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod game;
pub mod highscore;
pub mod letters;
pub mod logging;
pub mod runtime;
pub mod ui;
