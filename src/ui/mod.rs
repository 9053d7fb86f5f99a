//! Text console for driving the controller interactively

pub mod console;

pub use console::Console;
