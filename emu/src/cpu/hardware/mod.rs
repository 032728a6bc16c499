pub mod display;
pub mod internal_memory;
pub mod keypad;
pub mod timers;
