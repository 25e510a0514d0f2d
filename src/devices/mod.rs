//! Device Subsystem
//!
//! Hardware device drivers:
//! - `keyboard`: PS/2 keyboard driver and scancode decoding
//! - `pic`: legacy 8259 interrupt controller pair
//! - `vga`: text-mode console output

pub mod keyboard;
pub mod pic;
pub mod vga;
