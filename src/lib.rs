#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

#[cfg(not(test))]
extern crate rlibc;

pub mod boot;
pub mod cpu;
pub mod devices;
pub mod interrupts;

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut writer = $crate::devices::vga::WRITER.lock();
        let _ = write!(writer, $($arg)*);
    }};
}

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut writer = $crate::devices::vga::WRITER.lock();
        let _ = writeln!(writer, $($arg)*);
    }};
}
