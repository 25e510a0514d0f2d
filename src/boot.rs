//! Kernel entry point and boot sequence.
//!
//! `kernel_main` is called by the stage that already switched to
//! protected mode and set up a stack. It brings the console up, builds
//! and activates the interrupt table, unmasks the keyboard line and
//! then idles, echoing decoded key presses.

use crate::devices::vga::{self, Color};
use crate::devices::{keyboard, pic};
use crate::interrupts;
use crate::{cpu, print, println};

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    {
        let mut writer = vga::WRITER.lock();
        writer.clear();
        writer.write_colored(
            "MythOS\n",
            vga::attribute(Color::Black, Color::LightGreen, false),
        );
    }

    interrupts::init();
    pic::init();
    keyboard::init();
    cpu::enable_int();
    println!("interrupts: on, keyboard unmasked");

    let mut decoder = keyboard::ScancodeDecoder::new();
    loop {
        while let Some(scancode) = keyboard::dequeue_scancode() {
            if let Some(key) = decoder.process_scancode(scancode) {
                print!("{}", key.character);
            }
        }
        cpu::wait_for_interrupt();
    }
}

// The writer lock may still be held by the panicking path, so break it
// before reporting.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    cpu::disable_int();
    unsafe { vga::WRITER.force_unlock() };
    vga::WRITER
        .lock()
        .set_attribute(vga::attribute(Color::Black, Color::LightRed, false));
    println!("kernel panic: {}", info);
    cpu::halt();
}
