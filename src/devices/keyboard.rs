//! PS/2 keyboard driver, wired to IRQ1.
//!
//! The interrupt handler does the minimum: read the scancode byte,
//! push it into a fixed-size queue, acknowledge the controller. The
//! boot loop drains the queue and feeds a [`ScancodeDecoder`] outside
//! interrupt context.

use core::mem;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::devices::pic;
use crate::interrupts;
use crate::interrupts::dispatch::{self, Handler};

const BUFFER_SIZE: usize = 256;

static mut SCANCODE_BUF: [u8; BUFFER_SIZE] = [0; BUFFER_SIZE];
static HEAD: AtomicUsize = AtomicUsize::new(0);
static TAIL: AtomicUsize = AtomicUsize::new(0);

/// Pushes a raw scancode into the queue. Called from the interrupt
/// path; drops the byte when the queue is full.
pub fn enqueue_scancode(scancode: u8) {
    let head = HEAD.load(Ordering::Relaxed);
    let next = (head + 1) % BUFFER_SIZE;
    if next == TAIL.load(Ordering::Acquire) {
        // full, drop the byte rather than stall the handler
        return;
    }
    unsafe {
        SCANCODE_BUF[head] = scancode;
    }
    HEAD.store(next, Ordering::Release);
}

/// Pops the oldest queued scancode, if any.
pub fn dequeue_scancode() -> Option<u8> {
    let tail = TAIL.load(Ordering::Relaxed);
    if tail == HEAD.load(Ordering::Acquire) {
        return None;
    }
    let scancode = unsafe { SCANCODE_BUF[tail] };
    TAIL.store((tail + 1) % BUFFER_SIZE, Ordering::Release);
    Some(scancode)
}

fn keyboard_interrupt() {
    #[cfg(target_arch = "x86")]
    {
        const PS2_DATA_PORT: u16 = 0x60;

        let scancode = unsafe { x86::io::inb(PS2_DATA_PORT) };
        enqueue_scancode(scancode);
        pic::end_of_interrupt(pic::InterruptIndex::Keyboard.as_u8());
    }
}

/// Hooks the driver up end to end: dispatch entry, descriptor slot,
/// controller mask. Call after the interrupt table is active.
pub fn init() {
    let vector = pic::InterruptIndex::Keyboard.as_u8();
    dispatch::register(vector, Handler::Device(keyboard_interrupt));
    if let Some(stub) = dispatch::entry_stub_addr(vector) {
        interrupts::install(vector, stub);
    }
    pic::clear_mask(1);
}

const SC_CTRL: u8 = 0x1d;
const SC_LSHIFT: u8 = 0x2a;
const SC_RSHIFT: u8 = 0x36;
const SC_ALT: u8 = 0x38;
const SC_EXTENDED: u8 = 0xe0;

// Set 1 make codes 0x00-0x39, zero where no printable key sits.
const KEYMAP_PLAIN: [u8; 0x3a] =
    *b"\0\x1b1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
const KEYMAP_SHIFT: [u8; 0x3a] =
    *b"\0\x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

/// A decoded key press with the modifier state at the time of the
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub character: char,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// Incremental set 1 scancode decoder. Feed it raw bytes in arrival
/// order; it tracks modifier and prefix state between calls.
pub struct ScancodeDecoder {
    extended: bool,
    shift: bool,
    ctrl: bool,
    alt: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        ScancodeDecoder {
            extended: false,
            shift: false,
            ctrl: false,
            alt: false,
        }
    }

    /// Consumes one scancode byte and yields a [`KeyEvent`] when it
    /// completes a printable key press.
    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == SC_EXTENDED {
            self.extended = true;
            return None;
        }

        let released = scancode & 0x80 != 0;
        let code = scancode & 0x7f;
        let extended = mem::replace(&mut self.extended, false);

        match code {
            SC_LSHIFT | SC_RSHIFT => {
                self.shift = !released;
                return None;
            }
            SC_CTRL => {
                self.ctrl = !released;
                return None;
            }
            SC_ALT => {
                self.alt = !released;
                return None;
            }
            _ => {}
        }

        // Extended keys (arrows, keypad enter, ...) carry no printable
        // character in these tables.
        if released || extended {
            return None;
        }

        let keymap = if self.shift { &KEYMAP_SHIFT } else { &KEYMAP_PLAIN };
        match keymap.get(usize::from(code)).copied() {
            Some(byte) if byte != 0 => Some(KeyEvent {
                character: byte as char,
                shift: self.shift,
                ctrl: self.ctrl,
                alt: self.alt,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_maps_plain_and_shifted_make_codes() {
        let mut decoder = ScancodeDecoder::new();

        let event = decoder.process_scancode(0x1e).unwrap();
        assert_eq!(event.character, 'a');
        assert!(!event.shift);

        assert!(decoder.process_scancode(SC_LSHIFT).is_none());
        let event = decoder.process_scancode(0x1e).unwrap();
        assert_eq!(event.character, 'A');
        assert!(event.shift);
        let event = decoder.process_scancode(0x02).unwrap();
        assert_eq!(event.character, '!');

        assert!(decoder.process_scancode(SC_LSHIFT | 0x80).is_none());
        let event = decoder.process_scancode(0x02).unwrap();
        assert_eq!(event.character, '1');
    }

    #[test]
    fn decoder_ignores_releases_and_extended_prefixes() {
        let mut decoder = ScancodeDecoder::new();

        // release of 'a' without a prior press still yields nothing
        assert!(decoder.process_scancode(0x9e).is_none());

        // cursor up arrives as 0xe0 0x48
        assert!(decoder.process_scancode(SC_EXTENDED).is_none());
        assert!(decoder.process_scancode(0x48).is_none());

        // the prefix must not leak into the next ordinary key
        let event = decoder.process_scancode(0x1c).unwrap();
        assert_eq!(event.character, '\n');
    }

    #[test]
    fn modifier_state_rides_along_in_events() {
        let mut decoder = ScancodeDecoder::new();

        assert!(decoder.process_scancode(SC_CTRL).is_none());
        let event = decoder.process_scancode(0x2e).unwrap();
        assert_eq!(event.character, 'c');
        assert!(event.ctrl);
        assert!(!event.alt);

        assert!(decoder.process_scancode(SC_CTRL | 0x80).is_none());
        let event = decoder.process_scancode(0x2e).unwrap();
        assert!(!event.ctrl);
    }

    #[test]
    fn scancode_queue_is_first_in_first_out() {
        enqueue_scancode(0x1e);
        enqueue_scancode(0x9e);
        enqueue_scancode(0x1c);

        assert_eq!(dequeue_scancode(), Some(0x1e));
        assert_eq!(dequeue_scancode(), Some(0x9e));
        assert_eq!(dequeue_scancode(), Some(0x1c));
        assert_eq!(dequeue_scancode(), None);
    }
}
