//! Text-mode output on the VGA buffer at `0xb8000`.
//!
//! 80x25 character cells, two bytes each: the ASCII byte, then an
//! attribute byte holding blink, background and foreground bits. Cell
//! stores go through [`Volatile`] so the compiler keeps every write to
//! the device memory.

use core::fmt;

use spin::Mutex;
use volatile::Volatile;

/// The 16 hardware palette colors.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Pink = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightPink = 13,
    Yellow = 14,
    White = 15,
}

/// Attribute byte for `bg`/`fg`, optionally blinking.
pub const fn attribute(bg: Color, fg: Color, blink: bool) -> u8 {
    let mut attr = ((bg as u8) & 0x7) << 4 | (fg as u8) & 0xf;
    if blink {
        attr |= 0x80;
    }
    attr
}

pub const STD_ATTRIBUTE: u8 = attribute(Color::Black, Color::LightGray, false);

const TEXT_ROWS: usize = 25;
const TEXT_COLUMNS: usize = 80;
const TEXT_BUFFER_ADDR: usize = 0xb8000;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct ScreenChar {
    ascii: u8,
    attribute: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<ScreenChar>; TEXT_COLUMNS]; TEXT_ROWS],
}

/// Cursor-tracking writer over the text buffer.
pub struct Writer {
    column: usize,
    row: usize,
    attribute: u8,
}

pub static WRITER: Mutex<Writer> = Mutex::new(Writer::new());

impl Writer {
    const fn new() -> Writer {
        Writer {
            column: 0,
            row: 0,
            attribute: STD_ATTRIBUTE,
        }
    }

    fn buffer(&mut self) -> &'static mut Buffer {
        unsafe { &mut *(TEXT_BUFFER_ADDR as *mut Buffer) }
    }

    /// Sets the attribute used for subsequent output.
    pub fn set_attribute(&mut self, attribute: u8) {
        self.attribute = attribute;
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            0x08 => self.rub_out(),
            byte => {
                if self.column >= TEXT_COLUMNS {
                    self.new_line();
                }
                let (row, column, attribute) = (self.row, self.column, self.attribute);
                self.buffer().chars[row][column].write(ScreenChar {
                    ascii: byte,
                    attribute,
                });
                self.column += 1;
            }
        }
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        self.update_cursor();
    }

    /// Writes `s` in `attribute`, then restores the current attribute.
    pub fn write_colored(&mut self, s: &str, attribute: u8) {
        let saved = self.attribute;
        self.attribute = attribute;
        self.write_string(s);
        self.attribute = saved;
    }

    /// Backspace: steps the cursor back and blanks the cell.
    fn rub_out(&mut self) {
        if self.column > 0 {
            self.column -= 1;
            let (row, column, attribute) = (self.row, self.column, self.attribute);
            self.buffer().chars[row][column].write(ScreenChar {
                ascii: b' ',
                attribute,
            });
        }
    }

    fn new_line(&mut self) {
        self.column = 0;
        self.row += 1;
        if self.row >= TEXT_ROWS {
            self.scroll_up();
            self.row = TEXT_ROWS - 1;
        }
    }

    /// Moves rows 1..25 up one line and blanks the bottom row.
    fn scroll_up(&mut self) {
        for row in 1..TEXT_ROWS {
            for column in 0..TEXT_COLUMNS {
                let cell = self.buffer().chars[row][column].read();
                self.buffer().chars[row - 1][column].write(cell);
            }
        }
        self.clear_row(TEXT_ROWS - 1);
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii: b' ',
            attribute: self.attribute,
        };
        for column in 0..TEXT_COLUMNS {
            self.buffer().chars[row][column].write(blank);
        }
    }

    /// Blanks the whole screen and homes the cursor.
    pub fn clear(&mut self) {
        for row in 0..TEXT_ROWS {
            self.clear_row(row);
        }
        self.column = 0;
        self.row = 0;
        self.update_cursor();
    }

    /// Mirrors the tracked position into the hardware cursor.
    fn update_cursor(&self) {
        #[cfg(target_arch = "x86")]
        {
            let pos = (self.row * TEXT_COLUMNS + self.column) as u16;
            unsafe {
                x86::io::outb(0x3d4, 0x0f);
                x86::io::outb(0x3d5, pos as u8);
                x86::io::outb(0x3d4, 0x0e);
                x86::io::outb(0x3d5, (pos >> 8) as u8);
            }
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}
