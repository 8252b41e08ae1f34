//! VZ video rendering.
//!
//! The video chip has two modes, selected by bit 3 of the control latch:
//! a 32×16 text mode (8×12 pixel cells, codes 0x80–0xFF are 2×2
//! semigraphics blocks) and a 128×64 four-colour graphics mode. Both scan
//! the 2K video RAM window and produce a 256×192 logical frame; bit 4 of
//! the latch selects the background/palette set.
//!
//! Glyphs come from the machine's character ROM when one is supplied; the
//! built-in font below stands in otherwise.

use retro8_core::types::Frame;

pub const DISPLAY_WIDTH: u32 = 256;
pub const DISPLAY_HEIGHT: u32 = 192;

const CELL_WIDTH: usize = 8;
const CELL_HEIGHT: usize = 12;
const TEXT_COLUMNS: usize = 32;
const TEXT_ROWS: usize = 16;

/// Character ROM layout: 8 bytes per glyph, 96 glyphs.
pub const CHARSET_GLYPHS: usize = 96;
pub const CHARSET_LEN: usize = CHARSET_GLYPHS * 8;

const MODE_BIT: u8 = 0x08;
const BACKGROUND_BIT: u8 = 0x10;

// MC6847-style palette, ARGB8888.
const GREEN: u32 = 0xFF00_C000;
const YELLOW: u32 = 0xFFE0_E000;
const BLUE: u32 = 0xFF20_20E0;
const RED: u32 = 0xFFC0_2020;
const BUFF: u32 = 0xFFE0_E0D0;
const CYAN: u32 = 0xFF20_C0C0;
const MAGENTA: u32 = 0xFFC0_20C0;
const ORANGE: u32 = 0xFFE0_8000;
const DARK_GREEN: u32 = 0xFF00_4000;
const DARK_ORANGE: u32 = 0xFF60_2000;

/// Semigraphics block colours, indexed by bits 4–6 of the character code.
const SEMI_COLOURS: [u32; 8] = [GREEN, YELLOW, BLUE, RED, BUFF, CYAN, MAGENTA, ORANGE];

/// Graphics-mode colour sets, selected by the latch background bit.
const GRAPHICS_GREEN: [u32; 4] = [GREEN, YELLOW, BLUE, RED];
const GRAPHICS_ORANGE: [u32; 4] = [BUFF, CYAN, MAGENTA, ORANGE];

pub struct VzRenderer {
    frame: Frame,
    latch: u8,
    charset: Option<Vec<u8>>,
}

impl VzRenderer {
    pub fn new(charset: Option<Vec<u8>>) -> Self {
        let charset = charset.filter(|data| {
            if data.len() >= CHARSET_LEN {
                true
            } else {
                log::warn!(
                    "character ROM too short ({} bytes); using built-in glyphs",
                    data.len()
                );
                false
            }
        });
        Self {
            frame: Frame::new(DISPLAY_WIDTH, DISPLAY_HEIGHT),
            latch: 0,
            charset,
        }
    }

    pub fn set_latch(&mut self, value: u8) {
        self.latch = value;
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Scan the video RAM window into the frame.
    pub fn render(&mut self, vram: &[u8]) {
        if self.latch & MODE_BIT != 0 {
            self.render_graphics(vram);
        } else {
            self.render_text(vram);
        }
    }

    fn render_text(&mut self, vram: &[u8]) {
        let background = if self.latch & BACKGROUND_BIT != 0 {
            DARK_ORANGE
        } else {
            DARK_GREEN
        };
        for row in 0..TEXT_ROWS {
            for column in 0..TEXT_COLUMNS {
                let code = vram[row * TEXT_COLUMNS + column];
                if code & 0x80 != 0 {
                    self.draw_semigraphics(column, row, code, background);
                } else {
                    self.draw_glyph(column, row, code, background);
                }
            }
        }
    }

    /// Codes 0x00–0x3F index the glyph set; 0x40–0x7F are the same glyphs
    /// inverted.
    fn draw_glyph(&mut self, column: usize, row: usize, code: u8, background: u32) {
        let inverse = code & 0x40 != 0;
        let glyph = glyph_rows(self.charset.as_deref(), code & 0x3F);
        let (ink, paper) = if inverse {
            (background, GREEN)
        } else {
            (GREEN, background)
        };
        let x0 = column * CELL_WIDTH;
        let y0 = row * CELL_HEIGHT;
        for y in 0..CELL_HEIGHT {
            // The 8-row glyph sits centred in the 12-row cell.
            let bits = if (2..10).contains(&y) { glyph[y - 2] } else { 0 };
            for x in 0..CELL_WIDTH {
                let lit = bits & (0x80 >> x) != 0;
                self.plot(x0 + x, y0 + y, if lit { ink } else { paper });
            }
        }
    }

    /// 2×2 block graphics: bits 3..0 light the quadrants, bits 6..4 pick
    /// the colour.
    fn draw_semigraphics(&mut self, column: usize, row: usize, code: u8, background: u32) {
        let colour = SEMI_COLOURS[((code >> 4) & 7) as usize];
        let x0 = column * CELL_WIDTH;
        let y0 = row * CELL_HEIGHT;
        for y in 0..CELL_HEIGHT {
            for x in 0..CELL_WIDTH {
                let quadrant = match (x >= CELL_WIDTH / 2, y >= CELL_HEIGHT / 2) {
                    (false, false) => 3,
                    (true, false) => 2,
                    (false, true) => 1,
                    (true, true) => 0,
                };
                let lit = code & (1 << quadrant) != 0;
                self.plot(x0 + x, y0 + y, if lit { colour } else { background });
            }
        }
    }

    /// 128×64, two bits per pixel, 32 bytes per scan row; each logical
    /// pixel covers 2×3 frame pixels.
    fn render_graphics(&mut self, vram: &[u8]) {
        let palette = if self.latch & BACKGROUND_BIT != 0 {
            &GRAPHICS_ORANGE
        } else {
            &GRAPHICS_GREEN
        };
        for row in 0..64 {
            for byte_index in 0..32 {
                let byte = vram[row * 32 + byte_index];
                for pixel in 0..4 {
                    let colour = palette[((byte >> ((3 - pixel) * 2)) & 3) as usize];
                    let x0 = (byte_index * 4 + pixel) * 2;
                    let y0 = row * 3;
                    for dy in 0..3 {
                        self.plot(x0, y0 + dy, colour);
                        self.plot(x0 + 1, y0 + dy, colour);
                    }
                }
            }
        }
    }

    fn plot(&mut self, x: usize, y: usize, colour: u32) {
        self.frame.pixels[y * DISPLAY_WIDTH as usize + x] = colour;
    }
}

/// Glyph bitmap for a 6-bit character code, from the character ROM when
/// present, else from the built-in font.
fn glyph_rows(charset: Option<&[u8]>, code: u8) -> [u8; 8] {
    if let Some(charset) = charset {
        let base = code as usize * 8;
        let mut rows = [0u8; 8];
        rows.copy_from_slice(&charset[base..base + 8]);
        return rows;
    }
    // Codes 0x00-0x1F are @ A-Z [ \ ] ^ _ ; 0x20-0x3F are ASCII punctuation
    // and digits.
    let ascii = if code < 0x20 { code + 0x40 } else { code };
    builtin_glyph(ascii as char)
}

/// Built-in 8×8 bitmaps for the text character set.
fn builtin_glyph(c: char) -> [u8; 8] {
    match c {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        '!' => [0x18, 0x18, 0x18, 0x18, 0x00, 0x00, 0x18, 0x00],
        '"' => [0x66, 0x66, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00],
        '#' => [0x6C, 0x6C, 0xFE, 0x6C, 0xFE, 0x6C, 0x6C, 0x00],
        '$' => [0x18, 0x3E, 0x60, 0x3C, 0x06, 0x7C, 0x18, 0x00],
        '%' => [0x62, 0x66, 0x0C, 0x18, 0x30, 0x66, 0x46, 0x00],
        '&' => [0x3C, 0x66, 0x3C, 0x38, 0x67, 0x66, 0x3F, 0x00],
        '\'' => [0x18, 0x18, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00],
        '(' => [0x0C, 0x18, 0x30, 0x30, 0x30, 0x18, 0x0C, 0x00],
        ')' => [0x30, 0x18, 0x0C, 0x0C, 0x0C, 0x18, 0x30, 0x00],
        '*' => [0x00, 0x66, 0x3C, 0xFF, 0x3C, 0x66, 0x00, 0x00],
        '+' => [0x00, 0x18, 0x18, 0x7E, 0x18, 0x18, 0x00, 0x00],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0x18, 0x30],
        '-' => [0x00, 0x00, 0x00, 0x7E, 0x00, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0x18, 0x00],
        '/' => [0x00, 0x03, 0x06, 0x0C, 0x18, 0x30, 0x60, 0x00],
        '0' => [0x3C, 0x66, 0x6E, 0x7E, 0x76, 0x66, 0x3C, 0x00],
        '1' => [0x18, 0x38, 0x18, 0x18, 0x18, 0x18, 0x7E, 0x00],
        '2' => [0x3C, 0x66, 0x06, 0x0C, 0x18, 0x30, 0x7E, 0x00],
        '3' => [0x3C, 0x66, 0x06, 0x1C, 0x06, 0x66, 0x3C, 0x00],
        '4' => [0x0C, 0x1C, 0x3C, 0x6C, 0x7E, 0x0C, 0x0C, 0x00],
        '5' => [0x7E, 0x60, 0x7C, 0x06, 0x06, 0x66, 0x3C, 0x00],
        '6' => [0x1C, 0x30, 0x60, 0x7C, 0x66, 0x66, 0x3C, 0x00],
        '7' => [0x7E, 0x06, 0x0C, 0x18, 0x30, 0x30, 0x30, 0x00],
        '8' => [0x3C, 0x66, 0x66, 0x3C, 0x66, 0x66, 0x3C, 0x00],
        '9' => [0x3C, 0x66, 0x66, 0x3E, 0x06, 0x0C, 0x38, 0x00],
        ':' => [0x00, 0x18, 0x18, 0x00, 0x00, 0x18, 0x18, 0x00],
        ';' => [0x00, 0x18, 0x18, 0x00, 0x00, 0x18, 0x18, 0x30],
        '<' => [0x06, 0x0C, 0x18, 0x30, 0x18, 0x0C, 0x06, 0x00],
        '=' => [0x00, 0x00, 0x7E, 0x00, 0x7E, 0x00, 0x00, 0x00],
        '>' => [0x60, 0x30, 0x18, 0x0C, 0x18, 0x30, 0x60, 0x00],
        '?' => [0x3C, 0x66, 0x06, 0x0C, 0x18, 0x00, 0x18, 0x00],
        '@' => [0x3C, 0x66, 0x6E, 0x6A, 0x6E, 0x60, 0x3C, 0x00],
        'A' => [0x3C, 0x66, 0x66, 0x7E, 0x66, 0x66, 0x66, 0x00],
        'B' => [0x7C, 0x66, 0x66, 0x7C, 0x66, 0x66, 0x7C, 0x00],
        'C' => [0x3C, 0x66, 0x60, 0x60, 0x60, 0x66, 0x3C, 0x00],
        'D' => [0x78, 0x6C, 0x66, 0x66, 0x66, 0x6C, 0x78, 0x00],
        'E' => [0x7E, 0x60, 0x60, 0x7C, 0x60, 0x60, 0x7E, 0x00],
        'F' => [0x7E, 0x60, 0x60, 0x7C, 0x60, 0x60, 0x60, 0x00],
        'G' => [0x3C, 0x66, 0x60, 0x6E, 0x66, 0x66, 0x3C, 0x00],
        'H' => [0x66, 0x66, 0x66, 0x7E, 0x66, 0x66, 0x66, 0x00],
        'I' => [0x7E, 0x18, 0x18, 0x18, 0x18, 0x18, 0x7E, 0x00],
        'J' => [0x3E, 0x0C, 0x0C, 0x0C, 0x0C, 0x6C, 0x38, 0x00],
        'K' => [0x66, 0x6C, 0x78, 0x70, 0x78, 0x6C, 0x66, 0x00],
        'L' => [0x60, 0x60, 0x60, 0x60, 0x60, 0x60, 0x7E, 0x00],
        'M' => [0x63, 0x77, 0x7F, 0x6B, 0x63, 0x63, 0x63, 0x00],
        'N' => [0x66, 0x76, 0x7E, 0x6E, 0x66, 0x66, 0x66, 0x00],
        'O' => [0x3C, 0x66, 0x66, 0x66, 0x66, 0x66, 0x3C, 0x00],
        'P' => [0x7C, 0x66, 0x66, 0x7C, 0x60, 0x60, 0x60, 0x00],
        'Q' => [0x3C, 0x66, 0x66, 0x66, 0x6A, 0x6C, 0x36, 0x00],
        'R' => [0x7C, 0x66, 0x66, 0x7C, 0x6C, 0x66, 0x66, 0x00],
        'S' => [0x3C, 0x66, 0x60, 0x3C, 0x06, 0x66, 0x3C, 0x00],
        'T' => [0x7E, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x00],
        'U' => [0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x3C, 0x00],
        'V' => [0x66, 0x66, 0x66, 0x66, 0x66, 0x3C, 0x18, 0x00],
        'W' => [0x63, 0x63, 0x63, 0x6B, 0x7F, 0x77, 0x63, 0x00],
        'X' => [0x66, 0x66, 0x3C, 0x18, 0x3C, 0x66, 0x66, 0x00],
        'Y' => [0x66, 0x66, 0x66, 0x3C, 0x18, 0x18, 0x18, 0x00],
        'Z' => [0x7E, 0x06, 0x0C, 0x18, 0x30, 0x60, 0x7E, 0x00],
        '[' => [0x3C, 0x30, 0x30, 0x30, 0x30, 0x30, 0x3C, 0x00],
        '\\' => [0x00, 0x60, 0x30, 0x18, 0x0C, 0x06, 0x03, 0x00],
        ']' => [0x3C, 0x0C, 0x0C, 0x0C, 0x0C, 0x0C, 0x3C, 0x00],
        '^' => [0x18, 0x3C, 0x66, 0x00, 0x00, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF],
        _ => [0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: usize, y: usize) -> u32 {
        frame.pixels[y * DISPLAY_WIDTH as usize + x]
    }

    #[test]
    fn text_mode_draws_a_glyph_with_background() {
        let mut renderer = VzRenderer::new(None);
        let mut vram = vec![0x20u8; 0x800]; // all spaces
        vram[0] = 0x01; // 'A' at the top-left cell

        renderer.render(&vram);
        let frame = renderer.frame();

        // Row 0 of the cell is blank padding.
        assert_eq!(pixel(frame, 0, 0), DARK_GREEN);
        // Glyph row 0 of 'A' (0x3C) at cell line 2: bit for x=2 is lit.
        assert_eq!(pixel(frame, 2, 2), GREEN);
        assert_eq!(pixel(frame, 0, 2), DARK_GREEN);
    }

    #[test]
    fn inverse_codes_swap_ink_and_paper() {
        let mut renderer = VzRenderer::new(None);
        let mut vram = vec![0x20u8; 0x800];
        vram[0] = 0x41; // inverse 'A'

        renderer.render(&vram);
        let frame = renderer.frame();
        assert_eq!(pixel(frame, 2, 2), DARK_GREEN);
        assert_eq!(pixel(frame, 0, 2), GREEN);
    }

    #[test]
    fn semigraphics_block_lights_quadrants() {
        let mut renderer = VzRenderer::new(None);
        let mut vram = vec![0x20u8; 0x800];
        // Colour 2 (blue), top-left quadrant only (bit 3).
        vram[0] = 0x80 | 0x20 | 0x08;

        renderer.render(&vram);
        let frame = renderer.frame();
        assert_eq!(pixel(frame, 0, 0), BLUE);
        assert_eq!(pixel(frame, 7, 0), DARK_GREEN);
        assert_eq!(pixel(frame, 0, 11), DARK_GREEN);
        assert_eq!(pixel(frame, 7, 11), DARK_GREEN);
    }

    #[test]
    fn graphics_mode_decodes_two_bit_pixels() {
        let mut renderer = VzRenderer::new(None);
        renderer.set_latch(0x08); // graphics mode, green set
        let mut vram = vec![0u8; 0x800];
        // First byte: pixels 0..3 = colours 3,2,1,0.
        vram[0] = 0b11_10_01_00;

        renderer.render(&vram);
        let frame = renderer.frame();
        assert_eq!(pixel(frame, 0, 0), RED);
        assert_eq!(pixel(frame, 1, 2), RED); // 2x3 block
        assert_eq!(pixel(frame, 2, 0), BLUE);
        assert_eq!(pixel(frame, 4, 0), YELLOW);
        assert_eq!(pixel(frame, 6, 0), GREEN);
    }

    #[test]
    fn charset_rom_overrides_builtin_glyphs() {
        let mut charset = vec![0u8; CHARSET_LEN];
        // Glyph for code 0: solid top row.
        charset[0] = 0xFF;
        let mut renderer = VzRenderer::new(Some(charset));
        let mut vram = vec![0x20u8; 0x800];
        vram[0] = 0x00;

        renderer.render(&vram);
        let frame = renderer.frame();
        for x in 0..8 {
            assert_eq!(pixel(frame, x, 2), GREEN, "column {x}");
        }
    }
}
