use std::time::Duration;

use crate::foundation::core::Rgba32F;

/// Values a render stamp template can reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StampInfo {
    /// Completed iterations.
    pub iterations: u32,
    /// Wall-clock time since the render session started.
    pub render_time: Duration,
    /// Registered scene objects.
    pub object_count: usize,
    /// Renderer name.
    pub renderer: String,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
}

const GLYPH_W: usize = 3;
const GLYPH_H: usize = 5;
const SCALE: usize = 2;
const PADDING: usize = 2 * SCALE;
const CELL_W: usize = (GLYPH_W + 1) * SCALE;
const BLEND: f32 = 0.5;

/// Text overlay drawn into the bottom-right corner of full-frame channel images.
///
/// Tokens: `%i` iterations, `%t` render seconds, `%o` object count, `%r` renderer, `%w` and
/// `%h` frame size, `%c` computer name, `%%` a literal percent sign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderStamp {
    template: String,
    computer_name: String,
}

impl RenderStamp {
    /// Create a stamp for `template`.
    pub fn new(template: impl Into<String>) -> Self {
        let computer_name = std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            template: template.into(),
            computer_name,
        }
    }

    /// The unexpanded template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the template tokens.
    pub fn format(&self, info: &StampInfo) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('i') => out.push_str(&info.iterations.to_string()),
                Some('t') => out.push_str(&format!("{:.1}", info.render_time.as_secs_f64())),
                Some('o') => out.push_str(&info.object_count.to_string()),
                Some('r') => out.push_str(&info.renderer),
                Some('w') => out.push_str(&info.width.to_string()),
                Some('h') => out.push_str(&info.height.to_string()),
                Some('c') => out.push_str(&self.computer_name),
                Some('%') => out.push('%'),
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        }
        out
    }

    /// Draw the expanded text over `pixels` (`width x height`).
    ///
    /// `bottom_up` tells whether row 0 is the bottom of the image. Text that does not fit
    /// the width is truncated; frames shorter than the stamp are left untouched.
    pub fn apply(
        &self,
        pixels: &mut [Rgba32F],
        width: u32,
        height: u32,
        bottom_up: bool,
        info: &StampInfo,
    ) {
        let (w, h) = (width as usize, height as usize);
        if pixels.len() < w * h {
            return;
        }
        let text = self.format(info);
        let box_h = GLYPH_H * SCALE + 2 * PADDING;
        if box_h > h || w <= 2 * PADDING {
            return;
        }
        let max_chars = (w - 2 * PADDING) / CELL_W;
        let glyphs: Vec<[u8; GLYPH_H]> = text.chars().take(max_chars).map(glyph).collect();
        if glyphs.is_empty() {
            return;
        }
        let box_w = glyphs.len() * CELL_W + 2 * PADDING;
        let x0 = w - box_w;
        let y0 = h - box_h;

        let mut blend_at = |x: usize, y_top_down: usize, target: Rgba32F| {
            let row = if bottom_up { h - 1 - y_top_down } else { y_top_down };
            let px = &mut pixels[row * w + x];
            let a = px.a;
            *px = px.lerp(target, BLEND);
            px.a = a;
        };

        for y in 0..box_h {
            for x in 0..box_w {
                blend_at(x0 + x, y0 + y, Rgba32F::BLACK);
            }
        }
        for (i, rows) in glyphs.iter().enumerate() {
            let gx = x0 + PADDING + i * CELL_W;
            for (gy, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..SCALE {
                        for sx in 0..SCALE {
                            blend_at(
                                gx + col * SCALE + sx,
                                y0 + PADDING + gy * SCALE + sy,
                                Rgba32F::WHITE,
                            );
                        }
                    }
                }
            }
        }
    }
}

/// 3x5 bitmap rows, most significant of the low three bits is the left column.
fn glyph(c: char) -> [u8; GLYPH_H] {
    match c.to_ascii_uppercase() {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        ' ' => [0; GLYPH_H],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '(' => [0b010, 0b100, 0b100, 0b100, 0b010],
        ')' => [0b010, 0b001, 0b001, 0b001, 0b010],
        _ => [0b111, 0b001, 0b010, 0b000, 0b010],
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aov/stamp.rs"]
mod tests;
