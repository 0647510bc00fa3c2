// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/glyph.rs - 内嵌 5x7 点阵字体
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{Rgb, RgbImage};

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
// 字间距一列
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

const FIRST_PRINTABLE: u8 = b' ';
const LAST_PRINTABLE: u8 = b'~';

// 按列存储，最低位为顶行
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
  [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
  [0x00, 0x00, 0x5F, 0x00, 0x00], // !
  [0x00, 0x07, 0x00, 0x07, 0x00], // "
  [0x14, 0x7F, 0x14, 0x7F, 0x14], // #
  [0x24, 0x2A, 0x7F, 0x2A, 0x12], // $
  [0x23, 0x13, 0x08, 0x64, 0x62], // %
  [0x36, 0x49, 0x55, 0x22, 0x50], // &
  [0x00, 0x05, 0x03, 0x00, 0x00], // '
  [0x00, 0x1C, 0x22, 0x41, 0x00], // (
  [0x00, 0x41, 0x22, 0x1C, 0x00], // )
  [0x08, 0x2A, 0x1C, 0x2A, 0x08], // *
  [0x08, 0x08, 0x3E, 0x08, 0x08], // +
  [0x00, 0x50, 0x30, 0x00, 0x00], // ,
  [0x08, 0x08, 0x08, 0x08, 0x08], // -
  [0x00, 0x60, 0x60, 0x00, 0x00], // .
  [0x20, 0x10, 0x08, 0x04, 0x02], // /
  [0x3E, 0x51, 0x49, 0x45, 0x3E], // 0
  [0x00, 0x42, 0x7F, 0x40, 0x00], // 1
  [0x42, 0x61, 0x51, 0x49, 0x46], // 2
  [0x21, 0x41, 0x45, 0x4B, 0x31], // 3
  [0x18, 0x14, 0x12, 0x7F, 0x10], // 4
  [0x27, 0x45, 0x45, 0x45, 0x39], // 5
  [0x3C, 0x4A, 0x49, 0x49, 0x30], // 6
  [0x01, 0x71, 0x09, 0x05, 0x03], // 7
  [0x36, 0x49, 0x49, 0x49, 0x36], // 8
  [0x06, 0x49, 0x49, 0x29, 0x1E], // 9
  [0x00, 0x36, 0x36, 0x00, 0x00], // :
  [0x00, 0x56, 0x36, 0x00, 0x00], // ;
  [0x08, 0x14, 0x22, 0x41, 0x00], // <
  [0x14, 0x14, 0x14, 0x14, 0x14], // =
  [0x00, 0x41, 0x22, 0x14, 0x08], // >
  [0x02, 0x01, 0x51, 0x09, 0x06], // ?
  [0x32, 0x49, 0x79, 0x41, 0x3E], // @
  [0x7E, 0x11, 0x11, 0x11, 0x7E], // A
  [0x7F, 0x49, 0x49, 0x49, 0x36], // B
  [0x3E, 0x41, 0x41, 0x41, 0x22], // C
  [0x7F, 0x41, 0x41, 0x22, 0x1C], // D
  [0x7F, 0x49, 0x49, 0x49, 0x41], // E
  [0x7F, 0x09, 0x09, 0x09, 0x01], // F
  [0x3E, 0x41, 0x49, 0x49, 0x7A], // G
  [0x7F, 0x08, 0x08, 0x08, 0x7F], // H
  [0x00, 0x41, 0x7F, 0x41, 0x00], // I
  [0x20, 0x40, 0x41, 0x3F, 0x01], // J
  [0x7F, 0x08, 0x14, 0x22, 0x41], // K
  [0x7F, 0x40, 0x40, 0x40, 0x40], // L
  [0x7F, 0x02, 0x0C, 0x02, 0x7F], // M
  [0x7F, 0x04, 0x08, 0x10, 0x7F], // N
  [0x3E, 0x41, 0x41, 0x41, 0x3E], // O
  [0x7F, 0x09, 0x09, 0x09, 0x06], // P
  [0x3E, 0x41, 0x51, 0x21, 0x5E], // Q
  [0x7F, 0x09, 0x19, 0x29, 0x46], // R
  [0x46, 0x49, 0x49, 0x49, 0x31], // S
  [0x01, 0x01, 0x7F, 0x01, 0x01], // T
  [0x3F, 0x40, 0x40, 0x40, 0x3F], // U
  [0x1F, 0x20, 0x40, 0x20, 0x1F], // V
  [0x3F, 0x40, 0x38, 0x40, 0x3F], // W
  [0x63, 0x14, 0x08, 0x14, 0x63], // X
  [0x07, 0x08, 0x70, 0x08, 0x07], // Y
  [0x61, 0x51, 0x49, 0x45, 0x43], // Z
  [0x00, 0x7F, 0x41, 0x41, 0x00], // [
  [0x02, 0x04, 0x08, 0x10, 0x20], // \
  [0x00, 0x41, 0x41, 0x7F, 0x00], // ]
  [0x04, 0x02, 0x01, 0x02, 0x04], // ^
  [0x40, 0x40, 0x40, 0x40, 0x40], // _
  [0x00, 0x01, 0x02, 0x04, 0x00], // `
  [0x20, 0x54, 0x54, 0x54, 0x78], // a
  [0x7F, 0x48, 0x44, 0x44, 0x38], // b
  [0x38, 0x44, 0x44, 0x44, 0x20], // c
  [0x38, 0x44, 0x44, 0x48, 0x7F], // d
  [0x38, 0x54, 0x54, 0x54, 0x18], // e
  [0x08, 0x7E, 0x09, 0x01, 0x02], // f
  [0x0C, 0x52, 0x52, 0x52, 0x3E], // g
  [0x7F, 0x08, 0x04, 0x04, 0x78], // h
  [0x00, 0x44, 0x7D, 0x40, 0x00], // i
  [0x20, 0x40, 0x44, 0x3D, 0x00], // j
  [0x7F, 0x10, 0x28, 0x44, 0x00], // k
  [0x00, 0x41, 0x7F, 0x40, 0x00], // l
  [0x7C, 0x04, 0x18, 0x04, 0x78], // m
  [0x7C, 0x08, 0x04, 0x04, 0x78], // n
  [0x38, 0x44, 0x44, 0x44, 0x38], // o
  [0x7C, 0x14, 0x14, 0x14, 0x08], // p
  [0x08, 0x14, 0x14, 0x18, 0x7C], // q
  [0x7C, 0x08, 0x04, 0x04, 0x08], // r
  [0x48, 0x54, 0x54, 0x54, 0x20], // s
  [0x04, 0x3F, 0x44, 0x40, 0x20], // t
  [0x3C, 0x40, 0x40, 0x20, 0x7C], // u
  [0x1C, 0x20, 0x40, 0x20, 0x1C], // v
  [0x3C, 0x40, 0x30, 0x40, 0x3C], // w
  [0x44, 0x28, 0x10, 0x28, 0x44], // x
  [0x0C, 0x50, 0x50, 0x50, 0x3C], // y
  [0x44, 0x64, 0x54, 0x4C, 0x44], // z
  [0x00, 0x08, 0x36, 0x41, 0x00], // {
  [0x00, 0x00, 0x7F, 0x00, 0x00], // |
  [0x00, 0x41, 0x36, 0x08, 0x00], // }
  [0x02, 0x01, 0x02, 0x04, 0x02], // ~
];

fn glyph_for(ch: char) -> &'static [u8; 5] {
  let code = if ch.is_ascii() { ch as u8 } else { b'?' };
  let code = if (FIRST_PRINTABLE..=LAST_PRINTABLE).contains(&code) {
    code
  } else {
    b'?'
  };
  &GLYPHS[(code - FIRST_PRINTABLE) as usize]
}

/// 将像素字号换算为点阵放大倍数
pub fn scale_for_size(font_size: f32) -> u32 {
  ((font_size / (GLYPH_HEIGHT + 1) as f32).round() as u32).max(1)
}

/// 以 `(x, y)` 为左上角绘制文本，超出画布的像素直接丢弃
pub fn draw_text(image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: u32, text: &str) {
  let (width, height) = (image.width() as i64, image.height() as i64);
  let scale = scale.max(1) as i64;

  for (index, ch) in text.chars().enumerate() {
    let origin_x = x as i64 + index as i64 * GLYPH_ADVANCE as i64 * scale;
    if origin_x >= width {
      break;
    }

    for (col, bits) in glyph_for(ch).iter().copied().enumerate() {
      for row in 0..GLYPH_HEIGHT as i64 {
        if (bits >> row) & 1 == 0 {
          continue;
        }
        let px = origin_x + col as i64 * scale;
        let py = y as i64 + row * scale;
        for dy in 0..scale {
          for dx in 0..scale {
            let (cx, cy) = (px + dx, py + dy);
            if cx >= 0 && cy >= 0 && cx < width && cy < height {
              image.put_pixel(cx as u32, cy as u32, color);
            }
          }
        }
      }
    }
  }
}
