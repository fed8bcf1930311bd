//! Decodes pointer PDUs into RGBA sprites.
//!
//! RDP cursors travel as an AND/XOR mask pair: the XOR plane carries the
//! base color (1, 16, 24 or 32 bits per pixel), the AND plane is one bit per
//! pixel and selects full transparency (`and == 1`, black XOR pixel) or
//! pixel inversion (`and == 1`, white XOR pixel). Scanlines of both planes
//! are 16-bit aligned, and color planes arrive bottom-up.

use cobaltrdp_core::ReadCursor;
use cobaltrdp_pdu::pointer::{ColorPointerAttribute, LargePointerAttribute, PointerAttribute};

use crate::color_conversion::rdp_16bit_to_rgb;

const SUPPORTED_COLOR_BPP: [u16; 4] = [1, 16, 24, 32];

/// Largest pointer dimension the client advertises (LargePointer capability).
pub const MAX_POINTER_EXTENT: u16 = 384;

#[derive(Debug, PartialEq, Eq)]
pub enum PointerError {
    InvalidXorMaskSize { expected: usize, actual: usize },
    InvalidAndMaskSize { expected: usize, actual: usize },
    NotSupportedBpp { bpp: u16 },
    TooBig { width: u16, height: u16 },
}

impl core::fmt::Display for PointerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PointerError::InvalidXorMaskSize { expected, actual } => {
                write!(f, "invalid pointer xorMask size: expected {expected}, actual {actual}")
            }
            PointerError::InvalidAndMaskSize { expected, actual } => {
                write!(f, "invalid pointer andMask size: expected {expected}, actual {actual}")
            }
            PointerError::NotSupportedBpp { bpp } => {
                write!(f, "unsupported pointer bpp: {bpp}")
            }
            PointerError::TooBig { width, height } => {
                write!(f, "pointer dimensions exceed 384x384: {width}x{height}")
            }
        }
    }
}

impl std::error::Error for PointerError {}

/// An RDP pointer in decoded form: premultiplied RGBA, top-down rows.
///
/// Pixels to be inverted against the underlying image are stored with the
/// sentinel value `[0xFF, 0xFF, 0xFF, 0x00]` (which a premultiplied image
/// can never contain otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPointer {
    pub width: u16,
    pub height: u16,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
    pub rgba_data: Vec<u8>,
}

impl DecodedPointer {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            hotspot_x: 0,
            hotspot_y: 0,
            rgba_data: Vec::new(),
        }
    }

    pub fn decode_pointer_attribute(src: &PointerAttribute<'_>) -> Result<Self, PointerError> {
        Self::decode(PointerData {
            width: src.color_pointer.width,
            height: src.color_pointer.height,
            xor_bpp: src.xor_bpp,
            xor_mask: src.color_pointer.xor_mask,
            and_mask: src.color_pointer.and_mask,
            hotspot_x: src.color_pointer.hot_spot.x,
            hotspot_y: src.color_pointer.hot_spot.y,
        })
    }

    pub fn decode_color_pointer_attribute(src: &ColorPointerAttribute<'_>) -> Result<Self, PointerError> {
        Self::decode(PointerData {
            width: src.width,
            height: src.height,
            xor_bpp: 24,
            xor_mask: src.xor_mask,
            and_mask: src.and_mask,
            hotspot_x: src.hot_spot.x,
            hotspot_y: src.hot_spot.y,
        })
    }

    pub fn decode_large_pointer_attribute(src: &LargePointerAttribute<'_>) -> Result<Self, PointerError> {
        Self::decode(PointerData {
            width: src.width,
            height: src.height,
            xor_bpp: src.xor_bpp,
            xor_mask: src.xor_mask,
            and_mask: src.and_mask,
            hotspot_x: src.hot_spot.x,
            hotspot_y: src.hot_spot.y,
        })
    }

    fn decode(data: PointerData<'_>) -> Result<Self, PointerError> {
        if data.width == 0 || data.height == 0 {
            return Ok(Self::empty());
        }

        if data.width > MAX_POINTER_EXTENT || data.height > MAX_POINTER_EXTENT {
            return Err(PointerError::TooBig {
                width: data.width,
                height: data.height,
            });
        }

        if !SUPPORTED_COLOR_BPP.contains(&data.xor_bpp) {
            // 8-bpp palette cursors are not advertised by this client.
            return Err(PointerError::NotSupportedBpp { bpp: data.xor_bpp });
        }

        let height = usize::from(data.height);

        // Monochrome planes are top-down, color planes bottom-up.
        let flip_vertical = data.xor_bpp != 1;

        let and_stride = Stride::from_bits(usize::from(data.width));
        let xor_stride = Stride::from_bits(usize::from(data.width) * usize::from(data.xor_bpp));

        if data.xor_mask.len() != xor_stride.length * height {
            return Err(PointerError::InvalidXorMaskSize {
                expected: xor_stride.length * height,
                actual: data.xor_mask.len(),
            });
        }

        // A missing AND mask means a fully opaque cursor.
        let default_and_mask = vec![0x00; and_stride.length * height];
        let and_mask = if data.and_mask.is_empty() {
            default_and_mask.as_slice()
        } else if data.and_mask.len() == and_stride.length * height {
            data.and_mask
        } else {
            return Err(PointerError::InvalidAndMaskSize {
                expected: and_stride.length * height,
                actual: data.and_mask.len(),
            });
        };

        let mut rgba_data = Vec::with_capacity(usize::from(data.width) * height * 4);

        for row_idx in 0..height {
            let src_row = if flip_vertical { height - row_idx - 1 } else { row_idx };

            let mut xor_cursor = ReadCursor::new(&data.xor_mask[src_row * xor_stride.length..]);
            let mut and_cursor = ReadCursor::new(&and_mask[src_row * and_stride.length..]);

            let mut color_reader = ColorReader::new(data.xor_bpp);
            let mut bitmask_reader = BitmaskReader::new();

            for _ in 0..data.width {
                let and_bit = bitmask_reader.next_bit(&mut and_cursor);
                let color = color_reader.next_pixel(&mut xor_cursor);

                if and_bit == 1 && color == [0, 0, 0, 0xff] {
                    // The only way to get a transparent pixel with
                    // non-32-bit cursors.
                    rgba_data.extend_from_slice(&[0, 0, 0, 0]);
                } else if and_bit == 1 && color == [0xff, 0xff, 0xff, 0xff] {
                    // Inverted pixel sentinel.
                    rgba_data.extend_from_slice(&[0xff, 0xff, 0xff, 0x00]);
                } else {
                    // Integer approximation of `c * a / 255`.
                    let alpha = u16::from(color[3]) + 1;
                    let premultiplied = [
                        ((u16::from(color[0]) * alpha) >> 8) as u8,
                        ((u16::from(color[1]) * alpha) >> 8) as u8,
                        ((u16::from(color[2]) * alpha) >> 8) as u8,
                        color[3],
                    ];
                    rgba_data.extend_from_slice(&premultiplied);
                }
            }
        }

        Ok(Self {
            width: data.width,
            height: data.height,
            hotspot_x: data.hotspot_x,
            hotspot_y: data.hotspot_y,
            rgba_data,
        })
    }
}

#[derive(Clone, Copy)]
struct Stride {
    length: usize,
}

impl Stride {
    // Mask scanlines are aligned to 16 bits.
    fn from_bits(bits: usize) -> Stride {
        Stride {
            length: bits.div_ceil(16) * 2,
        }
    }
}

struct BitmaskReader {
    current_byte: u8,
    read_bits: usize,
}

impl BitmaskReader {
    fn new() -> Self {
        Self {
            current_byte: 0,
            read_bits: 8,
        }
    }

    fn next_bit(&mut self, cursor: &mut ReadCursor<'_>) -> u8 {
        if self.read_bits == 8 {
            self.read_bits = 0;
            self.current_byte = cursor.read_u8();
        }

        let bit = (self.current_byte >> (7 - self.read_bits)) & 1;
        self.read_bits += 1;
        bit
    }
}

enum ColorReader {
    Color { bpp: u16 },
    Bitmask(BitmaskReader),
}

impl ColorReader {
    fn new(bpp: u16) -> Self {
        match bpp {
            1 => Self::Bitmask(BitmaskReader::new()),
            bpp => Self::Color { bpp },
        }
    }

    /// Returns the next XOR plane pixel as straight (non-premultiplied) RGBA.
    fn next_pixel(&mut self, cursor: &mut ReadCursor<'_>) -> [u8; 4] {
        match self {
            Self::Color { bpp } => match bpp {
                16 => {
                    let [r, g, b] = rdp_16bit_to_rgb(cursor.read_u16());
                    [r, g, b, 0xff]
                }
                24 => {
                    let [b, g, r] = cursor.read_array::<3>();
                    [r, g, b, 0xff]
                }
                32 => {
                    let [b, g, r, a] = cursor.read_array::<4>();
                    [r, g, b, a]
                }
                _ => unreachable!("ColorReader is only constructed for supported depths"),
            },
            Self::Bitmask(bitmask) => {
                if bitmask.next_bit(cursor) == 1 {
                    [0xff, 0xff, 0xff, 0xff]
                } else {
                    [0, 0, 0, 0xff]
                }
            }
        }
    }
}

/// Message-agnostic pointer data.
struct PointerData<'a> {
    width: u16,
    height: u16,
    xor_bpp: u16,
    xor_mask: &'a [u8],
    and_mask: &'a [u8],
    hotspot_x: u16,
    hotspot_y: u16,
}

#[cfg(test)]
mod tests {
    use cobaltrdp_pdu::pointer::Point16;

    use super::*;

    #[test]
    fn opaque_24bpp_cursor() {
        // 2x2, bottom-up BGR rows; 6 bytes per row is already 16-bit
        // aligned, so there is no stride padding.
        let xor_mask = [
            0xff, 0x00, 0x00, 0x00, 0xff, 0x00, // bottom row: blue, green
            0x00, 0x00, 0xff, 0xff, 0xff, 0xff, // top row: red, white
        ];
        let and_mask = [0x00, 0x00, 0x00, 0x00]; // fully opaque

        let attribute = ColorPointerAttribute {
            cache_index: 0,
            hot_spot: Point16 { x: 1, y: 1 },
            width: 2,
            height: 2,
            xor_mask: &xor_mask,
            and_mask: &and_mask,
        };

        let decoded = DecodedPointer::decode_color_pointer_attribute(&attribute).unwrap();

        assert_eq!(decoded.width, 2);
        assert_eq!(decoded.height, 2);
        assert_eq!(decoded.hotspot_x, 1);
        assert_eq!(
            decoded.rgba_data,
            [
                255, 0, 0, 255, // red
                255, 255, 255, 255, // white
                0, 0, 255, 255, // blue
                0, 255, 0, 255, // green
            ]
        );
    }

    #[test]
    fn and_mask_transparency_and_inversion() {
        // 2x1, black and white pixels, both masked in the AND plane:
        // black + AND -> transparent, white + AND -> inverted sentinel.
        let xor_mask = [0x00, 0x00, 0x00, 0xff, 0xff, 0xff];
        let and_mask = [0xc0, 0x00];

        let attribute = ColorPointerAttribute {
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 2,
            height: 1,
            xor_mask: &xor_mask,
            and_mask: &and_mask,
        };

        let decoded = DecodedPointer::decode_color_pointer_attribute(&attribute).unwrap();

        assert_eq!(
            decoded.rgba_data,
            [
                0, 0, 0, 0, // transparent
                255, 255, 255, 0, // inverted sentinel
            ]
        );
    }

    #[test]
    fn oversized_pointer_is_rejected() {
        let attribute = LargePointerAttribute {
            xor_bpp: 32,
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 385,
            height: 16,
            xor_mask: &[],
            and_mask: &[],
        };

        let e = DecodedPointer::decode_large_pointer_attribute(&attribute).err().unwrap();
        assert_eq!(e, PointerError::TooBig { width: 385, height: 16 });
    }

    #[test]
    fn wrong_xor_mask_size_is_rejected() {
        let attribute = ColorPointerAttribute {
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 4,
            height: 4,
            xor_mask: &[0u8; 10],
            and_mask: &[0u8; 8],
        };

        let e = DecodedPointer::decode_color_pointer_attribute(&attribute).err().unwrap();
        assert!(matches!(e, PointerError::InvalidXorMaskSize { .. }));
    }
}
