//! Interleaved Run-Length Encoding (RLE) bitmap codec, as specified by
//! MS-RDPBCGR (RLE_BITMAP_STREAM and the accompanying pseudo-code).
//!
//! The decompressor is a pure function: no shared state, no allocations
//! beyond the output buffer, callable from a worker thread.

use core::fmt;
use core::ops::BitXor;

/// Pixel layout of a decompressed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RlePixelFormat {
    Rgb24,
    Rgb16,
    Rgb15,
    Rgb8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    InvalidBpp {
        bpp: usize,
    },
    BadOrderCode,
    UnexpectedZeroLength,
    NotEnoughBytes {
        expected: usize,
        actual: usize,
    },
    /// An order tried to write past `width * height` pixels.
    Overrun {
        maximum_additional: usize,
        required_additional: usize,
    },
    /// The stream ended before `width * height` pixels were produced; the
    /// missing tail is left as the background color.
    Underrun {
        missing: usize,
    },
    EmptyImage,
}

impl fmt::Display for RleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RleError::InvalidBpp { bpp } => write!(f, "invalid bits per pixel: {bpp}"),
            RleError::BadOrderCode => write!(f, "bad RLE order code"),
            RleError::UnexpectedZeroLength => write!(f, "unexpected zero-length RLE order"),
            RleError::NotEnoughBytes { expected, actual } => {
                write!(f, "not enough bytes: expected {expected} bytes, but got {actual}")
            }
            RleError::Overrun {
                maximum_additional,
                required_additional,
            } => write!(
                f,
                "RLE stream overruns the image: output can receive at most {maximum_additional} more bytes, but {required_additional} bytes are required"
            ),
            RleError::Underrun { missing } => {
                write!(f, "RLE stream underruns the image: {missing} bytes were not produced")
            }
            RleError::EmptyImage => write!(f, "height or width is zero"),
        }
    }
}

impl std::error::Error for RleError {}

/// Decompress an RLE compressed bitmap into its native pixel depth.
///
/// `src`: source buffer containing the compressed stream
/// `dst`: destination buffer, resized to `width * height` pixels
/// `width`, `height`: decompressed bitmap dimensions
/// `bpp`: bits per pixel of the stream (8, 15, 16 or 24)
pub fn decompress(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
    bpp: usize,
) -> Result<RlePixelFormat, RleError> {
    match bpp {
        24 => decompress_helper::<Mode24Bpp>(src, dst, width, height),
        16 => decompress_helper::<Mode16Bpp>(src, dst, width, height),
        15 => decompress_helper::<Mode15Bpp>(src, dst, width, height),
        8 => decompress_helper::<Mode8Bpp>(src, dst, width, height),
        invalid => Err(RleError::InvalidBpp { bpp: invalid }),
    }
}

fn decompress_helper<Mode: DepthMode>(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
) -> Result<RlePixelFormat, RleError> {
    if width == 0 || height == 0 {
        return Err(RleError::EmptyImage);
    }

    let row_delta = Mode::BYTES_PER_PIXEL * width;
    dst.clear();
    dst.resize(row_delta * height, 0);
    decompress_impl::<Mode>(src, dst, row_delta)?;

    Ok(Mode::PIXEL_FORMAT)
}

macro_rules! ensure_size {
    (from: $buf:ident, size: $expected:expr) => {{
        let actual = $buf.remaining_len();
        let expected = $expected;
        if expected > actual {
            return Err(RleError::NotEnoughBytes { expected, actual });
        }
    }};
    (into: $buf:ident, size: $required_additional:expr) => {{
        let maximum_additional = $buf.remaining_len();
        let required_additional = $required_additional;
        if required_additional > maximum_additional {
            return Err(RleError::Overrun {
                maximum_additional,
                required_additional,
            });
        }
    }};
}

fn decompress_impl<Mode: DepthMode>(src: &[u8], dst: &mut [u8], row_delta: usize) -> Result<(), RleError> {
    let mut src = Src::new(src);
    let mut dst = Dst::new(dst);

    let mut fg_pel = Mode::WHITE_PIXEL;
    // A background run directly following another background run inserts a
    // single foreground pixel before the run (the RDP "matte" behavior).
    let mut insert_fg_pel = false;
    let mut is_first_line = true;

    while !src.eof() {
        // Watch out for the end of the first scanline: background runs stop
        // being black and start copying the previous scanline.
        if is_first_line && dst.pos >= row_delta {
            is_first_line = false;
            insert_fg_pel = false;
        }

        ensure_size!(from: src, size: 1);
        let header = src.read_u8();

        let (order, run_length) = decode_order_header(header, &mut src)?;

        match order {
            OrderKind::BgRun => {
                ensure_size!(into: dst, size: run_length * Mode::BYTES_PER_PIXEL);

                if is_first_line {
                    let num_iterations = if insert_fg_pel {
                        Mode::write_pixel(&mut dst, fg_pel);
                        run_length - 1
                    } else {
                        run_length
                    };

                    for _ in 0..num_iterations {
                        Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
                    }
                } else {
                    let num_iterations = if insert_fg_pel {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above ^ fg_pel);
                        run_length - 1
                    } else {
                        run_length
                    };

                    for _ in 0..num_iterations {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above);
                    }
                }

                // A follow-on background run will need a foreground pel inserted.
                insert_fg_pel = true;
                continue;
            }
            OrderKind::FgRun | OrderKind::SetFgFgRun => {
                if order == OrderKind::SetFgFgRun {
                    ensure_size!(from: src, size: Mode::BYTES_PER_PIXEL);
                    fg_pel = Mode::read_pixel(&mut src);
                }

                ensure_size!(into: dst, size: run_length * Mode::BYTES_PER_PIXEL);

                if is_first_line {
                    for _ in 0..run_length {
                        Mode::write_pixel(&mut dst, fg_pel);
                    }
                } else {
                    for _ in 0..run_length {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above ^ fg_pel);
                    }
                }
            }
            OrderKind::DitheredRun => {
                ensure_size!(from: src, size: 2 * Mode::BYTES_PER_PIXEL);
                let pixel_a = Mode::read_pixel(&mut src);
                let pixel_b = Mode::read_pixel(&mut src);

                ensure_size!(into: dst, size: run_length * 2 * Mode::BYTES_PER_PIXEL);

                for _ in 0..run_length {
                    Mode::write_pixel(&mut dst, pixel_a);
                    Mode::write_pixel(&mut dst, pixel_b);
                }
            }
            OrderKind::ColorRun => {
                ensure_size!(from: src, size: Mode::BYTES_PER_PIXEL);
                let pixel = Mode::read_pixel(&mut src);

                ensure_size!(into: dst, size: run_length * Mode::BYTES_PER_PIXEL);

                for _ in 0..run_length {
                    Mode::write_pixel(&mut dst, pixel);
                }
            }
            OrderKind::FgBgImage | OrderKind::SetFgFgBgImage => {
                if order == OrderKind::SetFgFgBgImage {
                    ensure_size!(from: src, size: Mode::BYTES_PER_PIXEL);
                    fg_pel = Mode::read_pixel(&mut src);
                }

                let mut number_to_read = run_length;

                while number_to_read > 0 {
                    let c_bits = number_to_read.min(8);

                    ensure_size!(from: src, size: 1);
                    let bitmask = src.read_u8();

                    write_fg_bg_image::<Mode>(&mut dst, row_delta, is_first_line, bitmask, fg_pel, c_bits)?;

                    number_to_read -= c_bits;
                }
            }
            OrderKind::ColorImage => {
                let byte_count = run_length * Mode::BYTES_PER_PIXEL;

                ensure_size!(from: src, size: byte_count);
                ensure_size!(into: dst, size: byte_count);

                for _ in 0..byte_count {
                    dst.write_u8(src.read_u8());
                }
            }
            OrderKind::SpecialFgBg1 => {
                const MASK_SPECIAL_FG_BG_1: u8 = 0x03;

                write_fg_bg_image::<Mode>(&mut dst, row_delta, is_first_line, MASK_SPECIAL_FG_BG_1, fg_pel, 8)?;
            }
            OrderKind::SpecialFgBg2 => {
                const MASK_SPECIAL_FG_BG_2: u8 = 0x05;

                write_fg_bg_image::<Mode>(&mut dst, row_delta, is_first_line, MASK_SPECIAL_FG_BG_2, fg_pel, 8)?;
            }
            OrderKind::WhitePixel => {
                ensure_size!(into: dst, size: Mode::BYTES_PER_PIXEL);
                Mode::write_pixel(&mut dst, Mode::WHITE_PIXEL);
            }
            OrderKind::BlackPixel => {
                ensure_size!(into: dst, size: Mode::BYTES_PER_PIXEL);
                Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
            }
        }

        insert_fg_pel = false;
    }

    if dst.remaining_len() > 0 {
        // The zeroed tail is already the background color.
        return Err(RleError::Underrun {
            missing: dst.remaining_len(),
        });
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OrderKind {
    BgRun,
    FgRun,
    SetFgFgRun,
    DitheredRun,
    ColorRun,
    FgBgImage,
    SetFgFgBgImage,
    ColorImage,
    SpecialFgBg1,
    SpecialFgBg2,
    WhitePixel,
    BlackPixel,
}

const MASK_REGULAR_RUN_LENGTH: u8 = 0x1F;
const MASK_LITE_RUN_LENGTH: u8 = 0x0F;

/// Splits a compression order header into its order kind and run length,
/// consuming the extended length bytes when present.
fn decode_order_header(header: u8, src: &mut Src<'_>) -> Result<(OrderKind, usize), RleError> {
    if header & 0xC0 != 0xC0 {
        // REGULAR orders (000x xxxx .. 100x xxxx)
        let kind = match header >> 5 {
            0x0 => OrderKind::BgRun,
            0x1 => OrderKind::FgRun,
            0x2 => OrderKind::FgBgImage,
            0x3 => OrderKind::ColorRun,
            0x4 => OrderKind::ColorImage,
            _ => return Err(RleError::BadOrderCode),
        };

        let length = if kind == OrderKind::FgBgImage {
            extract_run_length_fg_bg(header, MASK_REGULAR_RUN_LENGTH, src)?
        } else {
            extract_run_length(header, MASK_REGULAR_RUN_LENGTH, 32, src)?
        };

        Ok((kind, length))
    } else if header & 0xF0 != 0xF0 {
        // LITE orders (1100 xxxx .. 1110 xxxx)
        let kind = match header >> 4 {
            0xC => OrderKind::SetFgFgRun,
            0xD => OrderKind::SetFgFgBgImage,
            0xE => OrderKind::DitheredRun,
            _ => return Err(RleError::BadOrderCode),
        };

        let length = if kind == OrderKind::SetFgFgBgImage {
            extract_run_length_fg_bg(header, MASK_LITE_RUN_LENGTH, src)?
        } else {
            extract_run_length(header, MASK_LITE_RUN_LENGTH, 16, src)?
        };

        Ok((kind, length))
    } else {
        // MEGA_MEGA and SPECIAL orders (0xF*)
        let kind = match header {
            0xF0 => OrderKind::BgRun,
            0xF1 => OrderKind::FgRun,
            0xF2 => OrderKind::FgBgImage,
            0xF3 => OrderKind::ColorRun,
            0xF4 => OrderKind::ColorImage,
            0xF6 => OrderKind::SetFgFgRun,
            0xF7 => OrderKind::SetFgFgBgImage,
            0xF8 => OrderKind::DitheredRun,
            0xF9 => return Ok((OrderKind::SpecialFgBg1, 0)),
            0xFA => return Ok((OrderKind::SpecialFgBg2, 0)),
            0xFD => return Ok((OrderKind::WhitePixel, 0)),
            0xFE => return Ok((OrderKind::BlackPixel, 0)),
            _ => return Err(RleError::BadOrderCode),
        };

        let length = extract_run_length_mega_mega(src)?;

        Ok((kind, length))
    }
}

fn extract_run_length(header: u8, length_mask: u8, extension_base: usize, src: &mut Src<'_>) -> Result<usize, RleError> {
    match header & length_mask {
        0 => {
            // An extended (MEGA) run: the length supplement follows.
            ensure_size!(from: src, size: 1);
            Ok(usize::from(src.read_u8()) + extension_base)
        }
        run_length => Ok(usize::from(run_length)),
    }
}

fn extract_run_length_fg_bg(header: u8, length_mask: u8, src: &mut Src<'_>) -> Result<usize, RleError> {
    match header & length_mask {
        0 => {
            ensure_size!(from: src, size: 1);
            Ok(usize::from(src.read_u8()) + 1)
        }
        run_length => Ok(usize::from(run_length) * 8),
    }
}

fn extract_run_length_mega_mega(src: &mut Src<'_>) -> Result<usize, RleError> {
    ensure_size!(from: src, size: 2);

    let run_length = usize::from(src.read_u16());

    if run_length == 0 {
        Err(RleError::UnexpectedZeroLength)
    } else {
        Ok(run_length)
    }
}

/// Writes up to 8 pixels described by a foreground/background bitmask byte.
fn write_fg_bg_image<Mode: DepthMode>(
    dst: &mut Dst<'_>,
    row_delta: usize,
    is_first_line: bool,
    bitmask: u8,
    fg_pel: Mode::Pixel,
    c_bits: usize,
) -> Result<(), RleError> {
    ensure_size!(into: dst, size: c_bits * Mode::BYTES_PER_PIXEL);

    let mut mask = 0x01;

    for _ in 0..c_bits {
        if is_first_line {
            if bitmask & mask != 0 {
                Mode::write_pixel(dst, fg_pel);
            } else {
                Mode::write_pixel(dst, Mode::BLACK_PIXEL);
            }
        } else {
            let above = dst.read_pixel_above::<Mode>(row_delta);

            if bitmask & mask != 0 {
                Mode::write_pixel(dst, above ^ fg_pel);
            } else {
                Mode::write_pixel(dst, above);
            }
        }

        mask <<= 1;
    }

    Ok(())
}

struct Src<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> Src<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { inner: bytes, pos: 0 }
    }

    fn remaining_len(&self) -> usize {
        self.inner.len() - self.pos
    }

    fn read<const N: usize>(&mut self) -> [u8; N] {
        let bytes = &self.inner[self.pos..self.pos + N];
        self.pos += N;
        bytes.try_into().expect("N-elements array")
    }

    fn read_u8(&mut self) -> u8 {
        self.read::<1>()[0]
    }

    fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read::<2>())
    }

    fn read_u24(&mut self) -> u32 {
        let bytes = self.read::<3>();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
    }

    fn eof(&self) -> bool {
        self.pos == self.inner.len()
    }
}

struct Dst<'a> {
    inner: &'a mut [u8],
    pos: usize,
}

impl<'a> Dst<'a> {
    fn new(bytes: &'a mut [u8]) -> Self {
        Self { inner: bytes, pos: 0 }
    }

    fn remaining_len(&self) -> usize {
        self.inner.len() - self.pos
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    fn write_u16(&mut self, value: u16) {
        self.write(&value.to_le_bytes());
    }

    fn write_u24(&mut self, value: u32) {
        self.write(&value.to_le_bytes()[..3]);
    }

    /// Reads the pixel one scanline above the write position.
    fn read_pixel_above<Mode: DepthMode>(&self, row_delta: usize) -> Mode::Pixel {
        let mut above = Src {
            inner: self.inner,
            pos: self.pos - row_delta,
        };
        Mode::read_pixel(&mut above)
    }
}

/// Per-depth pixel access for the decompression loop.
trait DepthMode {
    type Pixel: Copy + PartialEq + BitXor<Output = Self::Pixel>;

    /// Bytes per pixel for this mode.
    const BYTES_PER_PIXEL: usize;

    const PIXEL_FORMAT: RlePixelFormat;

    const BLACK_PIXEL: Self::Pixel;

    const WHITE_PIXEL: Self::Pixel;

    fn write_pixel(dst: &mut Dst<'_>, pixel: Self::Pixel);

    fn read_pixel(src: &mut Src<'_>) -> Self::Pixel;
}

struct Mode8Bpp;

impl DepthMode for Mode8Bpp {
    type Pixel = u8;

    const BYTES_PER_PIXEL: usize = 1;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb8;

    const BLACK_PIXEL: Self::Pixel = 0x00;

    const WHITE_PIXEL: Self::Pixel = 0xFF;

    fn write_pixel(dst: &mut Dst<'_>, pixel: Self::Pixel) {
        dst.write_u8(pixel);
    }

    fn read_pixel(src: &mut Src<'_>) -> Self::Pixel {
        src.read_u8()
    }
}

struct Mode15Bpp;

impl DepthMode for Mode15Bpp {
    type Pixel = u16;

    const BYTES_PER_PIXEL: usize = 2;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb15;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    // 5 bits per RGB component, top bit unused
    const WHITE_PIXEL: Self::Pixel = 0x7FFF;

    fn write_pixel(dst: &mut Dst<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Src<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Mode16Bpp;

impl DepthMode for Mode16Bpp {
    type Pixel = u16;

    const BYTES_PER_PIXEL: usize = 2;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb16;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    // 5-6-5 layout
    const WHITE_PIXEL: Self::Pixel = 0xFFFF;

    fn write_pixel(dst: &mut Dst<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Src<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Mode24Bpp;

impl DepthMode for Mode24Bpp {
    type Pixel = u32;

    const BYTES_PER_PIXEL: usize = 3;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb24;

    const BLACK_PIXEL: Self::Pixel = 0x00_0000;

    const WHITE_PIXEL: Self::Pixel = 0xFF_FFFF;

    fn write_pixel(dst: &mut Dst<'_>, pixel: Self::Pixel) {
        dst.write_u24(pixel);
    }

    fn read_pixel(src: &mut Src<'_>) -> Self::Pixel {
        src.read_u24()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Minimal conformant encoder used to exercise the decoder: emits color
    /// runs, literal images, background runs and foreground runs.
    mod encoder {
        #[derive(Clone, Debug)]
        pub(super) enum Op {
            /// n pixels of one literal color
            ColorRun(u32, usize),
            /// n literal pixels
            ColorImage(Vec<u32>),
            /// n pixels copied from the scanline above (black on line 0)
            BgRun(usize),
            /// set fg, then n pixels of fg (xored with the line above)
            SetFgFgRun(u32, usize),
        }

        pub(super) fn push_pixel_24(buf: &mut Vec<u8>, pixel: u32) {
            buf.extend_from_slice(&pixel.to_le_bytes()[..3]);
        }

        fn push_regular_header(buf: &mut Vec<u8>, code: u8, length: usize) {
            // Lengths above the 5-bit field use the extended form.
            if length < 32 {
                buf.push((code << 5) | length as u8);
            } else {
                assert!(length - 32 <= 255);
                buf.push(code << 5);
                buf.push((length - 32) as u8);
            }
        }

        pub(super) fn encode_24(ops: &[Op]) -> Vec<u8> {
            let mut out = Vec::new();

            for op in ops {
                match op {
                    Op::BgRun(n) => push_regular_header(&mut out, 0x0, *n),
                    Op::SetFgFgRun(fg, n) => {
                        assert!(*n < 16 && *n > 0);
                        out.push(0xC0 | *n as u8);
                        push_pixel_24(&mut out, *fg);
                    }
                    Op::ColorRun(color, n) => {
                        push_regular_header(&mut out, 0x3, *n);
                        push_pixel_24(&mut out, *color);
                    }
                    Op::ColorImage(pixels) => {
                        push_regular_header(&mut out, 0x4, pixels.len());
                        for pixel in pixels {
                            push_pixel_24(&mut out, *pixel);
                        }
                    }
                }
            }

            out
        }

        /// Reference rendition of the same operations.
        pub(super) fn render_24(ops: &[Op], width: usize, height: usize) -> Vec<u8> {
            let mut out = vec![0u8; width * height * 3];
            let mut pos = 0usize;
            let row_delta = width * 3;

            let mut write = |out: &mut Vec<u8>, pos: &mut usize, pixel: u32| {
                let bytes = pixel.to_le_bytes();
                out[*pos..*pos + 3].copy_from_slice(&bytes[..3]);
                *pos += 3;
            };

            let read_above = |out: &[u8], pos: usize| -> u32 {
                if pos < row_delta {
                    0
                } else {
                    let p = pos - row_delta;
                    u32::from_le_bytes([out[p], out[p + 1], out[p + 2], 0])
                }
            };

            let mut prev_was_bg = false;
            let mut fg = 0xFF_FFFFu32;

            for op in ops {
                match op {
                    Op::BgRun(n) => {
                        let mut n = *n;
                        if prev_was_bg {
                            let above = read_above(&out, pos);
                            write(&mut out, &mut pos, above ^ fg);
                            n -= 1;
                        }
                        for _ in 0..n {
                            let above = read_above(&out, pos);
                            write(&mut out, &mut pos, above);
                        }
                        prev_was_bg = true;
                        continue;
                    }
                    Op::SetFgFgRun(new_fg, n) => {
                        fg = *new_fg;
                        for _ in 0..*n {
                            let above = read_above(&out, pos);
                            write(&mut out, &mut pos, above ^ fg);
                        }
                    }
                    Op::ColorRun(color, n) => {
                        for _ in 0..*n {
                            write(&mut out, &mut pos, *color);
                        }
                    }
                    Op::ColorImage(pixels) => {
                        for pixel in pixels {
                            write(&mut out, &mut pos, *pixel);
                        }
                    }
                }
                prev_was_bg = false;
            }

            assert_eq!(pos, out.len(), "test op sequence must fill the image exactly");
            out
        }
    }

    use encoder::Op;

    #[test]
    fn bg_run_then_color_run_on_first_line() {
        // A 6-pixel background run on the first line (implicitly black)
        // followed by a 6-pixel color run of gray 0xF0F0F0, width 12.
        let compressed = encoder::encode_24(&[Op::BgRun(6), Op::ColorRun(0xF0F0F0, 6)]);
        assert_eq!(compressed[0], 0x06);

        let mut output = Vec::new();
        let format = decompress(&compressed, &mut output, 12, 1, 24).unwrap();

        assert_eq!(format, RlePixelFormat::Rgb24);

        let mut expected = vec![0u8; 6 * 3];
        expected.extend_from_slice(&[0xF0; 6 * 3]);
        assert_eq!(output, expected);
    }

    #[test]
    fn bg_run_copies_previous_scanline() {
        // First line: 4 literal pixels; second line: a background run
        // copying them.
        let ops = [
            Op::ColorImage(vec![0x102030, 0x405060, 0x708090, 0xA0B0C0]),
            Op::BgRun(4),
        ];
        let compressed = encoder::encode_24(&ops);

        let mut output = Vec::new();
        decompress(&compressed, &mut output, 4, 2, 24).unwrap();

        assert_eq!(&output[..12], &output[12..]);
    }

    #[test]
    fn consecutive_bg_runs_insert_foreground_pixel() {
        let ops = [
            Op::ColorRun(0x111111, 4),
            Op::SetFgFgRun(0x0F0F0F, 4), // line 2: line 1 ^ fg
            Op::BgRun(4),                // line 3: copy of line 2
            Op::BgRun(4),                // line 4: fg ^ line 3, then copies
        ];
        let compressed = encoder::encode_24(&ops);

        let mut output = Vec::new();
        decompress(&compressed, &mut output, 4, 4, 24).unwrap();

        let expected = encoder::render_24(&ops, 4, 4);
        assert_eq!(output, expected);
    }

    #[test]
    fn white_and_black_single_pixel_orders() {
        let compressed = [0xFDu8, 0xFE];

        let mut output = Vec::new();
        decompress(&compressed, &mut output, 2, 1, 24).unwrap();

        assert_eq!(output, [0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn mega_mega_zero_length_is_rejected() {
        let compressed = [0xF0u8, 0x00, 0x00];

        let mut output = Vec::new();
        let e = decompress(&compressed, &mut output, 8, 8, 24).err().unwrap();
        assert_eq!(e, RleError::UnexpectedZeroLength);
    }

    #[test]
    fn overrun_is_rejected() {
        // 9-pixel color run into a 2x2 image
        let compressed = encoder::encode_24(&[Op::ColorRun(0x123456, 9)]);

        let mut output = Vec::new();
        let e = decompress(&compressed, &mut output, 2, 2, 24).err().unwrap();
        assert!(matches!(e, RleError::Overrun { .. }));
    }

    #[test]
    fn underrun_is_flagged_and_padded() {
        let compressed = encoder::encode_24(&[Op::ColorRun(0x123456, 2)]);

        let mut output = Vec::new();
        let e = decompress(&compressed, &mut output, 2, 2, 24).err().unwrap();
        assert_eq!(e, RleError::Underrun { missing: 6 });
        // The missing tail stays background-black.
        assert_eq!(&output[6..], [0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn invalid_bpp_is_rejected() {
        let mut output = Vec::new();
        let e = decompress(&[], &mut output, 2, 2, 32).err().unwrap();
        assert_eq!(e, RleError::InvalidBpp { bpp: 32 });
    }

    fn arb_ops(width: usize, height: usize) -> impl Strategy<Value = Vec<Op>> {
        let total = width * height;

        // Split the image into chunks, each encoded by a random op kind.
        proptest::collection::vec((1..=12usize, 0u32..=0xFF_FFFF, 0u8..3), 1..64).prop_map(move |chunks| {
            let mut ops = Vec::new();
            let mut produced = 0usize;

            for (len, color, kind) in chunks {
                if produced == total {
                    break;
                }
                let len = len.min(total - produced);

                // Background and foreground runs only after the first line so
                // the reference rendition stays simple.
                let kind = if produced < width { kind % 2 } else { kind };

                let op = match kind {
                    0 => Op::ColorRun(color, len),
                    1 => Op::ColorImage((0..len).map(|i| color.wrapping_add(i as u32) & 0xFF_FFFF).collect()),
                    _ => Op::BgRun(len),
                };

                produced += len;
                ops.push(op);
            }

            if produced < total {
                ops.push(Op::ColorRun(0xABCDEF, total - produced));
            }

            ops
        })
    }

    proptest! {
        #[test]
        fn decompress_matches_reference_rendition(ops in arb_ops(16, 8)) {
            let compressed = encoder::encode_24(&ops);
            let expected = encoder::render_24(&ops, 16, 8);

            let mut output = Vec::new();
            let format = decompress(&compressed, &mut output, 16, 8, 24).unwrap();

            prop_assert_eq!(format, RlePixelFormat::Rgb24);
            prop_assert_eq!(output, expected);
        }
    }
}
