use std::time::SystemTime;

use cobaltrdp_graphics::color_conversion::{self, Palette};
use cobaltrdp_graphics::rle::{self, RlePixelFormat};
use cobaltrdp_pdu::bitmap::{BitmapData, BitmapUpdateData, Compression};
use cobaltrdp_pdu::palette::PaletteUpdateData;

use crate::{session_custom_err, session_reason_err, SessionResult};

/// The live screen image: `width * height * 3` bytes of RGB, plus a strictly
/// monotonic version counter.
///
/// The framebuffer is written only by the receive task; consumers take
/// copy-on-read snapshots. One version increment corresponds to one fully
/// applied update record, never to an individual rectangle.
pub struct Framebuffer {
    width: u16,
    height: u16,
    data: Vec<u8>,
    version: u64,
    last_updated: SystemTime,
    palette: Palette,
}

/// Copy-on-read view handed out to screenshot and encoder consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub width: u16,
    pub height: u16,
    pub version: u64,
    pub last_updated: SystemTime,
    pub rgb: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            data: vec![0; usize::from(width) * usize::from(height) * 3],
            version: 0,
            last_updated: SystemTime::now(),
            palette: Palette::default(),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            width: self.width,
            height: self.height,
            version: self.version,
            last_updated: self.last_updated,
            rgb: self.data.clone(),
        }
    }

    /// Records that one update record has been fully applied.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.last_updated = SystemTime::now();
    }

    pub fn apply_palette_update(&mut self, update: &PaletteUpdateData) {
        self.palette.update(&update.entries);
    }

    /// Applies every rectangle of a bitmap update, in array order. Later
    /// rectangles overwrite earlier ones where they overlap.
    ///
    /// Does not touch `version`; the caller bumps it once per record.
    pub fn apply_bitmap_update(&mut self, update: &BitmapUpdateData<'_>) -> SessionResult<()> {
        for rectangle in &update.rectangles {
            self.apply_bitmap_data(rectangle)?;
        }

        Ok(())
    }

    fn apply_bitmap_data(&mut self, bitmap: &BitmapData<'_>) -> SessionResult<()> {
        let bpp = usize::from(bitmap.bits_per_pixel);

        let (rgb, top_down) = if bitmap.compression_flags.contains(Compression::BITMAP_COMPRESSION) {
            // RLE-compressed rectangles decompress to top-down rows.
            let mut decompressed = Vec::new();
            let format = rle::decompress(
                bitmap.bitmap_data,
                &mut decompressed,
                usize::from(bitmap.width),
                usize::from(bitmap.height),
                bpp,
            )
            .map_err(|e| session_custom_err!("bitmap decompression", e))?;

            (color_conversion::to_rgb24(format, &decompressed, &self.palette), true)
        } else {
            // Raw rectangles arrive as bottom-up rows.
            let rgb = match bpp {
                8 => color_conversion::to_rgb24(RlePixelFormat::Rgb8, bitmap.bitmap_data, &self.palette),
                15 => color_conversion::to_rgb24(RlePixelFormat::Rgb15, bitmap.bitmap_data, &self.palette),
                16 => color_conversion::to_rgb24(RlePixelFormat::Rgb16, bitmap.bitmap_data, &self.palette),
                24 => color_conversion::to_rgb24(RlePixelFormat::Rgb24, bitmap.bitmap_data, &self.palette),
                // 32-bpp sessions deliver raw rectangles as BGRX.
                32 => bitmap
                    .bitmap_data
                    .chunks_exact(4)
                    .flat_map(|bgrx| [bgrx[2], bgrx[1], bgrx[0]])
                    .collect(),
                other => {
                    return Err(session_reason_err!(
                        "bitmap update",
                        "unsupported raw bitmap depth: {other} bpp"
                    ))
                }
            };

            (rgb, false)
        };

        self.blit(bitmap, &rgb, top_down);

        Ok(())
    }

    /// Copies a decoded RGB rectangle into the framebuffer, clamping to the
    /// buffer bounds.
    ///
    /// `bitmap.width` may exceed the destination rectangle width because of
    /// the 4-byte alignment padding; the source stride is always
    /// `bitmap.width` pixels.
    fn blit(&mut self, bitmap: &BitmapData<'_>, rgb: &[u8], top_down: bool) {
        let src_width = usize::from(bitmap.width);
        let src_height = usize::from(bitmap.height);

        let dst_x = usize::from(bitmap.rectangle.left);
        let dst_y = usize::from(bitmap.rectangle.top);
        let rect_width = usize::from(bitmap.rectangle.width());
        let rect_height = usize::from(bitmap.rectangle.height());

        let buffer_width = usize::from(self.width);
        let buffer_height = usize::from(self.height);

        if dst_x >= buffer_width || dst_y >= buffer_height {
            return;
        }

        let copy_width = rect_width.min(src_width).min(buffer_width - dst_x);
        let copy_height = rect_height.min(src_height).min(buffer_height - dst_y);

        for row in 0..copy_height {
            let src_row = if top_down { row } else { src_height - row - 1 };

            let src_start = src_row * src_width * 3;
            let src_end = src_start + copy_width * 3;
            if src_end > rgb.len() {
                break;
            }

            let dst_start = ((dst_y + row) * buffer_width + dst_x) * 3;
            self.data[dst_start..dst_start + copy_width * 3].copy_from_slice(&rgb[src_start..src_end]);
        }
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_pdu::geometry::InclusiveRectangle;

    use super::*;

    fn raw_rect(left: u16, top: u16, width: u16, height: u16, color: [u8; 3]) -> (InclusiveRectangle, Vec<u8>) {
        let rectangle = InclusiveRectangle {
            left,
            top,
            right: left + width - 1,
            bottom: top + height - 1,
        };

        // Raw 24-bpp data is BGR and bottom-up; for a solid color the row
        // order does not matter but the channel order does.
        let pixel = [color[2], color[1], color[0]];
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(usize::from(width) * usize::from(height) * 3)
            .collect();

        (rectangle, data)
    }

    fn bitmap<'a>(rectangle: InclusiveRectangle, width: u16, height: u16, data: &'a [u8]) -> BitmapData<'a> {
        BitmapData {
            rectangle,
            width,
            height,
            bits_per_pixel: 24,
            compression_flags: Compression::empty(),
            compressed_data_header: None,
            bitmap_data: data,
        }
    }

    #[test]
    fn later_rectangles_overwrite_earlier_ones() {
        let mut fb = Framebuffer::new(4, 4);

        let (rect_a, data_a) = raw_rect(0, 0, 4, 4, [10, 20, 30]);
        let (rect_b, data_b) = raw_rect(1, 1, 2, 2, [200, 100, 50]);

        let update = BitmapUpdateData {
            rectangles: vec![bitmap(rect_a, 4, 4, &data_a), bitmap(rect_b, 2, 2, &data_b)],
        };

        fb.apply_bitmap_update(&update).unwrap();
        fb.bump_version();

        assert_eq!(fb.version(), 1);
        // Top-left corner keeps rectangle A.
        assert_eq!(&fb.data()[..3], [10, 20, 30]);
        // Pixel (1, 1) holds rectangle B.
        let idx = (4 + 1) * 3;
        assert_eq!(&fb.data()[idx..idx + 3], [200, 100, 50]);
    }

    #[test]
    fn disjoint_rectangles_commute() {
        let (rect_a, data_a) = raw_rect(0, 0, 2, 2, [1, 2, 3]);
        let (rect_b, data_b) = raw_rect(2, 2, 2, 2, [4, 5, 6]);

        let mut fb_ab = Framebuffer::new(4, 4);
        fb_ab
            .apply_bitmap_update(&BitmapUpdateData {
                rectangles: vec![bitmap(rect_a.clone(), 2, 2, &data_a), bitmap(rect_b.clone(), 2, 2, &data_b)],
            })
            .unwrap();

        let mut fb_ba = Framebuffer::new(4, 4);
        fb_ba
            .apply_bitmap_update(&BitmapUpdateData {
                rectangles: vec![bitmap(rect_b, 2, 2, &data_b), bitmap(rect_a, 2, 2, &data_a)],
            })
            .unwrap();

        assert_eq!(fb_ab.data(), fb_ba.data());
    }

    #[test]
    fn rectangles_are_clamped_to_the_buffer() {
        let mut fb = Framebuffer::new(4, 4);

        let (rect, data) = raw_rect(2, 2, 4, 4, [9, 9, 9]);
        fb.apply_bitmap_update(&BitmapUpdateData {
            rectangles: vec![bitmap(rect, 4, 4, &data)],
        })
        .unwrap();

        // The out-of-bounds portion is dropped, in-bounds pixels are written.
        let idx = (2 * 4 + 2) * 3;
        assert_eq!(&fb.data()[idx..idx + 3], [9, 9, 9]);
    }

    #[test]
    fn version_increments_once_per_record() {
        let mut fb = Framebuffer::new(2, 2);
        assert_eq!(fb.version(), 0);

        fb.bump_version();
        fb.bump_version();
        assert_eq!(fb.version(), 2);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut fb = Framebuffer::new(2, 2);
        let snapshot = fb.snapshot();

        let (rect, data) = raw_rect(0, 0, 2, 2, [7, 7, 7]);
        fb.apply_bitmap_update(&BitmapUpdateData {
            rectangles: vec![bitmap(rect, 2, 2, &data)],
        })
        .unwrap();
        fb.bump_version();

        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.rgb, vec![0; 12]);
        assert_eq!(fb.snapshot().version, 1);
    }
}
