use cobaltrdp_core::{decode_cursor, ReadCursor};
use cobaltrdp_pdu::fast_path::{FastPathHeader, FastPathUpdate, FastPathUpdatePdu, Fragmentation, UpdateCode};

use crate::{session_reason_err, Framebuffer, PointerState, SessionErrorExt as _, SessionResult};

/// Fast-path output dispatcher.
///
/// One call processes one whole fast-path frame: every update record it
/// contains is applied in order, and the framebuffer version is bumped once
/// when any graphics changed.
pub struct Processor {
    complete_data: CompleteData,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    pub fn new() -> Self {
        Self {
            complete_data: CompleteData::new(),
        }
    }

    /// Returns `true` when the framebuffer content changed.
    pub fn process(
        &mut self,
        framebuffer: &mut Framebuffer,
        pointer: &mut PointerState,
        frame: &[u8],
    ) -> SessionResult<bool> {
        let mut src = ReadCursor::new(frame);

        let header: FastPathHeader = decode_cursor(&mut src).map_err(crate::SessionError::decode)?;
        trace!(fast_path_header = ?header, "Received fast-path frame");

        let mut graphics_updated = false;

        while !src.is_empty() {
            let update_pdu: FastPathUpdatePdu<'_> = decode_cursor(&mut src).map_err(crate::SessionError::decode)?;
            trace!(update_code = ?update_pdu.update_code, fragmentation = ?update_pdu.fragmentation, "Update record");

            if update_pdu.compression_flags.is_some() {
                // Bulk compression is never advertised by this client.
                return Err(session_reason_err!(
                    "fast-path",
                    "received a bulk-compressed update without negotiating compression"
                ));
            }

            let Some(data) = self
                .complete_data
                .process_data(update_pdu.data, update_pdu.fragmentation)
            else {
                continue;
            };

            graphics_updated |= apply_update(framebuffer, pointer, update_pdu.update_code, &data)?;
        }

        if graphics_updated {
            framebuffer.bump_version();
        }

        Ok(graphics_updated)
    }
}

fn apply_update(
    framebuffer: &mut Framebuffer,
    pointer: &mut PointerState,
    update_code: UpdateCode,
    data: &[u8],
) -> SessionResult<bool> {
    let Some(update) = FastPathUpdate::decode_with_code(data, update_code).map_err(crate::SessionError::decode)?
    else {
        // Orders, synchronize and surface commands are accepted and ignored.
        debug!(?update_code, "Ignored fast-path update");
        return Ok(false);
    };

    match update {
        FastPathUpdate::Bitmap(bitmap_update) => {
            trace!(rectangles = bitmap_update.rectangles.len(), "Bitmap update");
            framebuffer.apply_bitmap_update(&bitmap_update)?;
            Ok(true)
        }
        FastPathUpdate::Palette(palette_update) => {
            trace!(entries = palette_update.entries.len(), "Palette update");
            framebuffer.apply_palette_update(&palette_update);
            Ok(true)
        }
        FastPathUpdate::Pointer(pointer_update) => {
            trace!("Pointer update");
            pointer.apply(&pointer_update)?;
            Ok(false)
        }
    }
}

/// Reassembles fragmented fast-path updates.
#[derive(Debug, PartialEq)]
struct CompleteData {
    fragmented_data: Option<Vec<u8>>,
}

impl CompleteData {
    fn new() -> Self {
        Self { fragmented_data: None }
    }

    fn process_data(&mut self, data: &[u8], fragmentation: Fragmentation) -> Option<Vec<u8>> {
        match fragmentation {
            Fragmentation::Single => {
                self.check_data_is_empty();

                Some(data.to_vec())
            }
            Fragmentation::First => {
                self.check_data_is_empty();

                self.fragmented_data = Some(data.to_vec());

                None
            }
            Fragmentation::Next => {
                self.append_data(data);

                None
            }
            Fragmentation::Last => {
                self.append_data(data);

                self.fragmented_data.take()
            }
        }
    }

    fn check_data_is_empty(&mut self) {
        if self.fragmented_data.is_some() {
            warn!("Skipping an unfinished fragmented fast-path update");
            self.fragmented_data = None;
        }
    }

    fn append_data(&mut self, data: &[u8]) {
        if let Some(fragmented_data) = self.fragmented_data.as_mut() {
            fragmented_data.extend_from_slice(data);
        } else {
            warn!("Got a Next/Last fragment without a prior First fragment");
        }
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_core::encode_vec;
    use cobaltrdp_pdu::bitmap::{BitmapData, BitmapUpdateData, Compression};
    use cobaltrdp_pdu::fast_path::EncryptionFlags;
    use cobaltrdp_pdu::geometry::InclusiveRectangle;
    use cobaltrdp_pdu::pointer::Point16;

    use super::*;

    fn encode_frame(records: &[(UpdateCode, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (code, data) in records {
            let record = FastPathUpdatePdu {
                fragmentation: Fragmentation::Single,
                update_code: *code,
                compression_flags: None,
                data,
            };
            body.extend_from_slice(&encode_vec(&record).unwrap());
        }

        let header = FastPathHeader::new(EncryptionFlags::empty(), body.len());
        let mut frame = encode_vec(&header).unwrap();
        frame.extend_from_slice(&body);
        frame
    }

    fn solid_bitmap_update(left: u16, top: u16, size: u16, color: [u8; 3]) -> Vec<u8> {
        let pixel = [color[2], color[1], color[0]];
        let data: Vec<u8> = pixel
            .iter()
            .copied()
            .cycle()
            .take(usize::from(size) * usize::from(size) * 3)
            .collect();

        let update = BitmapUpdateData {
            rectangles: vec![BitmapData {
                rectangle: InclusiveRectangle {
                    left,
                    top,
                    right: left + size - 1,
                    bottom: top + size - 1,
                },
                width: size,
                height: size,
                bits_per_pixel: 24,
                compression_flags: Compression::empty(),
                compressed_data_header: None,
                bitmap_data: &data,
            }],
        };

        encode_vec(&update).unwrap()
    }

    #[test]
    fn interleaved_bitmap_and_pointer_records_bump_version_once() {
        let mut framebuffer = Framebuffer::new(8, 8);
        let mut pointer = PointerState::new(25);
        let mut processor = Processor::new();

        let position = Point16 { x: 10, y: 20 };
        let frame = encode_frame(&[
            (UpdateCode::Bitmap, solid_bitmap_update(0, 0, 4, [1, 1, 1])),
            (UpdateCode::PositionPointer, encode_vec(&position).unwrap()),
            (UpdateCode::Bitmap, solid_bitmap_update(0, 0, 4, [2, 2, 2])),
        ]);

        let updated = processor.process(&mut framebuffer, &mut pointer, &frame).unwrap();

        assert!(updated);
        assert_eq!(framebuffer.version(), 1);
        assert_eq!(pointer.position, (10, 20));
        // Rectangle B was applied after rectangle A.
        assert_eq!(&framebuffer.data()[..3], [2, 2, 2]);
    }

    #[test]
    fn orders_records_are_ignored() {
        let mut framebuffer = Framebuffer::new(8, 8);
        let mut pointer = PointerState::new(25);
        let mut processor = Processor::new();

        let frame = encode_frame(&[(UpdateCode::Orders, vec![0u8; 4])]);

        let updated = processor.process(&mut framebuffer, &mut pointer, &frame).unwrap();

        assert!(!updated);
        assert_eq!(framebuffer.version(), 0);
    }

    #[test]
    fn fragmented_update_is_reassembled() {
        let mut framebuffer = Framebuffer::new(8, 8);
        let mut pointer = PointerState::new(25);
        let mut processor = Processor::new();

        let update = solid_bitmap_update(0, 0, 4, [3, 3, 3]);
        let (first, last) = update.split_at(update.len() / 2);

        let mut body = Vec::new();
        for (fragmentation, data) in [(Fragmentation::First, first), (Fragmentation::Last, last)] {
            let record = FastPathUpdatePdu {
                fragmentation,
                update_code: UpdateCode::Bitmap,
                compression_flags: None,
                data,
            };
            body.extend_from_slice(&encode_vec(&record).unwrap());
        }

        let header = FastPathHeader::new(EncryptionFlags::empty(), body.len());
        let mut frame = encode_vec(&header).unwrap();
        frame.extend_from_slice(&body);

        processor.process(&mut framebuffer, &mut pointer, &frame).unwrap();

        assert_eq!(framebuffer.version(), 1);
        assert_eq!(&framebuffer.data()[..3], [3, 3, 3]);
    }
}
