use cobaltrdp_graphics::pointer::DecodedPointer;
use cobaltrdp_pdu::pointer::PointerUpdateData;

use crate::{session_custom_err, session_reason_err, SessionResult};

/// Hard ceiling on the pointer cache, whatever was negotiated.
const MAX_CACHE_ENTRIES: usize = 25;

/// Fixed-size arena of decoded pointer sprites, indexed by the wire cache
/// index. Entries are replaced in place by `New Pointer` updates and only
/// ever evicted by overwrite.
#[derive(Debug)]
pub struct PointerCache {
    entries: Vec<Option<DecodedPointer>>,
}

impl PointerCache {
    pub fn new(negotiated_size: u16) -> Self {
        let capacity = usize::from(negotiated_size).min(MAX_CACHE_ENTRIES);

        Self {
            entries: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&DecodedPointer> {
        self.entries.get(usize::from(index)).and_then(Option::as_ref)
    }

    fn insert(&mut self, index: u16, pointer: DecodedPointer) -> SessionResult<()> {
        let slot = self
            .entries
            .get_mut(usize::from(index))
            .ok_or_else(|| session_reason_err!("pointer cache", "cache index {index} out of bounds"))?;

        *slot = Some(pointer);

        Ok(())
    }
}

/// Current pointer presentation state, mutated only by the receive task.
#[derive(Debug)]
pub struct PointerState {
    cache: PointerCache,
    pub position: (u16, u16),
    pub visible: bool,
    /// Slot of the sprite in use; `None` for the system default cursor.
    pub current_index: Option<u16>,
}

impl PointerState {
    pub fn new(negotiated_cache_size: u16) -> Self {
        Self {
            cache: PointerCache::new(negotiated_cache_size),
            position: (0, 0),
            visible: true,
            current_index: None,
        }
    }

    pub fn cache(&self) -> &PointerCache {
        &self.cache
    }

    /// Sprite currently in use, when one has been transmitted.
    pub fn current_pointer(&self) -> Option<&DecodedPointer> {
        self.current_index.and_then(|index| self.cache.get(index))
    }

    /// Applies one pointer update in reception order.
    ///
    /// A `Cached` update referencing a slot that never received a `New
    /// Pointer` is a protocol error and leaves the state untouched.
    pub fn apply(&mut self, update: &PointerUpdateData<'_>) -> SessionResult<()> {
        match update {
            PointerUpdateData::SetPosition(position) => {
                self.position = (position.x, position.y);
            }
            PointerUpdateData::SetHidden => {
                self.visible = false;
            }
            PointerUpdateData::SetDefault => {
                self.visible = true;
                self.current_index = None;
            }
            PointerUpdateData::Color(attribute) => {
                let pointer = DecodedPointer::decode_color_pointer_attribute(attribute)
                    .map_err(|e| session_custom_err!("color pointer", e))?;

                self.cache.insert(attribute.cache_index, pointer)?;
                self.current_index = Some(attribute.cache_index);
                self.visible = true;
            }
            PointerUpdateData::New(attribute) => {
                let pointer = DecodedPointer::decode_pointer_attribute(attribute)
                    .map_err(|e| session_custom_err!("new pointer", e))?;

                self.cache.insert(attribute.color_pointer.cache_index, pointer)?;
                self.current_index = Some(attribute.color_pointer.cache_index);
                self.visible = true;
            }
            PointerUpdateData::Large(attribute) => {
                let pointer = DecodedPointer::decode_large_pointer_attribute(attribute)
                    .map_err(|e| session_custom_err!("large pointer", e))?;

                self.cache.insert(attribute.cache_index, pointer)?;
                self.current_index = Some(attribute.cache_index);
                self.visible = true;
            }
            PointerUpdateData::Cached(cached) => {
                if self.cache.get(cached.cache_index).is_none() {
                    return Err(session_reason_err!(
                        "cached pointer",
                        "cache slot {} was never filled",
                        cached.cache_index
                    ));
                }

                self.current_index = Some(cached.cache_index);
                self.visible = true;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cobaltrdp_pdu::pointer::{CachedPointerAttribute, ColorPointerAttribute, Point16, PointerAttribute};

    use super::*;

    fn masks_for(size: u16) -> (Vec<u8>, Vec<u8>) {
        let xor_stride = (usize::from(size) * 24).div_ceil(16) * 2;
        let xor_mask = vec![0u8; xor_stride * usize::from(size)];
        let and_stride = usize::from(size).div_ceil(16) * 2;
        let and_mask = vec![0u8; and_stride * usize::from(size)];
        (xor_mask, and_mask)
    }

    fn apply_new(state: &mut PointerState, cache_index: u16, size: u16) {
        let (xor_mask, and_mask) = masks_for(size);

        let update = PointerUpdateData::New(PointerAttribute {
            xor_bpp: 24,
            color_pointer: ColorPointerAttribute {
                cache_index,
                hot_spot: Point16 { x: 0, y: 0 },
                width: size,
                height: size,
                xor_mask: &xor_mask,
                and_mask: &and_mask,
            },
        });

        state.apply(&update).unwrap();
    }

    #[test]
    fn cached_updates_select_previously_stored_sprites() {
        let mut state = PointerState::new(25);

        apply_new(&mut state, 3, 16);
        apply_new(&mut state, 5, 32);

        state
            .apply(&PointerUpdateData::Cached(CachedPointerAttribute { cache_index: 3 }))
            .unwrap();
        assert_eq!(state.current_index, Some(3));

        state
            .apply(&PointerUpdateData::Cached(CachedPointerAttribute { cache_index: 5 }))
            .unwrap();
        assert_eq!(state.current_index, Some(5));
        assert_eq!(state.current_pointer().unwrap().width, 32);
    }

    #[test]
    fn cached_update_for_an_empty_slot_fails_without_mutating_state() {
        let mut state = PointerState::new(25);

        apply_new(&mut state, 3, 16);
        state
            .apply(&PointerUpdateData::Cached(CachedPointerAttribute { cache_index: 3 }))
            .unwrap();

        let result = state.apply(&PointerUpdateData::Cached(CachedPointerAttribute { cache_index: 7 }));

        assert!(result.is_err());
        assert_eq!(state.current_index, Some(3));
    }

    #[test]
    fn capacity_is_capped() {
        let state = PointerState::new(100);
        assert_eq!(state.cache().capacity(), 25);

        let state = PointerState::new(10);
        assert_eq!(state.cache().capacity(), 10);
    }

    #[test]
    fn new_pointer_replaces_occupied_slot() {
        let mut state = PointerState::new(25);

        apply_new(&mut state, 3, 16);
        assert_eq!(state.cache().get(3).unwrap().width, 16);

        apply_new(&mut state, 3, 32);
        assert_eq!(state.cache().get(3).unwrap().width, 32);
    }

    #[test]
    fn position_and_visibility_updates() {
        let mut state = PointerState::new(25);

        state
            .apply(&PointerUpdateData::SetPosition(Point16 { x: 10, y: 20 }))
            .unwrap();
        assert_eq!(state.position, (10, 20));

        state.apply(&PointerUpdateData::SetHidden).unwrap();
        assert!(!state.visible);

        state.apply(&PointerUpdateData::SetDefault).unwrap();
        assert!(state.visible);
        assert_eq!(state.current_index, None);
    }
}
