//! Fixed-capacity object pool
//!
//! All entities live in a pre-sized arena with an intrusive free list: each
//! free slot stores the index of the next free slot, allocation pops the
//! head and constructs in place, and freeing pushes the slot back - O(1)
//! both ways, no heap traffic after startup, no compaction.
//!
//! Handles are index + generation pairs, so a handle held across a recycle
//! resolves to `None` instead of someone else's entity.

use super::entity::Entity;

/// Stable reference to a pooled entity, valid until the entity is reaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub index: u16,
    pub generation: u16,
}

/// Allocation failed because every slot is in use. Expected under load;
/// callers treat it as "spawn skipped," never as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolExhausted;

impl std::fmt::Display for PoolExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object pool exhausted")
    }
}

impl std::error::Error for PoolExhausted {}

#[derive(Debug)]
enum Slot {
    Free { next: Option<u16>, generation: u16 },
    Used { entity: Entity, generation: u16 },
}

/// The arena. Every slot is in exactly one of two states: on the free list,
/// or holding a live entity.
#[derive(Debug)]
pub struct Pool {
    slots: Vec<Slot>,
    free_head: Option<u16>,
    used: usize,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= u16::MAX as usize);
        let slots = (0..capacity)
            .map(|k| Slot::Free {
                next: if k + 1 < capacity {
                    Some((k + 1) as u16)
                } else {
                    None
                },
                generation: 0,
            })
            .collect();
        Self {
            slots,
            free_head: Some(0),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently holding an entity (ready or not)
    pub fn used_count(&self) -> usize {
        self.used
    }

    pub fn free_count(&self) -> usize {
        self.slots.len() - self.used
    }

    /// Construct an entity in the first open slot
    pub fn alloc(&mut self, entity: Entity) -> Result<Handle, PoolExhausted> {
        let Some(index) = self.free_head else {
            log::debug!("pool exhausted, spawn skipped");
            return Err(PoolExhausted);
        };

        let slot = &mut self.slots[index as usize];
        let (next, generation) = match slot {
            Slot::Free { next, generation } => (*next, *generation),
            Slot::Used { .. } => unreachable!("free list head points at a used slot"),
        };
        self.free_head = next;
        *slot = Slot::Used { entity, generation };
        self.used += 1;

        Ok(Handle { index, generation })
    }

    /// Return a slot to the free list head. The entity is dropped in place;
    /// category-specific teardown has already run by the time we get here.
    pub fn free(&mut self, handle: Handle) {
        let slot = &mut self.slots[handle.index as usize];
        match slot {
            Slot::Used { generation, .. } if *generation == handle.generation => {
                *slot = Slot::Free {
                    next: self.free_head,
                    generation: handle.generation.wrapping_add(1),
                };
                self.free_head = Some(handle.index);
                self.used -= 1;
            }
            _ => debug_assert!(false, "double free or stale handle"),
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&Entity> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Used { entity, generation }) if *generation == handle.generation => {
                Some(entity)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Entity> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot::Used { entity, generation }) if *generation == handle.generation => {
                Some(entity)
            }
            _ => None,
        }
    }

    /// Entity at a raw slot index, if the slot is occupied
    pub fn entity_at(&self, index: usize) -> Option<&Entity> {
        match self.slots.get(index) {
            Some(Slot::Used { entity, .. }) => Some(entity),
            _ => None,
        }
    }

    pub fn entity_at_mut(&mut self, index: usize) -> Option<&mut Entity> {
        match self.slots.get_mut(index) {
            Some(Slot::Used { entity, .. }) => Some(entity),
            _ => None,
        }
    }

    /// Handle for an occupied slot index
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        match self.slots.get(index) {
            Some(Slot::Used { generation, .. }) => Some(Handle {
                index: index as u16,
                generation: *generation,
            }),
            _ => None,
        }
    }

    /// Occupied AND past its ready-after gate: what gameplay systems iterate
    pub fn is_active(&self, index: usize, now_ms: i64) -> bool {
        self.entity_at(index)
            .is_some_and(|e| e.is_ready(now_ms))
    }

    /// Resolve liveness, following a ghost's parent link (one hop; parent
    /// chains do not nest).
    pub fn is_alive(&self, index: usize, now_ms: i64) -> bool {
        let Some(entity) = self.entity_at(index) else {
            return false;
        };
        let parent_alive = entity
            .parent
            .map(|p| match self.get(p) {
                Some(parent) => parent.is_alive(now_ms, None),
                None => false, // parent already reaped
            });
        entity.is_alive(now_ms, parent_alive)
    }

    /// Count of active (used and ready) entities
    pub fn active_count(&self, now_ms: i64) -> usize {
        (0..self.capacity())
            .filter(|&k| self.is_active(k, now_ms))
            .count()
    }

    /// Walk the free list; used by tests to prove no slot leaks
    #[cfg(test)]
    pub fn free_list_len(&self) -> usize {
        let mut n = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            n += 1;
            cursor = match &self.slots[index as usize] {
                Slot::Free { next, .. } => *next,
                Slot::Used { .. } => panic!("used slot on the free list"),
            };
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::{CategoryMask, Kinematics, Payload};
    use glam::Vec2;

    fn icon() -> Entity {
        Entity::new(
            Payload::Icon,
            Kinematics::at(Vec2::new(100.0, 100.0), CategoryMask::NONE),
        )
    }

    #[test]
    fn test_alloc_free_cycle_never_leaks() {
        // N+1 sequential alloc/free pairs on a full-size pool: no failure,
        // and the free list comes back to its original length
        let capacity = 64;
        let mut pool = Pool::new(capacity);
        assert_eq!(pool.free_list_len(), capacity);

        for _ in 0..=capacity {
            let h = pool.alloc(icon()).expect("pool has room");
            assert_eq!(pool.used_count(), 1);
            pool.free(h);
            assert_eq!(pool.used_count(), 0);
        }
        assert_eq!(pool.free_list_len(), capacity);
    }

    #[test]
    fn test_exhaustion_is_nonfatal() {
        let mut pool = Pool::new(4);
        let handles: Vec<_> = (0..4).map(|_| pool.alloc(icon()).unwrap()).collect();
        assert_eq!(pool.alloc(icon()), Err(PoolExhausted));
        assert_eq!(pool.used_count(), 4);

        pool.free(handles[2]);
        assert!(pool.alloc(icon()).is_ok());
    }

    #[test]
    fn test_used_count_never_exceeds_capacity() {
        let mut pool = Pool::new(8);
        for _ in 0..20 {
            let _ = pool.alloc(icon());
        }
        assert_eq!(pool.used_count(), 8);
        assert!(pool.used_count() <= pool.capacity());
    }

    #[test]
    fn test_stale_handle_resolves_to_none() {
        let mut pool = Pool::new(4);
        let h = pool.alloc(icon()).unwrap();
        pool.free(h);
        assert!(pool.get(h).is_none());

        // slot gets recycled; the old handle still must not resolve
        let h2 = pool.alloc(icon()).unwrap();
        assert_eq!(h2.index, h.index);
        assert!(pool.get(h).is_none());
        assert!(pool.get(h2).is_some());
    }

    #[test]
    fn test_readiness_is_a_view_over_occupancy() {
        let mut pool = Pool::new(4);
        let mut e = icon();
        e.ready_after_ms = 5000;
        let h = pool.alloc(e).unwrap();

        // occupied but gated: not active until the deadline passes
        assert_eq!(pool.used_count(), 1);
        assert!(!pool.is_active(h.index as usize, 1000));
        assert!(pool.is_active(h.index as usize, 5001));
    }

    #[test]
    fn test_ghost_liveness_follows_parent() {
        let mut pool = Pool::new(4);
        let parent = pool.alloc(icon()).unwrap();
        let mut ghost = Entity::new(
            Payload::MiniMapGhost,
            Kinematics::at(Vec2::ZERO, CategoryMask::NONE),
        );
        ghost.parent = Some(parent);
        let ghost_h = pool.alloc(ghost).unwrap();

        assert!(pool.is_alive(ghost_h.index as usize, 0));

        // kill the parent; the ghost's verdict flips with no state of its own
        pool.get_mut(parent).unwrap().hp = 0;
        assert!(!pool.is_alive(ghost_h.index as usize, 0));
    }
}
