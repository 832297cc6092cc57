use super::REQUEST_SLOT_COUNT;

/// Containers a request slot can be linked into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub(crate) enum List {
    Pending = 0,
    Waiting = 1,
    Free = 2,
}

const LIST_COUNT: usize = 3;
const NODE_COUNT: usize = LIST_COUNT + REQUEST_SLOT_COUNT;
const SLOT_OFFSET: u8 = LIST_COUNT as u8;

const _: () = core::assert!(NODE_COUNT <= u8::MAX as usize + 1);

#[derive(Clone, Copy)]
struct Link {
    next: u8,
    prev: u8,
}

/// Intrusive cyclic lists over request slots
///
/// The first nodes are list heads, the rest are slots. A slot is linked into at most one list:
/// linking always unlinks the slot first. An unlinked slot points to itself.
pub(crate) struct SlotLists {
    links: [Link; NODE_COUNT],
}

impl SlotLists {
    /// Creates lists with all slots in the `Free` list in ascending order
    pub fn new() -> Self {
        let mut lists = Self {
            links: core::array::from_fn(|i| {
                let node = unwrap!(u8::try_from(i));
                Link {
                    next: node,
                    prev: node,
                }
            }),
        };
        for slot in 0..REQUEST_SLOT_COUNT as u8 {
            lists.push_back(List::Free, slot);
        }
        lists
    }

    pub fn front(&self, list: List) -> Option<u8> {
        self.links[list as usize].next.checked_sub(SLOT_OFFSET)
    }

    /// Returns the slot after `slot` in its list
    pub fn next(&self, slot: u8) -> Option<u8> {
        self.links[usize::from(SLOT_OFFSET + slot)]
            .next
            .checked_sub(SLOT_OFFSET)
    }

    pub fn is_empty(&self, list: List) -> bool {
        self.front(list).is_none()
    }

    pub fn is_linked(&self, slot: u8) -> bool {
        let node = SLOT_OFFSET + slot;
        self.links[usize::from(node)].next != node
    }

    pub fn iter(&self, list: List) -> impl Iterator<Item = u8> + '_ {
        core::iter::successors(self.front(list), |&slot| self.next(slot))
    }

    pub fn len(&self, list: List) -> usize {
        self.iter(list).count()
    }

    pub fn unlink(&mut self, slot: u8) {
        assert!(usize::from(slot) < REQUEST_SLOT_COUNT);
        let node = SLOT_OFFSET + slot;
        let Link { next, prev } = self.links[usize::from(node)];
        self.links[usize::from(next)].prev = prev;
        self.links[usize::from(prev)].next = next;
        self.links[usize::from(node)] = Link {
            next: node,
            prev: node,
        };
    }

    pub fn push_front(&mut self, list: List, slot: u8) {
        let head = list as u8;
        self.insert_after(SLOT_OFFSET + slot, head);
    }

    pub fn push_back(&mut self, list: List, slot: u8) {
        let head = list as u8;
        let last = self.links[usize::from(head)].prev;
        self.insert_after(SLOT_OFFSET + slot, last);
    }

    fn insert_after(&mut self, node: u8, prev: u8) {
        self.unlink(node - SLOT_OFFSET);
        let next = self.links[usize::from(prev)].next;
        self.links[usize::from(node)] = Link { next, prev };
        self.links[usize::from(next)].prev = node;
        self.links[usize::from(prev)].next = node;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    fn collect(lists: &SlotLists, list: List) -> Vec<u8> {
        lists.iter(list).collect()
    }

    #[test]
    fn test_initial_free_list() {
        let lists = SlotLists::new();
        assert_eq!(lists.len(List::Free), REQUEST_SLOT_COUNT);
        assert_eq!(lists.front(List::Free), Some(0));
        assert!(lists.is_empty(List::Pending));
        assert!(lists.is_empty(List::Waiting));
    }

    #[test]
    fn test_move_between_lists() {
        let mut lists = SlotLists::new();
        lists.push_back(List::Pending, 3);
        lists.push_back(List::Pending, 5);
        lists.push_front(List::Pending, 7);
        assert_eq!(collect(&lists, List::Pending), [7, 3, 5]);
        assert_eq!(lists.len(List::Free), REQUEST_SLOT_COUNT - 3);

        lists.push_back(List::Waiting, 3);
        assert_eq!(collect(&lists, List::Pending), [7, 5]);
        assert_eq!(collect(&lists, List::Waiting), [3]);
    }

    #[test]
    fn test_unlink() {
        let mut lists = SlotLists::new();
        lists.push_back(List::Pending, 1);
        lists.push_back(List::Pending, 2);
        lists.unlink(1);
        assert!(!lists.is_linked(1));
        assert!(lists.is_linked(2));
        assert_eq!(collect(&lists, List::Pending), [2]);

        // Unlinking twice is harmless
        lists.unlink(1);
        assert_eq!(collect(&lists, List::Pending), [2]);
    }
}
