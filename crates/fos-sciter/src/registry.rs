//! Slot table
//!
//! Growable table handing out stable indices. The engine keeps an index as an
//! opaque tag for as long as it likes, so slots are nulled on detach and never
//! compacted or reused.

use std::cell::RefCell;
use std::rc::Rc;

/// Index-stable table of shared records
pub struct SlotTable<T: ?Sized> {
    slots: RefCell<Vec<Option<Rc<T>>>>,
}

impl<T: ?Sized> SlotTable<T> {
    pub fn new() -> Self {
        Self { slots: RefCell::new(Vec::new()) }
    }

    /// Append a record, returning its index
    pub fn register(&self, item: Rc<T>) -> usize {
        let mut slots = self.slots.borrow_mut();
        let index = slots.len();
        slots.push(Some(item));
        index
    }

    /// Live record at `index`
    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        self.slots.borrow().get(index).and_then(|slot| slot.clone())
    }

    /// Null the slot, returning what it held. The index stays taken.
    pub fn detach(&self, index: usize) -> Option<Rc<T>> {
        self.slots.borrow_mut().get_mut(index).and_then(Option::take)
    }

    /// Index of the first live slot matching `pred`
    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.slots
            .borrow()
            .iter()
            .position(|slot| slot.as_deref().is_some_and(&mut pred))
    }

    /// Slots ever handed out, live or nulled
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Slots still holding a record
    pub fn live(&self) -> usize {
        self.slots.borrow().iter().filter(|slot| slot.is_some()).count()
    }
}

impl<T: ?Sized> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_monotonic() {
        let table = SlotTable::new();
        let ids: Vec<usize> = (0..5).map(|i| table.register(Rc::new(i))).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_detach_keeps_other_indices() {
        let table = SlotTable::new();
        let a = table.register(Rc::new("a"));
        let b = table.register(Rc::new("b"));

        assert_eq!(table.detach(a).as_deref(), Some(&"a"));
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).as_deref(), Some(&"b"));
        assert_eq!(table.position(|s| *s == "b"), Some(b));
        assert_eq!(table.position(|s| *s == "a"), None);
    }

    #[test]
    fn test_slots_never_reused() {
        let table = SlotTable::new();
        let a = table.register(Rc::new(1));
        table.detach(a);
        let b = table.register(Rc::new(2));
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let table: SlotTable<u8> = SlotTable::default();
        assert!(table.get(10).is_none());
        assert!(table.detach(10).is_none());
        assert!(table.is_empty());
    }
}
