/// A growable LIFO stack.
///
/// Used for the return stack, which lives outside the addressable arena
/// and is logically unbounded; the cycle budget keeps it from growing
/// without limit.
pub struct Stack<T: Copy> {
    items: Vec<T>,
}

#[derive(Debug, PartialEq)]
pub enum StackError {
    StackEmpty,
}

impl From<StackError> for crate::RuntimeError {
    fn from(_: StackError) -> Self {
        crate::RuntimeError::ReturnStackUnderflow
    }
}

impl<T: Copy> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Stack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[inline]
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        self.pop().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Iterates from the top of the stack down.
    pub fn iter_from_top(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().rev()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
pub mod test {
    use super::{Stack, StackError};
    use crate::word::Cell;

    #[test]
    fn stack() {
        const ITEMS: i32 = 16;
        let mut stack = Stack::<Cell>::new();

        for _ in 0..3 {
            for i in 0..ITEMS {
                stack.push(Cell::Data(i));
            }
            assert_eq!(stack.depth(), ITEMS as usize);
            for i in (0..ITEMS).rev() {
                assert_eq!(stack.pop(), Some(Cell::Data(i)));
            }
            assert_eq!(stack.try_pop(), Err(StackError::StackEmpty));
        }
    }

    #[test]
    fn iterates_top_down() {
        let mut stack = Stack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.iter_from_top().copied().collect::<Vec<_>>(), [3, 2, 1]);
        stack.clear();
        assert_eq!(stack.depth(), 0);
    }
}
