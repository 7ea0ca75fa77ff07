use crate::virtual_machine::errors::TapeError;

/// Fixed-capacity, zero-indexed array of optional cells.
///
/// The machine owns two tapes: one holding the loaded instructions and one
/// holding program values. Cells start unset and can only be overwritten,
/// never cleared. The capacity is fixed at construction; accesses outside
/// `[0, capacity)` fail instead of clamping or growing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tape<T> {
    cells: Vec<Option<T>>,
}

impl<T> Tape<T> {
    /// Creates a tape with `capacity` unset cells.
    pub fn new(capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity);
        cells.resize_with(capacity, || None);
        Self { cells }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Validates an address and converts it to an index.
    #[inline]
    fn index(&self, address: i64) -> Result<usize, TapeError> {
        usize::try_from(address)
            .ok()
            .filter(|&index| index < self.cells.len())
            .ok_or(TapeError::OutOfBounds {
                address,
                capacity: self.cells.len(),
            })
    }

    /// Returns the content of a cell, failing if it was never written.
    #[inline]
    pub fn read(&self, address: i64) -> Result<&T, TapeError> {
        let index = self.index(address)?;
        self.cells[index]
            .as_ref()
            .ok_or(TapeError::Uninitialized { address: index })
    }

    /// Returns the content of a cell, or `None` if it was never written.
    pub fn get(&self, address: i64) -> Result<Option<&T>, TapeError> {
        let index = self.index(address)?;
        Ok(self.cells[index].as_ref())
    }

    /// Overwrites a cell.
    #[inline]
    pub fn write(&mut self, address: i64, value: T) -> Result<(), TapeError> {
        let index = self.index(address)?;
        self.cells[index] = Some(value);
        Ok(())
    }
}
