//! Single-slot storage with manual lifetime control.
//!
//! Combinators keep the operation states of their children in a [`Slot`] so a child can be
//! constructed when it is actually needed (after the parent is pinned) and destroyed as soon as
//! it has delivered its terminal signal, reusing the same memory for the next child.

use std::fmt;
use std::mem::MaybeUninit;
use std::pin::Pin;

/// Storage cell holding at most one value of type `T`.
///
/// Unlike `Option<T>`, the cell never constructs or destroys implicitly while in use:
/// [`Slot::construct_with`] on an occupied cell and [`Slot::destruct`] on an empty one are
/// programming errors and abort the process.
pub struct Slot<T> {
    constructed: bool,
    value: MaybeUninit<T>,
}

impl<T> Slot<T> {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self {
            constructed: false,
            value: MaybeUninit::uninit(),
        }
    }

    /// Invokes `factory` and stores its result in the cell.
    ///
    /// # Returns
    /// A reference to the stored value
    ///
    /// # Aborts
    /// If the cell already holds a value.
    pub fn construct_with<F>(&mut self, factory: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        exec_check!(!self.constructed, "slot already holds a value");

        let value = self.value.write(factory());
        self.constructed = true;

        value
    }

    /// Drops the stored value in place and marks the cell empty.
    ///
    /// # Aborts
    /// If the cell is empty.
    pub fn destruct(&mut self) {
        exec_check!(self.constructed, "slot is empty, nothing to destruct");

        self.constructed = false;
        // SAFETY: `constructed` was set, so the value is initialised. The flag is cleared first
        // so a panicking destructor cannot lead to a second drop.
        unsafe { self.value.assume_init_drop() };
    }

    /// Reports whether the cell holds a value.
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    /// Returns the stored value.
    ///
    /// # Aborts
    /// If the cell is empty.
    pub fn get(&self) -> &T {
        exec_check!(self.constructed, "slot is empty");

        // SAFETY: checked above.
        unsafe { self.value.assume_init_ref() }
    }

    /// Returns the stored value mutably.
    ///
    /// # Aborts
    /// If the cell is empty.
    pub fn get_mut(&mut self) -> &mut T {
        exec_check!(self.constructed, "slot is empty");

        // SAFETY: checked above.
        unsafe { self.value.assume_init_mut() }
    }

    /// Pinned projection to the stored value.
    ///
    /// # Aborts
    /// If the cell is empty.
    pub fn as_pin_mut(self: Pin<&mut Self>) -> Pin<&mut T> {
        // SAFETY: the value is never moved out of a pinned slot; it is only dropped in place.
        unsafe { self.map_unchecked_mut(Slot::get_mut) }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.constructed {
            self.destruct();
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("constructed", &self.constructed)
            .finish()
    }
}
