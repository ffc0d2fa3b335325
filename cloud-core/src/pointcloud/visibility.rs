use std::collections::TryReserveError;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-point visibility verdict.
///
/// Codes are ordinal: lower means closer to visible. Sensor aggregation
/// reduces over this ordering, so the discriminant values are part of the
/// contract, not an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Visibility {
    Visible = 0,
    OutOfRange = 1,
    OutOfFov = 2,
    Hidden = 3,
}

impl Visibility {
    pub fn from_code(code: u8) -> Option<Visibility> {
        match code {
            0 => Some(Visibility::Visible),
            1 => Some(Visibility::OutOfRange),
            2 => Some(Visibility::OutOfFov),
            3 => Some(Visibility::Hidden),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Shared table of per-point visibility codes.
///
/// Cloning the handle shares the backing storage; the storage is freed when
/// the last handle drops. Mutation and extraction are distinct phases that
/// callers serialize — the lock keeps shared access sound, it is not an
/// invitation to mutate concurrently.
#[derive(Clone, Default)]
pub struct VisibilityTable {
    codes: Arc<RwLock<Vec<Visibility>>>,
}

impl VisibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Visibility>> {
        self.codes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Visibility>> {
        self.codes.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// True once backing storage of nonzero length has been allocated.
    pub fn is_allocated(&self) -> bool {
        !self.is_empty()
    }

    /// Resizes the table to `count` entries, all set to `fill`.
    ///
    /// On allocation failure the table is left empty with its previous
    /// storage freed, never half-sized.
    pub fn resize_filled(&self, count: usize, fill: Visibility) -> Result<(), TryReserveError> {
        let mut codes = self.write();
        codes.clear();
        if let Err(e) = codes.try_reserve_exact(count) {
            *codes = Vec::new();
            return Err(e);
        }
        codes.resize(count, fill);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Visibility> {
        self.read().get(index).copied()
    }

    /// Sets one entry; returns false when `index` is out of range.
    pub fn set(&self, index: usize, visibility: Visibility) -> bool {
        match self.write().get_mut(index) {
            Some(slot) => {
                *slot = visibility;
                true
            }
            None => false,
        }
    }

    pub fn fill(&self, visibility: Visibility) {
        self.write().fill(visibility);
    }

    pub fn count_matching(&self, visibility: Visibility) -> usize {
        self.read().iter().filter(|&&v| v == visibility).count()
    }

    /// Ascending indices of the entries equal to `visibility`.
    pub fn indices_matching(&self, visibility: Visibility) -> Vec<usize> {
        let codes = self.read();
        let count = codes.iter().filter(|&&v| v == visibility).count();
        let mut indices = Vec::with_capacity(count);
        for (index, &code) in codes.iter().enumerate() {
            if code == visibility {
                indices.push(index);
            }
        }
        indices
    }

    /// Copy of the current codes.
    pub fn snapshot(&self) -> Vec<Visibility> {
        self.read().clone()
    }

    /// Replaces the whole table with already-decoded codes.
    pub fn replace(&self, codes: Vec<Visibility>) {
        *self.write() = codes;
    }
}
