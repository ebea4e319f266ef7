//! Partial-update wrapper.

/// A field in a partial update.
///
/// `Unset` leaves the stored value untouched; `Set(v)` overwrites it, even
/// when `v` is an empty or zero value. For nullable columns use
/// `OptionallySet<Option<T>>` so "clear this field" is `Set(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionallySet<T> {
    Unset,
    Set(T),
}

impl<T> Default for OptionallySet<T> {
    fn default() -> Self {
        OptionallySet::Unset
    }
}

impl<T> OptionallySet<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, OptionallySet::Set(_))
    }

    /// Borrow the value if set.
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            OptionallySet::Set(v) => Some(v),
            OptionallySet::Unset => None,
        }
    }

    /// Take the value if set.
    pub fn into_option(self) -> Option<T> {
        match self {
            OptionallySet::Set(v) => Some(v),
            OptionallySet::Unset => None,
        }
    }

    /// Overwrite `target` if set. Returns whether `target` changed.
    pub fn apply_to(&self, target: &mut T) -> bool
    where
        T: Clone + PartialEq,
    {
        match self {
            OptionallySet::Set(v) if v != target => {
                *target = v.clone();
                true
            }
            _ => false,
        }
    }
}

impl<T> From<T> for OptionallySet<T> {
    fn from(value: T) -> Self {
        OptionallySet::Set(value)
    }
}
