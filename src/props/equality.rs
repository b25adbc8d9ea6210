//! Identity and shallow-equality comparisons used for render bail-outs.
//!
//! Two levels of comparison are provided:
//!
//! - [`Identical`]: identity in the `Object.is` sense. Scalars and strings
//!   compare by value, shared containers (`Arc`) compare by pointer, floats
//!   treat `NaN` as identical to itself and `+0.0` as distinct from `-0.0`.
//! - [`ShallowEq`]: identity first, then one level of key-by-key (or
//!   field-by-field) [`Identical`] comparison. Never recurses into nested
//!   containers.
//!
//! Owned collections such as `Vec<T>` deliberately implement neither trait:
//! they have no identity of their own. Wrap them in an `Arc` so that "the same
//! list" and "an equal list" stay distinguishable.

use std::sync::Arc;

/// Identity comparison (`Object.is` semantics).
pub trait Identical {
    fn identical(&self, other: &Self) -> bool;
}

/// One-level-deep structural comparison over mapping-shaped values.
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

/// Free-function form of [`ShallowEq::shallow_eq`].
pub fn shallow_equal<T: ShallowEq + ?Sized>(a: &T, b: &T) -> bool {
    a.shallow_eq(b)
}

macro_rules! impl_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identical for $ty {
                #[inline]
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }

            impl ShallowEq for $ty {
                #[inline]
                fn shallow_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_by_value!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String, str,
);

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl Identical for $ty {
                #[inline]
                fn identical(&self, other: &Self) -> bool {
                    (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                }
            }

            impl ShallowEq for $ty {
                #[inline]
                fn shallow_eq(&self, other: &Self) -> bool {
                    self.identical(other)
                }
            }
        )*
    };
}

impl_float!(f32, f64);

impl<T: ?Sized> Identical for Arc<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ShallowEq + ?Sized> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other) || (**self).shallow_eq(other)
    }
}

impl<T: Identical> Identical for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Identical> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

// Tuples behave like small positional mappings.
macro_rules! impl_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Identical),+> ShallowEq for ($($name,)+) {
            fn shallow_eq(&self, other: &Self) -> bool {
                true $(&& self.$idx.identical(&other.$idx))+
            }
        }
    };
}

impl_tuple!(A: 0);
impl_tuple!(A: 0, B: 1);
impl_tuple!(A: 0, B: 1, C: 2);
impl_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);

/// Implement [`ShallowEq`] for a struct by comparing the listed fields with
/// [`Identical`].
///
/// ```ignore
/// struct TodoListProps {
///     todos: Arc<Vec<Todo>>,
///     filter: String,
/// }
///
/// statewire::impl_shallow_eq!(TodoListProps { todos, filter });
/// ```
#[macro_export]
macro_rules! impl_shallow_eq {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::ShallowEq for $ty {
            fn shallow_eq(&self, other: &Self) -> bool {
                true $(&& $crate::Identical::identical(&self.$field, &other.$field))*
            }
        }
    };
}
