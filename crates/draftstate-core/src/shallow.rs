#![forbid(unsafe_code)]

//! One-level equality used to gate observer notifications.
//!
//! Two traits split the comparison the way a selection needs it:
//!
//! - [`Same`]: identity. Plain values compare by value, shared pointers
//!   (`Rc`, `Arc`, persistent collections) compare by address.
//! - [`ShallowEq`]: the gate itself. Containers compare their key sets and
//!   then each entry with [`Same`]; scalars and pointers fall back to
//!   [`Same`].
//!
//! A selection returning a tuple, a map, or a struct declared with
//! [`impl_shallow_eq!`](crate::impl_shallow_eq) therefore notifies only when
//! one of its direct members changed identity.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

/// Identity comparison (`===`).
pub trait Same {
    fn same(&self, other: &Self) -> bool;
}

/// Shallow structural comparison: same keys, each value [`Same`].
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

/// Free-function form of [`ShallowEq::shallow_eq`].
#[must_use]
pub fn shallow_eq<T: ShallowEq + ?Sized>(a: &T, b: &T) -> bool {
    a.shallow_eq(b)
}

macro_rules! by_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl Same for $t {
                #[inline]
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }

            impl ShallowEq for $t {
                #[inline]
                fn shallow_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

by_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    String,
);

impl<T: Same + ?Sized> Same for &T {
    #[inline]
    fn same(&self, other: &Self) -> bool {
        (**self).same(*other)
    }
}

impl<T: ?Sized> Same for Rc<T> {
    #[inline]
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> ShallowEq for Rc<T> {
    #[inline]
    fn shallow_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Same for Arc<T> {
    #[inline]
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> ShallowEq for Arc<T> {
    #[inline]
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Same> Same for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Same> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

macro_rules! tuple_shallow {
    ($(($($name:ident $idx:tt),+)),+ $(,)?) => {
        $(
            impl<$($name: Same),+> ShallowEq for ($($name,)+) {
                fn shallow_eq(&self, other: &Self) -> bool {
                    true $(&& self.$idx.same(&other.$idx))+
                }
            }
        )+
    };
}

tuple_shallow!(
    (A 0),
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
    (A 0, B 1, C 2, D 3, E 4),
    (A 0, B 1, C 2, D 3, E 4, F 5),
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6),
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7),
);

impl<T: Same> ShallowEq for [T] {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same(b))
    }
}

impl<T: Same, const N: usize> ShallowEq for [T; N] {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.as_slice().shallow_eq(other.as_slice())
    }
}

impl<T: Same> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.as_slice().shallow_eq(other.as_slice())
    }
}

impl<K: Eq + Hash, V: Same, H: BuildHasher> ShallowEq for HashMap<K, V, H> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|w| v.same(w)))
    }
}

impl<K: Ord, V: Same> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|w| v.same(w)))
    }
}

/// Implement [`ShallowEq`] for a struct by comparing the listed fields with
/// [`Same`].
///
/// ```
/// use draftstate_core::impl_shallow_eq;
/// use draftstate_core::shallow::ShallowEq;
///
/// struct View {
///     count: u32,
///     title: String,
/// }
/// impl_shallow_eq!(View { count, title });
///
/// let a = View { count: 1, title: "x".into() };
/// let b = View { count: 1, title: "x".into() };
/// assert!(a.shallow_eq(&b));
/// ```
#[macro_export]
macro_rules! impl_shallow_eq {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::shallow::ShallowEq for $ty {
            fn shallow_eq(&self, other: &Self) -> bool {
                true $(&& $crate::shallow::Same::same(&self.$field, &other.$field))+
            }
        }
    };
}

#[cfg(feature = "hamt")]
mod hamt {
    use std::hash::{BuildHasher, Hash};

    use im::{HashMap, OrdMap, Vector};

    use super::{Same, ShallowEq};

    impl<T: Clone> Same for Vector<T> {
        fn same(&self, other: &Self) -> bool {
            self.ptr_eq(other)
        }
    }

    impl<T: Clone + Same> ShallowEq for Vector<T> {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self.iter().zip(other.iter()).all(|(a, b)| a.same(b)))
        }
    }

    impl<K, V, H> Same for HashMap<K, V, H>
    where
        K: Hash + Eq + Clone,
        V: Clone,
        H: BuildHasher,
    {
        fn same(&self, other: &Self) -> bool {
            self.ptr_eq(other)
        }
    }

    impl<K, V, H> ShallowEq for HashMap<K, V, H>
    where
        K: Hash + Eq + Clone,
        V: Clone + Same,
        H: BuildHasher,
    {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self
                        .iter()
                        .all(|(k, v)| other.get(k).is_some_and(|w| v.same(w))))
        }
    }

    impl<K: Ord + Clone, V: Clone> Same for OrdMap<K, V> {
        fn same(&self, other: &Self) -> bool {
            self.ptr_eq(other)
        }
    }

    impl<K: Ord + Clone, V: Clone + Same> ShallowEq for OrdMap<K, V> {
        fn shallow_eq(&self, other: &Self) -> bool {
            self.ptr_eq(other)
                || (self.len() == other.len()
                    && self
                        .iter()
                        .all(|(k, v)| other.get(k).is_some_and(|w| v.same(w))))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_compare_by_value() {
        assert!(1_i32.shallow_eq(&1));
        assert!(!1_i32.shallow_eq(&2));
        assert!("a".to_string().shallow_eq(&"a".to_string()));
        assert!(!f64::NAN.shallow_eq(&f64::NAN));
    }

    #[test]
    fn pointers_compare_by_identity() {
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(a.shallow_eq(&Rc::clone(&a)));
        assert!(!a.shallow_eq(&b));
    }

    #[test]
    fn tuple_is_one_level() {
        let shared = Rc::new(5);
        assert!((1, Rc::clone(&shared)).shallow_eq(&(1, Rc::clone(&shared))));
        // Equal content behind different pointers is a change.
        assert!(!(1, Rc::new(5)).shallow_eq(&(1, Rc::new(5))));
    }

    #[test]
    fn vec_compares_length_then_members() {
        assert!(vec![1, 2, 3].shallow_eq(&vec![1, 2, 3]));
        assert!(!vec![1, 2].shallow_eq(&vec![1, 2, 3]));
        assert!(!vec![1, 2, 4].shallow_eq(&vec![1, 2, 3]));
    }

    #[test]
    fn maps_compare_key_sets() {
        let a: HashMap<&str, i32> = [("x", 1), ("y", 2)].into_iter().collect();
        let b: HashMap<&str, i32> = [("y", 2), ("x", 1)].into_iter().collect();
        let c: HashMap<&str, i32> = [("x", 1), ("z", 2)].into_iter().collect();
        assert!(a.shallow_eq(&b));
        assert!(!a.shallow_eq(&c));

        let d: BTreeMap<i32, &str> = [(1, "a")].into_iter().collect();
        let e: BTreeMap<i32, &str> = [(1, "a"), (2, "b")].into_iter().collect();
        assert!(!d.shallow_eq(&e));
        assert!(!e.shallow_eq(&d));
    }

    #[test]
    fn option_delegates_to_same() {
        assert!(Some(3).shallow_eq(&Some(3)));
        assert!(None::<i32>.shallow_eq(&None));
        assert!(!Some(3).shallow_eq(&None));
    }

    struct Row {
        id: u32,
        tags: Rc<Vec<String>>,
    }
    impl_shallow_eq!(Row { id, tags });

    #[test]
    fn macro_struct_uses_field_identity() {
        let tags = Rc::new(vec!["a".to_string()]);
        let a = Row {
            id: 1,
            tags: Rc::clone(&tags),
        };
        let b = Row {
            id: 1,
            tags: Rc::clone(&tags),
        };
        let c = Row {
            id: 1,
            tags: Rc::new(vec!["a".to_string()]),
        };
        assert!(a.shallow_eq(&b));
        assert!(!a.shallow_eq(&c));
    }
}
