//! The recursive type descriptor model.
//!
//! A [`TypeDesc`] describes the shape of a message: a primitive, a struct of
//! fields, a union of members, or a fixed-length array. Descriptors compare
//! structurally, and the subtype relation is deliberately narrow: only
//! structs have proper supertypes, namely every strict prefix of their field
//! sequence. A message of a longer struct type can therefore be delivered to
//! a client that accepts any prefix of it, truncated to the accepted shape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::ProtocolError;

/// A recursive description of a message shape.
///
/// Equality and hashing are structural: two descriptors are equal iff they
/// are the same variant with equal children (and, for arrays, equal length).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// A two-byte character.
    Char,
    /// A four-byte signed integer.
    Int32,
    /// An eight-byte signed integer.
    Int64,
    /// A four-byte IEEE float.
    Float32,
    /// An eight-byte IEEE float.
    Float64,
    /// A single byte.
    Bool,
    /// A product of the field types, laid out in order. An empty field list
    /// is a valid (zero-sized) struct.
    Struct(Vec<TypeDesc>),
    /// A sum of the member types; sized to hold the largest member.
    Union(Vec<TypeDesc>),
    /// `length` consecutive elements of the element type.
    Array {
        /// Number of elements.
        length: u64,
        /// The element type.
        elem: Box<TypeDesc>,
    },
}

impl TypeDesc {
    /// Returns the size in bytes of a message of this type.
    ///
    /// Fails with [`ProtocolError::TypeTooLarge`] if the size overflows u64.
    pub fn size(&self) -> Result<u64, ProtocolError> {
        match self {
            TypeDesc::Char => Ok(2),
            TypeDesc::Int32 => Ok(4),
            TypeDesc::Int64 => Ok(8),
            TypeDesc::Float32 => Ok(4),
            TypeDesc::Float64 => Ok(8),
            TypeDesc::Bool => Ok(1),
            TypeDesc::Struct(fields) => fields.iter().try_fold(0u64, |sum, field| {
                sum.checked_add(field.size()?)
                    .ok_or(ProtocolError::TypeTooLarge)
            }),
            TypeDesc::Union(members) => members.iter().try_fold(0u64, |max, member| {
                Ok(std::cmp::max(max, member.size()?))
            }),
            TypeDesc::Array { length, elem } => length
                .checked_mul(elem.size()?)
                .ok_or(ProtocolError::TypeTooLarge),
        }
    }

    /// A human-readable name for this type, used in logs and error messages.
    pub fn name(&self) -> String {
        match self {
            TypeDesc::Char => "Char".to_owned(),
            TypeDesc::Int32 => "Int32".to_owned(),
            TypeDesc::Int64 => "Int64".to_owned(),
            TypeDesc::Float32 => "Float32".to_owned(),
            TypeDesc::Float64 => "Float64".to_owned(),
            TypeDesc::Bool => "Bool".to_owned(),
            TypeDesc::Struct(fields) => {
                let mut name = String::from("Struct");
                for field in fields {
                    name.push('-');
                    name.push_str(&field.name());
                }
                name
            }
            TypeDesc::Union(members) => {
                let mut name = String::from("Union");
                for member in members {
                    name.push('-');
                    name.push_str(&member.name());
                }
                name
            }
            TypeDesc::Array { length, elem } => format!("Array-{}-{}", elem.name(), length),
        }
    }

    /// Whether `self` is a strict structural subtype of `sup`.
    ///
    /// Holds only when both are structs and `sup`'s field sequence is a
    /// strict prefix of `self`'s. No type is a subtype of itself.
    pub fn is_subtype_of(&self, sup: &TypeDesc) -> bool {
        match (self, sup) {
            (TypeDesc::Struct(fields), TypeDesc::Struct(sup_fields)) => {
                sup_fields.len() < fields.len() && fields[..sup_fields.len()] == sup_fields[..]
            }
            _ => false,
        }
    }

    /// Enumerates this type's supertypes, starting with the type itself.
    ///
    /// For a struct the list continues with every proper prefix of the field
    /// sequence, longest first, ending at the empty struct. All other
    /// variants have only themselves. Routing walks this list in order, so
    /// the first accepted entry is the most specific match.
    pub fn supertypes(&self) -> Vec<TypeDesc> {
        match self {
            TypeDesc::Struct(fields) => (0..=fields.len())
                .rev()
                .map(|prefix| TypeDesc::Struct(fields[..prefix].to_vec()))
                .collect(),
            other => vec![other.clone()],
        }
    }
}

/// A memoisation of [`TypeDesc::supertypes`].
///
/// Keys compare structurally. A supertype list is computed at most once per
/// descriptor and handed out as a shared slice afterwards; entries are never
/// rewritten. The broker owns one instance and threads it through routing;
/// nothing here is process-global.
#[derive(Debug, Default)]
pub struct SupertypeCache {
    inner: Mutex<HashMap<TypeDesc, Arc<[TypeDesc]>>>,
}

impl SupertypeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the supertype list for `ty`, computing and installing it on
    /// first use.
    pub fn supertypes(&self, ty: &TypeDesc) -> Arc<[TypeDesc]> {
        let mut cache = self.inner.lock().unwrap();
        if let Some(list) = cache.get(ty) {
            return Arc::clone(list);
        }

        let list: Arc<[TypeDesc]> = ty.supertypes().into();
        cache.insert(ty.clone(), Arc::clone(&list));
        list
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn primitive_sizes() {
        assert_eq!(TypeDesc::Char.size().unwrap(), 2);
        assert_eq!(TypeDesc::Int32.size().unwrap(), 4);
        assert_eq!(TypeDesc::Int64.size().unwrap(), 8);
        assert_eq!(TypeDesc::Float32.size().unwrap(), 4);
        assert_eq!(TypeDesc::Float64.size().unwrap(), 8);
        assert_eq!(TypeDesc::Bool.size().unwrap(), 1);
    }

    #[test]
    fn composite_sizes() {
        let record = TypeDesc::Struct(vec![TypeDesc::Int32, TypeDesc::Int64, TypeDesc::Bool]);
        assert_eq!(record.size().unwrap(), 13);

        assert_eq!(TypeDesc::Struct(vec![]).size().unwrap(), 0);

        let either = TypeDesc::Union(vec![TypeDesc::Char, TypeDesc::Float64, TypeDesc::Bool]);
        assert_eq!(either.size().unwrap(), 8);

        assert_eq!(TypeDesc::Union(vec![]).size().unwrap(), 0);

        let block = TypeDesc::Array {
            length: 16,
            elem: Box::new(TypeDesc::Int32),
        };
        assert_eq!(block.size().unwrap(), 64);
    }

    #[test]
    fn array_size_overflow() {
        let huge = TypeDesc::Array {
            length: u64::MAX,
            elem: Box::new(TypeDesc::Char),
        };
        assert_matches!(huge.size(), Err(ProtocolError::TypeTooLarge));

        // Overflow inside a nested element is reported too.
        let nested = TypeDesc::Struct(vec![TypeDesc::Int32, huge]);
        assert_matches!(nested.size(), Err(ProtocolError::TypeTooLarge));
    }

    #[test]
    fn names() {
        assert_eq!(TypeDesc::Int32.name(), "Int32");
        assert_eq!(
            TypeDesc::Struct(vec![TypeDesc::Int32, TypeDesc::Bool]).name(),
            "Struct-Int32-Bool"
        );
        assert_eq!(TypeDesc::Union(vec![TypeDesc::Char]).name(), "Union-Char");
        assert_eq!(
            TypeDesc::Array {
                length: 4,
                elem: Box::new(TypeDesc::Float32),
            }
            .name(),
            "Array-Float32-4"
        );
    }

    #[test]
    fn subtype_is_strict_prefix() {
        let long = TypeDesc::Struct(vec![TypeDesc::Int32, TypeDesc::Int64, TypeDesc::Bool]);
        let prefix = TypeDesc::Struct(vec![TypeDesc::Int32, TypeDesc::Int64]);
        let empty = TypeDesc::Struct(vec![]);

        assert!(long.is_subtype_of(&prefix));
        assert!(long.is_subtype_of(&empty));
        assert!(prefix.is_subtype_of(&empty));

        // Strict: a struct is not a subtype of itself.
        assert!(!long.is_subtype_of(&long));
        // Nor of anything longer or mismatched.
        assert!(!prefix.is_subtype_of(&long));
        assert!(!long.is_subtype_of(&TypeDesc::Struct(vec![TypeDesc::Int64])));
    }

    #[test]
    fn non_structs_have_no_proper_supertypes() {
        let arr = TypeDesc::Array {
            length: 2,
            elem: Box::new(TypeDesc::Int32),
        };
        assert!(!TypeDesc::Int32.is_subtype_of(&TypeDesc::Int32));
        assert!(!arr.is_subtype_of(&TypeDesc::Struct(vec![])));
        assert_eq!(arr.supertypes(), vec![arr.clone()]);
        assert_eq!(TypeDesc::Bool.supertypes(), vec![TypeDesc::Bool]);
    }

    #[test]
    fn supertypes_self_first_then_shrinking_prefixes() {
        let ty = TypeDesc::Struct(vec![TypeDesc::Int32, TypeDesc::Int64]);
        let list = ty.supertypes();

        assert_eq!(
            list,
            vec![
                ty.clone(),
                TypeDesc::Struct(vec![TypeDesc::Int32]),
                TypeDesc::Struct(vec![]),
            ]
        );

        // Every entry after the first is a strict prefix of the type.
        for sup in &list[1..] {
            assert!(ty.is_subtype_of(sup));
        }
    }

    #[test]
    fn supertype_cache_installs_once() {
        let cache = SupertypeCache::new();
        let ty = TypeDesc::Struct(vec![TypeDesc::Bool, TypeDesc::Char]);

        let first = cache.supertypes(&ty);
        let second = cache.supertypes(&ty);

        assert_eq!(&*first, ty.supertypes().as_slice());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
