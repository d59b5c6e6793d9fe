//! The code-generation interface.
//!
//! The elaborator consumes a [`Codegen`] handle for exactly four things: a
//! size oracle over type values, the platform C ABI sizes, the default
//! integer width, and a build entrypoint invoked after elaboration completes.
//! Everything else about code generation is opaque to the front-end.
//! [`HostLayout`] is a conservative x86-64 model whose build hook does
//! nothing; a real backend substitutes its own implementation.

use crate::{
    ast::NodeId,
    context::Context,
    value::{ValueData, ValueId, Values},
};

/// The C ABI size queries exposed to `@c_*_size` intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CAbiType {
    Char,
    Short,
    Int,
    Long,
}

/// Back-end handle consumed by the elaborator.
pub trait Codegen {
    /// Size in bytes of a type value.
    fn size_of(&self, values: &Values, ty: ValueId) -> u64;

    /// Size in bytes of a platform C type.
    fn c_size(&self, abi: CAbiType) -> u64;

    /// Width in bits of the default integer type.
    fn default_integer_size(&self) -> u32;

    /// Invoked once after elaboration with the full context and the root
    /// module node. Never invoked when elaboration failed.
    fn build(&self, context: &Context, root: NodeId);
}

/// A conservative x86-64 layout model with a no-op build hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostLayout;

impl Codegen for HostLayout {
    fn size_of(&self, values: &Values, ty: ValueId) -> u64 {
        match values.get(ty) {
            ValueData::IntegerType { bits, .. } | ValueData::FloatType { bits } => u64::from(bits.div_ceil(8)),
            ValueData::ByteType | ValueData::BooleanType => 1,
            ValueData::EnumType { .. } => 8,
            ValueData::PointerType { .. } | ValueData::FunctionType { .. } => 8,
            // An array view is a (length, pointer) pair.
            ValueData::ArrayViewType { .. } => 16,
            ValueData::OptionalType { inner } => self.size_of(values, *inner) + 1,
            ValueData::RangeType { element } => self.size_of(values, *element) * 2,
            ValueData::ArrayType { inner, size } => {
                let count = size
                    .map(|size| match values.get(size) {
                        ValueData::Integer(count) => u64::try_from(*count).unwrap_or(0),
                        _ => 0,
                    })
                    .unwrap_or(0);
                self.size_of(values, *inner) * count
            }
            ValueData::StructType { members, .. } => {
                members.iter().map(|&member| self.size_of(values, member)).sum()
            }
            ValueData::TupleType { members } => members.iter().map(|&member| self.size_of(values, member)).sum(),
            ValueData::UnionType { items } => items
                .iter()
                .map(|&(_, item)| self.size_of(values, item))
                .max()
                .unwrap_or(0),
            ValueData::TaggedUnionType { items, .. } => {
                let payload = items
                    .iter()
                    .map(|&(_, item)| self.size_of(values, item))
                    .max()
                    .unwrap_or(0);
                payload + 8
            }
            ValueData::ResultType { value, error } => {
                let success = value.map_or(0, |value| self.size_of(values, value));
                success.max(self.size_of(values, *error)) + 8
            }
            _ => 0,
        }
    }

    fn c_size(&self, abi: CAbiType) -> u64 {
        match abi {
            CAbiType::Char => 1,
            CAbiType::Short => 2,
            CAbiType::Int => 4,
            CAbiType::Long => 8,
        }
    }

    fn default_integer_size(&self) -> u32 {
        64
    }

    fn build(&self, _context: &Context, _root: NodeId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes() {
        let layout = HostLayout;
        let mut values = Values::new();
        let i64s = values.integer_type(true, 64);
        let byte = values.byte_type();
        let ptr = values.pointer_type(byte);
        let view = values.array_view_type(byte);
        assert_eq!(layout.size_of(&values, i64s), 8);
        assert_eq!(layout.size_of(&values, byte), 1);
        assert_eq!(layout.size_of(&values, ptr), 8);
        assert_eq!(layout.size_of(&values, view), 16);
    }

    #[test]
    fn aggregate_sizes_compose() {
        let layout = HostLayout;
        let mut values = Values::new();
        let byte = values.byte_type();
        let three = values.integer(3);
        let array = values.array_type(byte, Some(three));
        assert_eq!(layout.size_of(&values, array), 3);

        let i32s = values.integer_type(true, 32);
        let tuple = values.alloc(ValueData::TupleType {
            members: vec![i32s, byte],
        });
        assert_eq!(layout.size_of(&values, tuple), 5);
    }
}
