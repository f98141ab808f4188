//! Composable, tree-shaped type schemas.
//!
//! A [`Schema`] is a rose tree whose leaves name a primitive codec (with its
//! arguments) and whose internal nodes are ordered sequences of children. A
//! depth-first traversal of a schema yields the exact sequence of primitive
//! reads (or writes) the channel engine performs for that channel.

use elpp_types::DecoderError;

use crate::bits::{BitReader, BitWriter};
use crate::primitive::{decode_primitive, encode_primitive, PrimitiveKind, Value};

/// A node in a schema tree.
#[derive(Debug, Clone)]
pub enum Schema {
    /// A single primitive read/write, with an optional field name for
    /// diagnostics (the engine's output is a plain ordered `Vec<Value>`;
    /// names are not required to interpret it, only to describe it).
    Leaf {
        /// The primitive kind this leaf decodes/encodes.
        primitive: PrimitiveKind,
        /// An optional human-readable field name.
        name: Option<&'static str>,
    },
    /// An ordered sequence of child schemas, visited depth-first.
    Seq(Vec<Schema>),
}

impl Schema {
    /// Shorthand for an unnamed primitive leaf.
    pub fn prim(primitive: PrimitiveKind) -> Self {
        Schema::Leaf { primitive, name: None }
    }

    /// Shorthand for a named primitive leaf.
    pub fn named(name: &'static str, primitive: PrimitiveKind) -> Self {
        Schema::Leaf {
            primitive,
            name: Some(name),
        }
    }

    /// Shorthand for a sequence of schemas.
    pub fn seq(children: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Seq(children.into_iter().collect())
    }

    /// Depth-first decode: appends each primitive's output to `out` in schema order.
    pub fn decode_into(&self, reader: &mut BitReader<'_>, out: &mut Vec<Value>) -> Result<(), DecoderError> {
        match self {
            Schema::Leaf { primitive, .. } => {
                out.push(decode_primitive(reader, *primitive)?);
                Ok(())
            }
            Schema::Seq(children) => {
                for child in children {
                    child.decode_into(reader, out)?;
                }
                Ok(())
            }
        }
    }

    /// Depth-first encode: consumes values from `values` (front to back) in schema order.
    pub fn encode_from(
        &self,
        writer: &mut BitWriter,
        values: &mut std::slice::Iter<'_, Value>,
    ) -> Result<(), DecoderError> {
        match self {
            Schema::Leaf { primitive, .. } => {
                let value = values.next().ok_or_else(|| {
                    DecoderError::EncodeMismatch("ran out of values for schema".to_string())
                })?;
                encode_primitive(writer, *primitive, value)
            }
            Schema::Seq(children) => {
                for child in children {
                    child.encode_from(writer, values)?;
                }
                Ok(())
            }
        }
    }

    /// Number of primitive leaves in this schema (depth-first count).
    pub fn leaf_count(&self) -> usize {
        match self {
            Schema::Leaf { .. } => 1,
            Schema::Seq(children) => children.iter().map(Schema::leaf_count).sum(),
        }
    }
}

/// Decodes a full schema's worth of primitives from `reader`, returning the
/// ordered output vector the channel's processor is invoked with.
pub fn decode_schema(schema: &Schema, reader: &mut BitReader<'_>) -> Result<Vec<Value>, DecoderError> {
    let mut out = Vec::with_capacity(schema.leaf_count());
    schema.decode_into(reader, &mut out)?;
    Ok(out)
}

/// Encodes `values` against `schema`, depth-first, into a fresh byte buffer.
pub fn encode_schema(schema: &Schema, values: &[Value]) -> Result<Vec<u8>, DecoderError> {
    let mut writer = BitWriter::new();
    let mut iter = values.iter();
    schema.encode_from(&mut writer, &mut iter)?;
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveKind;

    #[test]
    fn flat_schema_roundtrip() {
        let schema = Schema::seq([
            Schema::named("a", PrimitiveKind::U8),
            Schema::named("b", PrimitiveKind::U16),
            Schema::named("c", PrimitiveKind::DynBytes),
        ]);
        let values = vec![Value::U8(7), Value::U16(1000), Value::Bytes(vec![1, 2, 3])];
        let bytes = encode_schema(&schema, &values).unwrap();
        let mut reader = BitReader::new(&bytes);
        let decoded = decode_schema(&schema, &mut reader).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn nested_schema_depth_first_order() {
        let schema = Schema::seq([
            Schema::prim(PrimitiveKind::U8),
            Schema::seq([Schema::prim(PrimitiveKind::U8), Schema::prim(PrimitiveKind::U8)]),
            Schema::prim(PrimitiveKind::U8),
        ]);
        assert_eq!(schema.leaf_count(), 4);
        let values = vec![Value::U8(1), Value::U8(2), Value::U8(3), Value::U8(4)];
        let bytes = encode_schema(&schema, &values).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        let mut reader = BitReader::new(&bytes);
        let decoded = decode_schema(&schema, &mut reader).unwrap();
        assert_eq!(decoded, values);
    }
}
