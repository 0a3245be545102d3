//! Custom type codecs applied by collection handles
//!
//! The driver only understands BSON values. Types it cannot represent natively
//! (such as `rust_decimal::Decimal`) get a [`TypeCodec`]; codecs are grouped in
//! a [`TypeRegistry`] and attached to collection handles through
//! [`CodecOptions`], so workload code reads and writes those values without
//! doing the conversion by hand.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Decimal128, Document};
use rust_decimal::Decimal;

use crate::error::{Result, WorkloadError};

/// Conversion between one Rust type and its BSON representation.
pub trait TypeCodec: Send + Sync + 'static {
    /// Rust type handled by this codec.
    type Value: Send + 'static;

    /// Short human readable name used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Converts a value to its wire representation.
    fn encode(&self, value: &Self::Value) -> Result<Bson>;

    /// Reconstructs a value from its wire representation.
    fn decode(&self, value: &Bson) -> Result<Self::Value>;
}

/// Object-safe view of a [`TypeCodec`] used inside the registry.
trait ErasedCodec: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn encode_any(&self, value: &dyn Any) -> Result<Bson>;
    fn decode_any(&self, value: &Bson) -> Result<Box<dyn Any + Send>>;
}

impl<C: TypeCodec> ErasedCodec for C {
    fn type_name(&self) -> &'static str {
        TypeCodec::type_name(self)
    }

    fn encode_any(&self, value: &dyn Any) -> Result<Bson> {
        let value = value.downcast_ref::<C::Value>().ok_or_else(|| {
            WorkloadError::Codec(format!(
                "value handed to the {} codec has the wrong type",
                TypeCodec::type_name(self)
            ))
        })?;
        self.encode(value)
    }

    fn decode_any(&self, value: &Bson) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(self.decode(value)?))
    }
}

/// Set of codecs keyed by the Rust type they handle.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    codecs: HashMap<TypeId, Arc<dyn ErasedCodec>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a codec, replacing any codec previously registered for the same type.
    #[must_use]
    pub fn register<C: TypeCodec>(mut self, codec: C) -> Self {
        self.codecs.insert(TypeId::of::<C::Value>(), Arc::new(codec));
        self
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.codecs.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    fn codec_for<T: 'static>(&self) -> Result<&Arc<dyn ErasedCodec>> {
        self.codecs.get(&TypeId::of::<T>()).ok_or_else(|| {
            WorkloadError::Codec(format!(
                "no codec registered for {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Encodes a value using the codec registered for `T`.
    pub fn encode<T: 'static>(&self, value: &T) -> Result<Bson> {
        self.codec_for::<T>()?.encode_any(value)
    }

    /// Decodes a value using the codec registered for `T`.
    pub fn decode<T: 'static>(&self, value: &Bson) -> Result<T> {
        let codec = self.codec_for::<T>()?;
        codec
            .decode_any(value)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                WorkloadError::Codec(format!("{} codec produced a foreign type", codec.type_name()))
            })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.codecs.values().map(|c| c.type_name()).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("codecs", &names).finish()
    }
}

/// Codec configuration attached to every collection handle.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    type_registry: TypeRegistry,
}

impl CodecOptions {
    pub fn new(type_registry: TypeRegistry) -> Self {
        Self { type_registry }
    }

    /// Options carrying the [`DecimalCodec`], as used for every provisioned collection.
    pub fn with_decimal() -> Self {
        Self::new(TypeRegistry::new().register(DecimalCodec))
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    /// Stores `value` under `key`, encoded by the registered codec.
    pub fn set_typed<T: 'static>(&self, doc: &mut Document, key: &str, value: &T) -> Result<()> {
        let encoded = self.type_registry.encode(value)?;
        doc.insert(key, encoded);
        Ok(())
    }

    /// Reads `key` from `doc` and decodes it with the registered codec.
    pub fn get_typed<T: 'static>(&self, doc: &Document, key: &str) -> Result<Option<T>> {
        match doc.get(key) {
            None | Some(Bson::Null) => Ok(None),
            Some(value) => self.type_registry.decode(value).map(Some),
        }
    }
}

const DECIMAL128_EXPONENT_BIAS: i32 = 6176;
const DECIMAL128_COEFFICIENT_BITS: u32 = 113;
const DECIMAL_MAX_SCALE: i32 = 28;

/// Maps `rust_decimal::Decimal` to BSON `Decimal128` (IEEE 754-2008 BID encoding).
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalCodec;

impl TypeCodec for DecimalCodec {
    type Value = Decimal;

    fn type_name(&self) -> &'static str {
        "decimal"
    }

    fn encode(&self, value: &Decimal) -> Result<Bson> {
        let mantissa = value.mantissa();
        let coefficient = mantissa.unsigned_abs();
        let biased_exponent = (DECIMAL128_EXPONENT_BIAS - value.scale() as i32) as u128;

        let mut bits = coefficient | (biased_exponent << DECIMAL128_COEFFICIENT_BITS);
        if mantissa < 0 || value.is_sign_negative() {
            bits |= 1u128 << 127;
        }

        Ok(Bson::Decimal128(Decimal128::from_bytes(bits.to_le_bytes())))
    }

    fn decode(&self, value: &Bson) -> Result<Decimal> {
        let raw = match value {
            Bson::Decimal128(raw) => raw,
            other => {
                return Err(WorkloadError::Codec(format!(
                    "expected decimal128, found {:?}",
                    other.element_type()
                )))
            }
        };

        let bits = u128::from_le_bytes(raw.bytes());
        let negative = bits >> 127 == 1;

        // Combination field 11xxx: NaN, infinity or the large-coefficient form.
        if (bits >> 125) & 0b11 == 0b11 {
            return Err(WorkloadError::Codec(
                "decimal128 special values are not representable".to_string(),
            ));
        }

        let biased_exponent = ((bits >> DECIMAL128_COEFFICIENT_BITS) & 0x3FFF) as i32;
        let mut exponent = biased_exponent - DECIMAL128_EXPONENT_BIAS;
        let mut coefficient = bits & ((1u128 << DECIMAL128_COEFFICIENT_BITS) - 1);

        while exponent > 0 {
            coefficient = coefficient.checked_mul(10).ok_or_else(out_of_range)?;
            exponent -= 1;
        }
        while exponent < -DECIMAL_MAX_SCALE {
            if coefficient % 10 != 0 {
                return Err(out_of_range());
            }
            coefficient /= 10;
            exponent += 1;
        }

        let magnitude = i128::try_from(coefficient).map_err(|_| out_of_range())?;
        let signed = if negative { -magnitude } else { magnitude };

        let mut decimal = Decimal::try_from_i128_with_scale(signed, (-exponent) as u32)
            .map_err(|e| WorkloadError::Codec(e.to_string()))?;
        if negative && decimal.is_zero() {
            decimal.set_sign_negative(true);
        }
        Ok(decimal)
    }
}

fn out_of_range() -> WorkloadError {
    WorkloadError::Codec("decimal128 value is outside the supported decimal range".to_string())
}
