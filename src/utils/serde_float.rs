//! Serde adapters for float arrays that may hold NaN or infinities.
//!
//! JSON has no literal for non-finite numbers, and `serde_json` would write them
//! as `null`. These adapters write `"NaN"`, `"inf"` and `"-inf"` instead, so a
//! model whose parameters have degraded still round-trips. Finite values stay
//! plain JSON numbers.
//!
//! ```text
//! { "dim": [2, 2], "data": [0.5, "inf", -0.25, "NaN"] }
//! ```

use ndarray::{Array1, Array2};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

struct Float(f64);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

struct FloatVisitor;

impl<'de> Visitor<'de> for FloatVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        match v {
            "NaN" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FloatVisitor).map(Float)
    }
}

#[derive(Serialize, Deserialize)]
struct Encoded<D> {
    dim: D,
    data: Vec<Float>,
}

/// `#[serde(with = "...")]` adapter for `Array2<f64>`.
pub mod array2 {
    use super::*;

    pub fn serialize<S: Serializer>(array: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        Encoded {
            dim: [array.nrows(), array.ncols()],
            data: array.iter().map(|&v| Float(v)).collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
        let encoded = Encoded::<[usize; 2]>::deserialize(deserializer)?;
        let data = encoded.data.into_iter().map(|f| f.0).collect();
        Array2::from_shape_vec((encoded.dim[0], encoded.dim[1]), data).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "...")]` adapter for `Array1<f64>`.
pub mod array1 {
    use super::*;

    pub fn serialize<S: Serializer>(array: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        Encoded {
            dim: [array.len()],
            data: array.iter().map(|&v| Float(v)).collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array1<f64>, D::Error> {
        let encoded = Encoded::<[usize; 1]>::deserialize(deserializer)?;
        let data: Vec<f64> = encoded.data.into_iter().map(|f| f.0).collect();
        if data.len() != encoded.dim[0] {
            return Err(de::Error::custom(format!(
                "expected {} values, got {}",
                encoded.dim[0],
                data.len()
            )));
        }
        Ok(Array1::from_vec(data))
    }
}
