//! Float fields that survive JSON when they are not finite.
//!
//! Finite values are written as plain numbers. JSON has no number for NaN or the infinities, so
//! those are written as the strings `"NaN"`, `"inf"` and `"-inf"` and read back as themselves.
//! Use through `#[serde(with = "...")]`.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy)]
struct Float(f32);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.is_finite() {
            serializer.serialize_f32(value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f32),
    Named(String),
}

impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Float(value)),
            Repr::Named(name) => match name.as_str() {
                "NaN" => Ok(Float(f32::NAN)),
                "inf" => Ok(Float(f32::INFINITY)),
                "-inf" => Ok(Float(f32::NEG_INFINITY)),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &r#"a number, "NaN", "inf" or "-inf""#,
                )),
            },
        }
    }
}

struct Floats<'a>(&'a [f32]);

impl Serialize for Floats<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|value| Float(*value)))
    }
}

fn fixed<E: de::Error, const N: usize>(values: Vec<Float>) -> Result<[f32; N], E> {
    let len = values.len();
    let values: Vec<f32> = values.into_iter().map(|value| value.0).collect();
    values
        .try_into()
        .map_err(|_| E::invalid_length(len, &"a fixed-length float array"))
}

pub mod scalar {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        Float(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Float::deserialize(deserializer)?.0)
    }
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<f32>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(Float).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f32>, D::Error> {
        Ok(Option::<Float>::deserialize(deserializer)?.map(|value| value.0))
    }
}

pub mod array {
    use super::*;

    pub fn serialize<S: Serializer, const N: usize>(
        values: &[f32; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        Floats(values).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[f32; N], D::Error> {
        fixed(Vec::<Float>::deserialize(deserializer)?)
    }
}

pub mod option_array {
    use super::*;

    pub fn serialize<S: Serializer, const N: usize>(
        values: &Option<[f32; N]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match values {
            Some(values) => serializer.serialize_some(&Floats(values)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<Option<[f32; N]>, D::Error> {
        Option::<Vec<Float>>::deserialize(deserializer)?
            .map(fixed)
            .transpose()
    }
}

/// A list of 2D points.
pub mod points {
    use super::*;

    pub fn serialize<S: Serializer>(points: &[[f32; 2]], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(points.iter().map(|point| Floats(point)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<[f32; 2]>, D::Error> {
        Vec::<Vec<Float>>::deserialize(deserializer)?
            .into_iter()
            .map(fixed)
            .collect()
    }
}
