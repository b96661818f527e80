use crate::foundation::error::{VtxError, VtxResult};
use crate::format::value::{AttrValue, Scalar};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a value converter applied between retrieval and encoding.
pub type ConvertFn = dyn Fn(AttrValue) -> VtxResult<AttrValue> + Send + Sync;

/// A named value converter.
///
/// Converters are compared by name: two layouts built from the same registry entries compare
/// equal.
#[derive(Clone)]
pub struct Converter {
    name: Arc<str>,
    func: Arc<ConvertFn>,
}

impl Converter {
    /// Wrap a closure under `name`.
    pub fn new(
        name: impl Into<Arc<str>>,
        func: impl Fn(AttrValue) -> VtxResult<AttrValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the conversion.
    pub fn apply(&self, value: AttrValue) -> VtxResult<AttrValue> {
        (self.func)(value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.name).finish()
    }
}

impl PartialEq for Converter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Name → converter lookup used when resolving vertex format files.
#[derive(Clone, Debug, Default)]
pub struct ConverterRegistry {
    entries: BTreeMap<String, Converter>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in converters.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.insert(Converter::new("identity", |v| Ok(v)));
        r.insert(Converter::new("negate", negate));
        r.insert(Converter::new("flip_v", flip_v));
        r.insert(Converter::new("xzy", xzy));
        r.insert(Converter::new("unorm8", unorm8));
        r.insert(Converter::new("rgb_to_rgba", rgb_to_rgba));
        r
    }

    /// Register (or replace) a converter.
    pub fn insert(&mut self, converter: Converter) {
        self.entries.insert(converter.name().to_string(), converter);
    }

    /// Register a closure under `name`.
    pub fn register(
        &mut self,
        name: &str,
        func: impl Fn(AttrValue) -> VtxResult<AttrValue> + Send + Sync + 'static,
    ) {
        self.insert(Converter::new(name, func));
    }

    /// Look up a converter by name.
    pub fn get(&self, name: &str) -> VtxResult<Converter> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| VtxError::validation(format!("unknown converter '{name}'")))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn expect_len(name: &str, value: &AttrValue, len: usize) -> VtxResult<()> {
    if value.arity() != len {
        return Err(VtxError::encoding_mismatch(format!(
            "converter '{name}' expects {len} components, got {}",
            value.arity()
        )));
    }
    Ok(())
}

fn map_components(
    value: AttrValue,
    f: impl Fn(Scalar) -> VtxResult<Scalar>,
) -> VtxResult<AttrValue> {
    match value {
        AttrValue::Scalar(s) => Ok(AttrValue::Scalar(f(s)?)),
        AttrValue::Seq(v) => Ok(AttrValue::Seq(
            v.into_iter().map(f).collect::<VtxResult<Vec<_>>>()?,
        )),
    }
}

fn negate(value: AttrValue) -> VtxResult<AttrValue> {
    map_components(value, |s| match s {
        Scalar::Int(i) => i
            .checked_neg()
            .map(Scalar::Int)
            .ok_or_else(|| VtxError::encoding_mismatch(format!("cannot negate {i}"))),
        Scalar::Float(f) => Ok(Scalar::Float(-f)),
        Scalar::Bool(_) => Err(VtxError::encoding_mismatch(
            "converter 'negate' does not accept booleans",
        )),
    })
}

fn flip_v(value: AttrValue) -> VtxResult<AttrValue> {
    expect_len("flip_v", &value, 2)?;
    let c = value.components();
    Ok(AttrValue::Seq(vec![
        c[0],
        Scalar::Float(1.0 - c[1].as_f64()),
    ]))
}

fn xzy(value: AttrValue) -> VtxResult<AttrValue> {
    expect_len("xzy", &value, 3)?;
    let c = value.components();
    Ok(AttrValue::Seq(vec![c[0], c[2], c[1]]))
}

fn unorm8(value: AttrValue) -> VtxResult<AttrValue> {
    map_components(value, |s| {
        let v = (s.as_f64().clamp(0.0, 1.0) * 255.0).round() as i64;
        Ok(Scalar::Int(v))
    })
}

fn rgb_to_rgba(value: AttrValue) -> VtxResult<AttrValue> {
    match value.arity() {
        4 => Ok(value),
        3 => {
            let mut v = value.components().to_vec();
            v.push(Scalar::Float(1.0));
            Ok(AttrValue::Seq(v))
        }
        n => Err(VtxError::encoding_mismatch(format!(
            "converter 'rgb_to_rgba' expects 3 or 4 components, got {n}"
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layout/convert.rs"]
mod tests;
