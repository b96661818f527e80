use std::fmt;

/// A single numeric attribute component as handed over by an attribute accessor.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
}

impl Scalar {
    /// Widen to `f64` (booleans map to `0.0`/`1.0`).
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(b)),
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    pub(crate) fn type_name(self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

/// Raw attribute value: a scalar or a fixed-size ordered sequence of scalars.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// One component.
    Scalar(Scalar),
    /// Several components in declaration order (vectors, colors, matrices flattened row by row).
    Seq(Vec<Scalar>),
}

impl AttrValue {
    /// Number of components carried by this value.
    pub fn arity(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Seq(v) => v.len(),
        }
    }

    /// Components as a slice (a scalar is a one-element slice).
    pub fn components(&self) -> &[Scalar] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::Seq(v) => v,
        }
    }

    /// Build a float sequence value.
    pub fn floats<const N: usize>(v: [f64; N]) -> Self {
        Self::Seq(v.into_iter().map(Scalar::Float).collect())
    }
}

macro_rules! scalar_attr_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AttrValue {
                fn from(v: $t) -> Self {
                    Self::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

scalar_attr_from!(bool, i64, i32, u32, f64, f32);

impl From<Scalar> for AttrValue {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<Scalar>> for AttrValue {
    fn from(v: Vec<Scalar>) -> Self {
        Self::Seq(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn one(f: &mut fmt::Formatter<'_>, s: &Scalar) -> fmt::Result {
            match s {
                Scalar::Bool(b) => write!(f, "{b}"),
                Scalar::Int(i) => write!(f, "{i}"),
                Scalar::Float(x) => write!(f, "{x}"),
            }
        }
        match self {
            Self::Scalar(s) => one(f, s),
            Self::Seq(v) => {
                f.write_str("(")?;
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    one(f, s)?;
                }
                f.write_str(")")
            }
        }
    }
}
