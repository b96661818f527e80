use crate::foundation::error::{VtxError, VtxResult};
use crate::format::value::{AttrValue, Scalar};
use smallvec::SmallVec;
use std::fmt;

/// Byte order selected by the optional leading character of a format string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// `<`, and the default when no prefix is given.
    Little,
    /// `>` and `!`.
    Big,
}

impl ByteOrder {
    /// Byte order of the build target (`@` and `=`).
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// One primitive type character of a struct-pack format string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `x`: zero pad byte, consumes no value.
    Pad,
    /// `?`
    Bool,
    /// `b`
    I8,
    /// `B`
    U8,
    /// `h`
    I16,
    /// `H`
    U16,
    /// `i` and `l`
    I32,
    /// `I` and `L`
    U32,
    /// `q`
    I64,
    /// `Q`
    U64,
    /// `f`
    F32,
    /// `d`
    F64,
}

impl Primitive {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'x' => Self::Pad,
            '?' => Self::Bool,
            'b' => Self::I8,
            'B' => Self::U8,
            'h' => Self::I16,
            'H' => Self::U16,
            'i' | 'l' => Self::I32,
            'I' | 'L' => Self::U32,
            'q' => Self::I64,
            'Q' => Self::U64,
            'f' => Self::F32,
            'd' => Self::F64,
            _ => return None,
        })
    }

    /// Standard size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Pad | Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn consumes_value(self) -> bool {
        !matches!(self, Self::Pad)
    }
}

/// A primitive with its repeat count (`3f` is `{ F32, 3 }`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatItem {
    /// Primitive type.
    pub prim: Primitive,
    /// Repeat count.
    pub count: usize,
}

/// A compiled C-struct-pack style binary format.
///
/// Grammar: an optional byte-order character (`@ = < > !`) followed by items, each an optional
/// decimal repeat count and one primitive character. Whitespace between items is ignored. Sizes
/// are always the standard sizes and no alignment padding is inserted, so the layout is identical
/// on every platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BinaryFormat {
    source: String,
    order: ByteOrder,
    items: SmallVec<[FormatItem; 2]>,
    byte_size: usize,
    arity: usize,
}

impl BinaryFormat {
    /// Parse a format string.
    pub fn parse(source: &str) -> VtxResult<Self> {
        let mut chars = source.chars().peekable();
        let order = match chars.peek() {
            Some('<') => Some(ByteOrder::Little),
            Some('>') | Some('!') => Some(ByteOrder::Big),
            Some('@') | Some('=') => Some(ByteOrder::native()),
            _ => None,
        };
        if order.is_some() {
            chars.next();
        }

        let mut items = SmallVec::<[FormatItem; 2]>::new();
        let mut byte_size = 0usize;
        let mut arity = 0usize;
        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                continue;
            }

            let mut count: Option<usize> = None;
            let mut c = c;
            while let Some(d) = c.to_digit(10) {
                let next = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(d as usize))
                    .ok_or_else(|| {
                        VtxError::invalid_format(format!("repeat count overflow in '{source}'"))
                    })?;
                count = Some(next);
                c = chars.next().ok_or_else(|| {
                    VtxError::invalid_format(format!(
                        "repeat count without format character in '{source}'"
                    ))
                })?;
            }

            let prim = Primitive::from_char(c).ok_or_else(|| {
                VtxError::invalid_format(format!("bad character '{c}' in format '{source}'"))
            })?;
            let count = count.unwrap_or(1);
            let item_size = prim.size().checked_mul(count).ok_or_else(|| {
                VtxError::invalid_format(format!("format '{source}' is too large"))
            })?;
            byte_size = byte_size.checked_add(item_size).ok_or_else(|| {
                VtxError::invalid_format(format!("format '{source}' is too large"))
            })?;
            if prim.consumes_value() {
                arity += count;
            }
            items.push(FormatItem { prim, count });
        }

        if byte_size == 0 {
            return Err(VtxError::invalid_format(format!(
                "format '{source}' has zero size"
            )));
        }

        Ok(Self {
            source: source.to_string(),
            order: order.unwrap_or(ByteOrder::Little),
            items,
            byte_size,
            arity,
        })
    }

    /// The format string this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Byte order used for multi-byte primitives.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Parsed items in declaration order.
    pub fn items(&self) -> &[FormatItem] {
        &self.items
    }

    /// Total encoded size in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Number of value components consumed by one encode (pad bytes excluded).
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Encode `value` into `out`, which must be exactly [`Self::byte_size`] bytes long.
    ///
    /// A single-component format accepts a scalar or a one-element sequence; any other format
    /// requires a sequence whose length equals [`Self::arity`].
    pub fn encode_into(&self, value: &AttrValue, out: &mut [u8]) -> VtxResult<()> {
        if out.len() != self.byte_size {
            return Err(VtxError::encoding_mismatch(format!(
                "format '{}' encodes {} bytes, destination has {}",
                self.source,
                self.byte_size,
                out.len()
            )));
        }
        if self.arity != 1 && matches!(value, AttrValue::Scalar(_)) {
            return Err(VtxError::encoding_mismatch(format!(
                "format '{}' expects {} values, got a scalar",
                self.source, self.arity
            )));
        }
        let components = value.components();
        if components.len() != self.arity {
            return Err(VtxError::encoding_mismatch(format!(
                "format '{}' expects {} values, got {}",
                self.source,
                self.arity,
                components.len()
            )));
        }

        let mut values = components.iter().copied();
        let mut pos = 0usize;
        for item in &self.items {
            let size = item.prim.size();
            for _ in 0..item.count {
                let dst = &mut out[pos..pos + size];
                if item.prim.consumes_value() {
                    let v = values.next().ok_or_else(|| {
                        VtxError::encoding_mismatch(format!(
                            "format '{}' ran out of values",
                            self.source
                        ))
                    })?;
                    write_scalar(item.prim, self.order, v, dst, &self.source)?;
                } else {
                    dst.fill(0);
                }
                pos += size;
            }
        }
        Ok(())
    }

    /// Encode `value` into a freshly allocated byte vector.
    pub fn encode(&self, value: &AttrValue) -> VtxResult<Vec<u8>> {
        let mut out = vec![0u8; self.byte_size];
        self.encode_into(value, &mut out)?;
        Ok(out)
    }
}

impl TryFrom<String> for BinaryFormat {
    type Error = VtxError;

    fn try_from(s: String) -> VtxResult<Self> {
        Self::parse(&s)
    }
}

impl From<BinaryFormat> for String {
    fn from(f: BinaryFormat) -> Self {
        f.source
    }
}

impl std::str::FromStr for BinaryFormat {
    type Err = VtxError;

    fn from_str(s: &str) -> VtxResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

macro_rules! put {
    ($dst:expr, $order:expr, $v:expr) => {{
        let bytes = match $order {
            ByteOrder::Little => $v.to_le_bytes(),
            ByteOrder::Big => $v.to_be_bytes(),
        };
        $dst.copy_from_slice(&bytes);
    }};
}

fn write_scalar(
    prim: Primitive,
    order: ByteOrder,
    v: Scalar,
    dst: &mut [u8],
    source: &str,
) -> VtxResult<()> {
    match prim {
        Primitive::Pad => dst.fill(0),
        Primitive::Bool => {
            let b = match v {
                Scalar::Bool(b) => b,
                Scalar::Int(i) => i != 0,
                Scalar::Float(f) => f != 0.0,
            };
            dst[0] = u8::from(b);
        }
        Primitive::I8 => put!(dst, order, int_as::<i8>(v, prim, source)?),
        Primitive::U8 => put!(dst, order, int_as::<u8>(v, prim, source)?),
        Primitive::I16 => put!(dst, order, int_as::<i16>(v, prim, source)?),
        Primitive::U16 => put!(dst, order, int_as::<u16>(v, prim, source)?),
        Primitive::I32 => put!(dst, order, int_as::<i32>(v, prim, source)?),
        Primitive::U32 => put!(dst, order, int_as::<u32>(v, prim, source)?),
        Primitive::I64 => put!(dst, order, int_as::<i64>(v, prim, source)?),
        Primitive::U64 => put!(dst, order, int_as::<u64>(v, prim, source)?),
        Primitive::F32 => put!(dst, order, (v.as_f64() as f32)),
        Primitive::F64 => put!(dst, order, v.as_f64()),
    }
    Ok(())
}

fn int_as<T: TryFrom<i64>>(v: Scalar, prim: Primitive, source: &str) -> VtxResult<T> {
    let i = match v {
        Scalar::Bool(b) => i64::from(b),
        Scalar::Int(i) => i,
        Scalar::Float(_) => {
            return Err(VtxError::encoding_mismatch(format!(
                "format '{source}' needs an integer for {prim:?}, got {}",
                v.type_name()
            )));
        }
    };
    T::try_from(i).map_err(|_| {
        VtxError::encoding_mismatch(format!(
            "value {i} is out of range for {prim:?} in format '{source}'"
        ))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/format/binary.rs"]
mod tests;
