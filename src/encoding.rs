//! Symbol interning and canonical value encoding.
//!
//! The compiler never looks inside encoded bytes. It needs exactly two services from the
//! value-encoding layer, captured by the [`Encoding`] trait:
//!
//! - resolving a field name to a stable integer [`Symbol`], and
//! - serializing a constant [`Datum`] to its canonical byte form, which is what
//!   hash-membership tables are keyed on.
//!
//! [`SymbolTable`] is the reference implementation. It interns through `&self` (backed by
//! [`dashmap`]) so a single table can serve many programs compiled in parallel. Its
//! byte format is a compact type/length/payload encoding: strings that are already
//! interned are written as symbols, so the same constant may encode differently under
//! different tables. Encoding is a pure function of the datum and the table contents.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;

use crate::ssa::Datum;

/// An interned symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The interning and encoding service consumed by the compiler.
pub trait Encoding: Send + Sync {
    /// Returns the symbol for `name`, interning it if necessary.
    fn symbolize(&self, name: &str) -> Symbol;

    /// Returns the symbol for `name` if it is already interned.
    fn lookup(&self, name: &str) -> Option<Symbol>;

    /// Appends the canonical encoding of `datum` to `dst`.
    fn encode(&self, datum: &Datum, dst: &mut Vec<u8>);
}

// Type nibbles of the header byte.
const T_NULL: u8 = 0x0;
const T_BOOL: u8 = 0x1;
const T_UINT: u8 = 0x2;
const T_NINT: u8 = 0x3;
const T_FLOAT: u8 = 0x4;
const T_TIMESTAMP: u8 = 0x6;
const T_SYMBOL: u8 = 0x7;
const T_STRING: u8 = 0x8;
const T_LIST: u8 = 0xB;
const T_STRUCT: u8 = 0xD;

/// Length nibble announcing a varuint length after the header.
const L_VARLEN: u8 = 0xE;
/// Length nibble of the null value.
const L_NULL: u8 = 0xF;

/// First symbol handed out by a fresh table; lower ids are reserved.
const FIRST_SYMBOL: u32 = 10;

/// Thread-safe reference [`Encoding`] implementation.
///
/// # Examples
///
/// ```rust
/// use vexc::{Datum, Encoding, SymbolTable};
///
/// let table = SymbolTable::new();
/// let a = table.symbolize("price");
/// assert_eq!(table.symbolize("price"), a);
/// assert_eq!(table.resolve(a).as_deref(), Some("price"));
///
/// let mut bytes = Vec::new();
/// table.encode(&Datum::Int(1), &mut bytes);
/// assert_eq!(bytes, [0x21, 0x01]);
/// ```
#[derive(Debug)]
pub struct SymbolTable {
    ids: DashMap<String, Symbol>,
    names: DashMap<Symbol, String>,
    next: AtomicU32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            names: DashMap::new(),
            next: AtomicU32::new(FIRST_SYMBOL),
        }
    }

    /// Returns the name interned as `symbol`.
    #[must_use]
    pub fn resolve(&self, symbol: Symbol) -> Option<String> {
        self.names.get(&symbol).map(|name| name.value().clone())
    }

    /// Number of interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Decodes one complete value previously produced by [`Encoding::encode`].
    ///
    /// Returns `None` if the bytes are truncated, carry trailing data, or reference a
    /// symbol this table does not know.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Option<Datum> {
        let mut reader = Reader { bytes, pos: 0 };
        let datum = self.decode_from(&mut reader)?;
        (reader.pos == bytes.len()).then_some(datum)
    }

    fn decode_from(&self, r: &mut Reader<'_>) -> Option<Datum> {
        let header = r.byte()?;
        let (tag, len) = (header >> 4, header & 0x0f);
        if tag == T_NULL && len == L_NULL {
            return Some(Datum::Null);
        }
        if tag == T_BOOL {
            return Some(Datum::Bool(len != 0));
        }
        let len = if len == L_VARLEN {
            usize::try_from(r.varuint()?).ok()?
        } else {
            len as usize
        };
        let body = r.take(len)?;
        match tag {
            T_UINT => i64::try_from(be_uint(body)?).ok().map(Datum::Int),
            T_NINT => {
                let magnitude = be_uint(body)?;
                0i64.checked_sub_unsigned(magnitude).map(Datum::Int)
            }
            T_FLOAT => Some(Datum::Float(f64::from_be_bytes(body.try_into().ok()?))),
            T_TIMESTAMP => Some(Datum::Timestamp(i64::from_be_bytes(body.try_into().ok()?))),
            T_SYMBOL => {
                let id = u32::try_from(be_uint(body)?).ok()?;
                self.resolve(Symbol(id)).map(Datum::String)
            }
            T_STRING => String::from_utf8(body.to_vec()).ok().map(Datum::String),
            T_LIST => {
                let mut inner = Reader { bytes: body, pos: 0 };
                let mut items = Vec::new();
                while !inner.done() {
                    items.push(self.decode_from(&mut inner)?);
                }
                Some(Datum::List(items))
            }
            T_STRUCT => {
                let mut inner = Reader { bytes: body, pos: 0 };
                let mut fields = Vec::new();
                while !inner.done() {
                    let id = u32::try_from(inner.varuint()?).ok()?;
                    let name = self.resolve(Symbol(id))?;
                    fields.push((name, self.decode_from(&mut inner)?));
                }
                Some(Datum::Struct(fields))
            }
            _ => None,
        }
    }

    fn encode_into(&self, datum: &Datum, dst: &mut Vec<u8>) {
        match datum {
            Datum::Null => dst.push(T_NULL << 4 | L_NULL),
            Datum::Bool(b) => dst.push(T_BOOL << 4 | u8::from(*b)),
            Datum::Int(i) => write_int(dst, *i),
            // Integral floats take the integer form so numeric keys agree.
            Datum::Float(f) => match datum.as_exact_i64() {
                Some(i) => write_int(dst, i),
                None => {
                    write_header(dst, T_FLOAT, 8);
                    dst.extend_from_slice(&f.to_be_bytes());
                }
            },
            Datum::Timestamp(us) => {
                write_header(dst, T_TIMESTAMP, 8);
                dst.extend_from_slice(&us.to_be_bytes());
            }
            Datum::String(s) => match self.lookup(s) {
                Some(symbol) => write_symbol(dst, symbol),
                None => {
                    write_header(dst, T_STRING, s.len());
                    dst.extend_from_slice(s.as_bytes());
                }
            },
            Datum::List(items) => {
                let mut body = Vec::new();
                for item in items {
                    self.encode_into(item, &mut body);
                }
                write_header(dst, T_LIST, body.len());
                dst.extend_from_slice(&body);
            }
            Datum::Struct(fields) => {
                let mut body = Vec::new();
                for (name, value) in fields {
                    write_varuint(&mut body, u64::from(self.symbolize(name).0));
                    self.encode_into(value, &mut body);
                }
                write_header(dst, T_STRUCT, body.len());
                dst.extend_from_slice(&body);
            }
        }
    }
}

impl Encoding for SymbolTable {
    fn symbolize(&self, name: &str) -> Symbol {
        if let Some(symbol) = self.ids.get(name) {
            return *symbol;
        }
        *self.ids.entry(name.to_owned()).or_insert_with(|| {
            let symbol = Symbol(self.next.fetch_add(1, Ordering::Relaxed));
            self.names.insert(symbol, name.to_owned());
            symbol
        })
    }

    fn lookup(&self, name: &str) -> Option<Symbol> {
        self.ids.get(name).map(|symbol| *symbol)
    }

    fn encode(&self, datum: &Datum, dst: &mut Vec<u8>) {
        self.encode_into(datum, dst);
    }
}

fn write_header(dst: &mut Vec<u8>, tag: u8, len: usize) {
    if len < L_VARLEN as usize {
        dst.push(tag << 4 | len as u8);
    } else {
        dst.push(tag << 4 | L_VARLEN);
        write_varuint(dst, len as u64);
    }
}

fn write_int(dst: &mut Vec<u8>, i: i64) {
    let tag = if i < 0 { T_NINT } else { T_UINT };
    let bytes = i.unsigned_abs().to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    write_header(dst, tag, bytes.len() - skip);
    dst.extend_from_slice(&bytes[skip..]);
}

fn write_symbol(dst: &mut Vec<u8>, symbol: Symbol) {
    let bytes = symbol.0.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    write_header(dst, T_SYMBOL, bytes.len() - skip);
    dst.extend_from_slice(&bytes[skip..]);
}

fn be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b)))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn varuint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for _ in 0..10 {
            let b = self.byte()?;
            value = value << 7 | u64::from(b & 0x7f);
            if b & 0x80 != 0 {
                return Some(value);
            }
        }
        None
    }
}

/// Big-endian base-128 with the stop bit on the final byte.
fn write_varuint(dst: &mut Vec<u8>, mut value: u64) {
    let mut buf = [0u8; 10];
    let mut pos = buf.len() - 1;
    buf[pos] = 0x80 | (value & 0x7f) as u8;
    value >>= 7;
    while value != 0 {
        pos -= 1;
        buf[pos] = (value & 0x7f) as u8;
        value >>= 7;
    }
    dst.extend_from_slice(&buf[pos..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(table: &SymbolTable, datum: &Datum) -> Vec<u8> {
        let mut out = Vec::new();
        table.encode(datum, &mut out);
        out
    }

    #[test]
    fn test_interning_is_stable() {
        let table = SymbolTable::new();
        let a = table.symbolize("a");
        let b = table.symbolize("b");
        assert_ne!(a, b);
        assert_eq!(table.symbolize("a"), a);
        assert_eq!(table.lookup("b"), Some(b));
        assert_eq!(table.lookup("c"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_integers() {
        let table = SymbolTable::new();
        assert_eq!(encoded(&table, &Datum::Int(0)), [0x20]);
        assert_eq!(encoded(&table, &Datum::Int(-1)), [0x31, 0x01]);
        assert_eq!(encoded(&table, &Datum::Int(256)), [0x22, 0x01, 0x00]);
        assert_eq!(encoded(&table, &Datum::Int(i64::MIN)).len(), 9);
    }

    #[test]
    fn test_integral_float_encodes_as_int() {
        let table = SymbolTable::new();
        assert_eq!(
            encoded(&table, &Datum::Int(11)),
            encoded(&table, &Datum::Float(11.0))
        );
        assert_eq!(
            encoded(&table, &Datum::Int(-3)),
            encoded(&table, &Datum::Float(-3.0))
        );
        assert_ne!(
            encoded(&table, &Datum::Int(1)),
            encoded(&table, &Datum::Float(1.5))
        );
        assert_eq!(encoded(&table, &Datum::Float(1e300))[0] >> 4, T_FLOAT);
    }

    #[test]
    fn test_interned_strings_encode_as_symbols() {
        let table = SymbolTable::new();
        let plain = encoded(&table, &Datum::String("xyz".into()));
        assert_eq!(plain[0] >> 4, T_STRING);
        table.symbolize("xyz");
        let symbolic = encoded(&table, &Datum::String("xyz".into()));
        assert_eq!(symbolic[0] >> 4, T_SYMBOL);
    }

    #[test]
    fn test_long_string_uses_varlen() {
        let table = SymbolTable::new();
        let s = "x".repeat(200);
        let out = encoded(&table, &Datum::String(s));
        assert_eq!(out[0], T_STRING << 4 | L_VARLEN);
        // 200 = 0b1_1001000 -> [0x01, 0xc8]
        assert_eq!(&out[1..3], &[0x01, 0xc8]);
        assert_eq!(out.len(), 203);
    }

    #[test]
    fn test_decode_matches_encode() {
        let table = SymbolTable::new();
        table.symbolize("big");
        let value = Datum::Struct(vec![
            ("size".into(), Datum::String("big".into())),
            ("n".into(), Datum::Int(-300)),
            (
                "tags".into(),
                Datum::List(vec![Datum::Null, Datum::Bool(true), Datum::Float(2.5)]),
            ),
            ("at".into(), Datum::Timestamp(1_700_000_000_000_000)),
            ("text".into(), Datum::String("y".repeat(40))),
        ]);
        let bytes = encoded(&table, &value);
        assert_eq!(table.decode(&bytes), Some(value));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let table = SymbolTable::new();
        assert_eq!(table.decode(&[]), None);
        // truncated int
        assert_eq!(table.decode(&[0x22, 0x01]), None);
        // trailing byte
        assert_eq!(table.decode(&[0x20, 0x00]), None);
        // unknown symbol
        assert_eq!(table.decode(&[0x71, 0x63]), None);
        assert_eq!(table.decode(&[0x31, 0x01]), Some(Datum::Int(-1)));
    }

    #[test]
    fn test_concurrent_interning() {
        use rayon::prelude::*;

        let table = SymbolTable::new();
        let symbols: Vec<Symbol> = (0..64)
            .into_par_iter()
            .map(|i| table.symbolize(&format!("f{}", i % 8)))
            .collect();
        assert_eq!(table.len(), 8);
        for (i, symbol) in symbols.iter().enumerate() {
            assert_eq!(table.resolve(*symbol), Some(format!("f{}", i % 8)));
        }
    }
}
