//! A row-at-a-time reference interpreter for compiled programs.
//!
//! Each row is a struct constant. Every reachable node is evaluated once per row in
//! operand-first order, so the result of a program can be checked against the SQL
//! meaning of the expression it was compiled from. Only the operators the unit tests
//! exercise have semantics here; anything else panics.

use std::cmp::Ordering;

use crate::{
    encoding::{Encoding, SymbolTable},
    expr::CmpOp,
    ssa::{Datum, Immediate, Op, Opcode, Program, ValueId},
};

/// The value of one node on one lane.
#[derive(Debug, Clone, PartialEq)]
pub enum Lane {
    /// A mask or truth bit
    K(bool),
    /// Int register
    I(i64),
    /// Float register
    F(f64),
    /// String register
    S(String),
    /// Timestamp register, microseconds
    T(i64),
    /// Boxed value
    V(Datum),
    /// Encoded bytes of a hashed value
    H(Vec<u8>),
    /// Memory token
    Mem,
    /// The lane holds no value
    Off,
}

impl Lane {
    fn on(&self) -> bool {
        match self {
            Lane::K(b) => *b,
            Lane::Off => false,
            _ => true,
        }
    }

    fn f64(&self) -> Option<f64> {
        match self {
            Lane::F(x) => Some(*x),
            Lane::I(i) => Some(*i as f64),
            Lane::V(d) => d.as_f64(),
            _ => None,
        }
    }

    fn i64(&self) -> Option<i64> {
        match self {
            Lane::I(i) | Lane::T(i) => Some(*i),
            Lane::V(Datum::Int(i) | Datum::Timestamp(i)) => Some(*i),
            _ => None,
        }
    }

    fn str(&self) -> Option<&str> {
        match self {
            Lane::S(s) => Some(s),
            Lane::V(Datum::String(s)) => Some(s),
            _ => None,
        }
    }

    fn datum(&self) -> Option<&Datum> {
        match self {
            Lane::V(d) => Some(d),
            _ => None,
        }
    }
}

/// Builds a row from `(field, value)` pairs.
pub fn row(fields: &[(&str, Datum)]) -> Datum {
    Datum::Struct(
        fields
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect(),
    )
}

/// Runs a `ret.k` program over `rows` and returns the selected lanes.
pub fn eval_logical(program: &Program, symbols: &SymbolTable, rows: &[Datum]) -> Vec<bool> {
    rows.iter()
        .map(|r| evaluate(program, symbols, r).on())
        .collect()
}

/// Runs a `ret.v` program over `rows` and returns the value of each lane.
pub fn eval_value(program: &Program, symbols: &SymbolTable, rows: &[Datum]) -> Vec<Option<Datum>> {
    rows.iter()
        .map(|r| match evaluate(program, symbols, r) {
            Lane::V(d) => Some(d),
            Lane::Off => None,
            other => panic!("ret.v produced {other:?}"),
        })
        .collect()
}

fn evaluate(program: &Program, symbols: &SymbolTable, row: &Datum) -> Lane {
    let root = program.root().expect("program without root");
    let mut lanes: Vec<Option<Lane>> = vec![None; program.len()];
    for id in program.reachable() {
        let lane = node(program, symbols, row, id, &lanes);
        lanes[id.index()] = Some(lane);
    }
    lanes[root.index()].take().expect("root not evaluated")
}

fn node(program: &Program, symbols: &SymbolTable, row: &Datum, id: ValueId, lanes: &[Option<Lane>]) -> Lane {
    let operands: Vec<&Lane> = program
        .args(id)
        .iter()
        .map(|a| lanes[a.index()].as_ref().expect("operand evaluated after its user"))
        .collect();
    let arg = |i: usize| operands[i];
    let n = operands.len();
    let imm = program.imm(id);

    let opcode = match program.op(id) {
        Op::Init => return Lane::K(true),
        Op::False => return Lane::K(false),
        Op::Mem => return Lane::Mem,
        Op::Literal => return Lane::V(program.literal_value(id).cloned().unwrap_or(Datum::Null)),
        Op::Invalid => panic!("reachable invalid node {id}"),
        Op::Vk => return if arg(1).on() { arg(0).clone() } else { Lane::Off },
        Op::Machine(op) => op,
    };

    use Opcode::*;

    // boolean results over an invalid lane are FALSE, everything else is Off
    let unmasked = matches!(
        opcode,
        RetK | RetV | AndK | OrK | AndNotK | XorK | XnorK | MakeList | MakeStruct
    );
    if n > 0 && !unmasked && !arg(n - 1).on() {
        return if opcode.signature().ret == crate::ssa::SsaType::BOOL {
            Lane::K(false)
        } else {
            Lane::Off
        };
    }

    match opcode {
        RetK => Lane::K(arg(1).on()),
        RetV => {
            if arg(2).on() {
                arg(1).clone()
            } else {
                Lane::Off
            }
        }
        AndK => Lane::K(arg(0).on() && arg(1).on()),
        OrK => Lane::K(arg(0).on() || arg(1).on()),
        AndNotK => Lane::K(!arg(0).on() && arg(1).on()),
        XorK => Lane::K(arg(0).on() != arg(1).on()),
        XnorK => Lane::K(arg(0).on() == arg(1).on()),

        BroadcastF => Lane::F(float_imm(imm)),
        BroadcastI => Lane::I(int_imm(imm)),
        BroadcastTs => Lane::T(int_imm(imm)),

        NegF | AbsF | SignF | SqrtF | FloorF | CeilF | RoundF | Log2F | Log10F => {
            let x = arg(0).f64().expect("float operand");
            Lane::F(match opcode {
                NegF => -x,
                AbsF => x.abs(),
                SignF => x.signum(),
                SqrtF => x.sqrt(),
                FloorF => x.floor(),
                CeilF => x.ceil(),
                RoundF => x.round(),
                Log2F => x.log2(),
                _ => x.log10(),
            })
        }
        NegI | AbsI | NotI | SignI | BitCountI => {
            let i = arg(0).i64().expect("int operand");
            Lane::I(match opcode {
                NegI => i.wrapping_neg(),
                AbsI => i.wrapping_abs(),
                NotI => !i,
                SignI => i.signum(),
                _ => i64::from(i.count_ones()),
            })
        }

        AddF | SubF | MulF | DivF | ModF | MinF | MaxF | PowF | HypotF | Atan2F => {
            let (x, y) = (arg(0).f64().expect("float"), arg(1).f64().expect("float"));
            Lane::F(float_op(opcode, x, y))
        }
        AddImmF | SubImmF | MulImmF | DivImmF | ModImmF => {
            let x = arg(0).f64().expect("float");
            Lane::F(float_op(opcode, x, float_imm(imm)))
        }
        RsubImmF => Lane::F(float_imm(imm) - arg(0).f64().expect("float")),
        RdivImmF => Lane::F(float_imm(imm) / arg(0).f64().expect("float")),

        AddI | SubI | MulI | DivI | ModI | MinI | MaxI | AndI | OrI | XorI | SllI | SraI
        | SrlI => {
            let (x, y) = (arg(0).i64().expect("int"), arg(1).i64().expect("int"));
            int_op(opcode, x, y).map_or(Lane::Off, Lane::I)
        }
        AddImmI | SubImmI | MulImmI | DivImmI | ModImmI | AndImmI | OrImmI | XorImmI
        | SllImmI | SraImmI | SrlImmI => {
            let x = arg(0).i64().expect("int");
            int_op(opcode, x, int_imm(imm)).map_or(Lane::Off, Lane::I)
        }
        RsubImmI => Lane::I(int_imm(imm).wrapping_sub(arg(0).i64().expect("int"))),
        RdivImmI => int_imm(imm)
            .checked_div(arg(0).i64().expect("int"))
            .map_or(Lane::Off, Lane::I),

        CvtKToI => Lane::I(i64::from(arg(0).on())),
        CvtKToF => Lane::F(f64::from(u8::from(arg(0).on()))),
        CvtIToK => Lane::K(arg(0).i64().expect("int") != 0),
        CvtFToK => Lane::K(arg(0).f64().expect("float") != 0.0),
        CvtIToF => Lane::F(arg(0).i64().expect("int") as f64),
        CvtFToI => Lane::I(arg(0).f64().expect("float").round() as i64),
        CvtIToStr => Lane::S(arg(0).i64().expect("int").to_string()),
        CvtTsToI => Lane::I(arg(0).i64().expect("timestamp")),

        CmpEqF | CmpLtF | CmpLeF | CmpGtF | CmpGeF => {
            let ord = arg(0).f64().zip(arg(1).f64()).and_then(|(x, y)| x.partial_cmp(&y));
            Lane::K(holds(cmp_op(opcode), ord))
        }
        CmpEqImmF | CmpLtImmF | CmpLeImmF | CmpGtImmF | CmpGeImmF => {
            let ord = arg(0).f64().and_then(|x| x.partial_cmp(&float_imm(imm)));
            Lane::K(holds(cmp_op(opcode), ord))
        }
        CmpEqI | CmpLtI | CmpLeI | CmpGtI | CmpGeI => {
            let ord = arg(0).i64().zip(arg(1).i64()).map(|(x, y)| x.cmp(&y));
            Lane::K(holds(cmp_op(opcode), ord))
        }
        CmpEqImmI | CmpLtImmI | CmpLeImmI | CmpGtImmI | CmpGeImmI => {
            let ord = arg(0).i64().map(|x| x.cmp(&int_imm(imm)));
            Lane::K(holds(cmp_op(opcode), ord))
        }
        CmpEqStr | CmpLtStr | CmpLeStr | CmpGtStr | CmpGeStr => {
            let ord = arg(0).str().zip(arg(1).str()).map(|(x, y)| x.cmp(y));
            Lane::K(holds(cmp_op(opcode), ord))
        }
        CmpEqImmStr => Lane::K(arg(0).str() == Some(text_imm(imm))),
        CmpEqCiStr => Lane::K(arg(0).str().is_some_and(|s| s.eq_ignore_ascii_case(text_imm(imm)))),
        CmpEqUtf8CiStr => Lane::K(
            arg(0)
                .str()
                .is_some_and(|s| s.to_lowercase() == text_imm(imm).to_lowercase()),
        ),
        CmpV => match (arg(0).datum(), arg(1).datum()) {
            (Some(a), Some(b)) => datum_order(a, b).map_or(Lane::Off, |o| Lane::I(o as i64)),
            _ => Lane::Off,
        },
        CmpEqV => Lane::K(match (arg(0).datum(), arg(1).datum()) {
            (Some(a), Some(b)) => datum_eq(a, b),
            _ => false,
        }),
        CmpEqImmV => Lane::K(match (arg(0).datum(), imm) {
            (Some(a), Some(Immediate::Datum(b))) => datum_eq(a, b),
            _ => false,
        }),

        CheckTag => match (arg(0).datum(), imm) {
            (Some(d), Some(Immediate::Types(set))) if set.has(d.type_tag()) => arg(0).clone(),
            _ => Lane::Off,
        },
        IsNull => Lane::K(matches!(arg(0).datum(), Some(Datum::Null))),
        IsNotNull => Lane::K(matches!(arg(0).datum(), Some(d) if *d != Datum::Null)),
        IsTrue => Lane::K(matches!(arg(0).datum(), Some(Datum::Bool(true)))),
        IsFalse => Lane::K(matches!(arg(0).datum(), Some(Datum::Bool(false)))),

        Concat2 | Concat3 | Concat4 => {
            let mut out = String::new();
            for i in 0..n - 1 {
                out.push_str(arg(i).str().expect("string"));
            }
            Lane::S(out)
        }
        Lower => Lane::S(arg(0).str().expect("string").to_lowercase()),
        Upper => Lane::S(arg(0).str().expect("string").to_uppercase()),
        CharLength => Lane::I(arg(0).str().expect("string").chars().count() as i64),
        ContainsCs => Lane::K(arg(0).str().is_some_and(|s| s.contains(text_imm(imm)))),

        Unsymbolize => arg(0).clone(),
        UnboxF | UnboxCvtF => match arg(0).datum() {
            Some(Datum::Bool(b)) if opcode == UnboxCvtF => Lane::F(f64::from(u8::from(*b))),
            Some(d) => d.as_f64().map_or(Lane::Off, Lane::F),
            None => Lane::Off,
        },
        UnboxI | UnboxCvtI => match arg(0).datum() {
            Some(Datum::Bool(b)) if opcode == UnboxCvtI => Lane::I(i64::from(*b)),
            Some(d) => d.as_i64().map_or(Lane::Off, Lane::I),
            None => Lane::Off,
        },
        UnboxTs => match arg(0).datum() {
            Some(Datum::Timestamp(us)) => Lane::T(*us),
            _ => Lane::Off,
        },
        UnboxStr => arg(0).str().map_or(Lane::Off, |s| Lane::S(s.to_string())),
        BoxK => Lane::V(Datum::Bool(arg(0).on())),
        BoxI => Lane::V(Datum::Int(arg(0).i64().expect("int"))),
        BoxF => Lane::V(Datum::Float(arg(0).f64().expect("float"))),
        BoxStr => Lane::V(Datum::String(arg(0).str().expect("string").to_string())),
        BoxTs => Lane::V(Datum::Timestamp(arg(0).i64().expect("timestamp"))),

        BlendV | BlendF | BlendI | BlendStr => {
            if arg(2).on() {
                arg(1).clone()
            } else {
                arg(0).clone()
            }
        }

        FindSym => field(row, imm),
        FindSymIn => arg(0).datum().map_or(Lane::Off, |d| field(d, imm)),
        ListIndex => match (arg(0).datum(), imm) {
            (Some(Datum::List(items)), Some(Immediate::Int(i))) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i))
                .map_or(Lane::Off, |d| Lane::V(d.clone())),
            _ => Lane::Off,
        },
        MakeList => {
            let mut items = Vec::new();
            for pair in 0..n / 2 {
                if arg(pair * 2 + 1).on() {
                    items.push(arg(pair * 2).datum().cloned().expect("boxed item"));
                }
            }
            Lane::V(Datum::List(items))
        }

        HashValue => {
            let mut buf = Vec::new();
            symbols.encode(arg(0).datum().expect("boxed value"), &mut buf);
            Lane::H(buf)
        }
        HashMember => match (arg(0), imm) {
            (Lane::H(bytes), Some(Immediate::Table(table))) => Lane::K(table.contains(bytes)),
            _ => Lane::K(false),
        },
        HashLookup => match (arg(0), imm) {
            (Lane::H(bytes), Some(Immediate::Table(table))) => table
                .fetch(bytes)
                .and_then(|encoded| symbols.decode(encoded))
                .map_or(Lane::Off, Lane::V),
            _ => Lane::Off,
        },

        other => panic!("{other} has no reference semantics"),
    }
}

fn field(d: &Datum, imm: Option<&Immediate>) -> Lane {
    match (d, imm) {
        (Datum::Struct(fields), Some(Immediate::Field(f))) => fields
            .iter()
            .find(|(name, _)| *name == f.name)
            .map_or(Lane::Off, |(_, v)| Lane::V(v.clone())),
        _ => Lane::Off,
    }
}

fn datum_eq(a: &Datum, b: &Datum) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn datum_order(a: &Datum, b: &Datum) -> Option<Ordering> {
    match (a, b) {
        (Datum::String(x), Datum::String(y)) => Some(x.cmp(y)),
        (Datum::Timestamp(x), Datum::Timestamp(y)) => Some(x.cmp(y)),
        (Datum::Bool(x), Datum::Bool(y)) => Some(x.cmp(y)),
        _ => a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
    }
}

fn float_imm(imm: Option<&Immediate>) -> f64 {
    imm.and_then(Immediate::as_float).expect("float immediate")
}

fn int_imm(imm: Option<&Immediate>) -> i64 {
    imm.and_then(Immediate::as_int).expect("int immediate")
}

fn text_imm(imm: Option<&Immediate>) -> &str {
    match imm {
        Some(Immediate::Text(s)) => s,
        _ => panic!("text immediate expected"),
    }
}

fn cmp_op(op: Opcode) -> CmpOp {
    use Opcode::*;
    match op {
        CmpEqF | CmpEqImmF | CmpEqI | CmpEqImmI | CmpEqStr => CmpOp::Eq,
        CmpLtF | CmpLtImmF | CmpLtI | CmpLtImmI | CmpLtStr => CmpOp::Lt,
        CmpLeF | CmpLeImmF | CmpLeI | CmpLeImmI | CmpLeStr => CmpOp::Le,
        CmpGtF | CmpGtImmF | CmpGtI | CmpGtImmI | CmpGtStr => CmpOp::Gt,
        _ => CmpOp::Ge,
    }
}

fn holds(op: CmpOp, ord: Option<Ordering>) -> bool {
    let Some(ord) = ord else {
        return false;
    };
    match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    }
}

fn float_op(op: Opcode, x: f64, y: f64) -> f64 {
    use Opcode::*;
    match op {
        AddF | AddImmF => x + y,
        SubF | SubImmF => x - y,
        MulF | MulImmF => x * y,
        DivF | DivImmF => x / y,
        ModF | ModImmF => x % y,
        MinF => x.min(y),
        MaxF => x.max(y),
        PowF => x.powf(y),
        HypotF => x.hypot(y),
        _ => x.atan2(y),
    }
}

fn int_op(op: Opcode, x: i64, y: i64) -> Option<i64> {
    use Opcode::*;
    let shift = u32::try_from(y).ok();
    match op {
        AddI | AddImmI => Some(x.wrapping_add(y)),
        SubI | SubImmI => Some(x.wrapping_sub(y)),
        MulI | MulImmI => Some(x.wrapping_mul(y)),
        DivI | DivImmI => x.checked_div(y),
        ModI | ModImmI => x.checked_rem(y),
        MinI => Some(x.min(y)),
        MaxI => Some(x.max(y)),
        AndI | AndImmI => Some(x & y),
        OrI | OrImmI => Some(x | y),
        XorI | XorImmI => Some(x ^ y),
        SllI | SllImmI => shift.and_then(|s| x.checked_shl(s)),
        SraI | SraImmI => shift.and_then(|s| x.checked_shr(s)),
        _ => shift.and_then(|s| (x as u64).checked_shr(s)).map(|v| v as i64),
    }
}
