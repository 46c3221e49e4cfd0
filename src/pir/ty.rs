//! The PIR type lattice (spec §3, §4.A).
//!
//! A [`PirType`] is either a union of R-typed tags or a union of native
//! (compiler-internal) tags, plus an orthogonal flag set. Grounded in
//! `compiler/pir/type.h` from the source compiler: the `RType`/`NativeType`
//! enums and the `TypeFlags` bitset map directly onto [`RType`],
//! [`NativeType`] and [`TypeFlags`] below, and `PirType::isSuper`/`isA`,
//! the `|` union, and the named constants (`bottom`, `any`, `val`, `voyd`)
//! are a direct port of that file's semantics.

use crate::error::{Error, Result};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// A union of R-typed tags (the `t_.r` side of the source's `PirType`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RTypeSet: u32 {
        const NIL      = 1 << 0;
        const CONS     = 1 << 1;
        const SYM      = 1 << 2;
        const CHR      = 1 << 3;
        const LOGICAL  = 1 << 4;
        const INTEGER  = 1 << 5;
        const REAL     = 1 << 6;
        const STR      = 1 << 7;
        const VEC      = 1 << 8;
        const CPLX     = 1 << 9;
        const RAW      = 1 << 10;
        const CLOSURE  = 1 << 11;
        const PROM     = 1 << 12;
        const CODE     = 1 << 13;
        const ENV      = 1 << 14;
        const AST      = 1 << 15;
    }
}

bitflags! {
    /// A union of native (compiler-internal) tags (the `t_.n` side).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NativeTypeSet: u32 {
        const TEST        = 1 << 0;
        const CHECKPOINT  = 1 << 1;
        const FRAME_STATE = 1 << 2;
    }
}

bitflags! {
    /// Modifier flags, orthogonal to the tag set (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        const LAZY    = 1 << 0;
        const MISSING = 1 << 1;
        const SCALAR  = 1 << 2;
        /// Discriminates the R-type universe from the native-type universe.
        const RTYPE   = 1 << 3;
        /// Supplemented bit (not in spec.md's flag list): tracks the
        /// unboxed/boxed representation refinement named in §4.A. Kept out
        /// of the formal union/meet rules spec.md states for
        /// lazy/missing/is_scalar, but follows the same multiplicative
        /// (AND) rule as `is_scalar` under union, since a union can only be
        /// statically known unboxed if every operand is.
        const UNBOXED = 1 << 4;
    }
}

/// A single R-type tag, for ergonomic construction (`PirType::from(RType::Integer)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RType {
    Nil,
    Cons,
    Sym,
    Chr,
    Logical,
    Integer,
    Real,
    Str,
    Vec,
    Cplx,
    Raw,
    Closure,
    Prom,
    Code,
    Env,
    Ast,
}

impl RType {
    const ALL: [(RType, RTypeSet, &'static str); 16] = [
        (RType::Nil, RTypeSet::NIL, "nil"),
        (RType::Cons, RTypeSet::CONS, "cons"),
        (RType::Sym, RTypeSet::SYM, "sym"),
        (RType::Chr, RTypeSet::CHR, "char"),
        (RType::Logical, RTypeSet::LOGICAL, "lgl"),
        (RType::Integer, RTypeSet::INTEGER, "int"),
        (RType::Real, RTypeSet::REAL, "real"),
        (RType::Str, RTypeSet::STR, "str"),
        (RType::Vec, RTypeSet::VEC, "vec"),
        (RType::Cplx, RTypeSet::CPLX, "complex"),
        (RType::Raw, RTypeSet::RAW, "raw"),
        (RType::Closure, RTypeSet::CLOSURE, "cls"),
        (RType::Prom, RTypeSet::PROM, "prom"),
        (RType::Code, RTypeSet::CODE, "code"),
        (RType::Env, RTypeSet::ENV, "env"),
        (RType::Ast, RTypeSet::AST, "ast"),
    ];

    fn bit(self) -> RTypeSet {
        Self::ALL.iter().find(|(t, _, _)| *t == self).unwrap().1
    }
}

/// A single native tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Test,
    Checkpoint,
    FrameState,
}

impl NativeType {
    fn bit(self) -> NativeTypeSet {
        match self {
            NativeType::Test => NativeTypeSet::TEST,
            NativeType::Checkpoint => NativeTypeSet::CHECKPOINT,
            NativeType::FrameState => NativeTypeSet::FRAME_STATE,
        }
    }

    fn text(self) -> &'static str {
        match self {
            NativeType::Test => "t",
            NativeType::Checkpoint => "cp",
            NativeType::FrameState => "fs",
        }
    }
}

/// A PIR type: a union of tags from one universe, plus modifier flags.
///
/// Union (`|`) across universes is forbidden; use [`PirType::try_union`] at
/// any boundary where the two operands aren't already known to agree (e.g.
/// parsing untrusted text). Internal optimizer code, which only ever unions
/// types it derived itself from the same universe, uses the `|` operator
/// and treats a universe mismatch as the `InvariantViolation` it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PirType {
    flags: TypeFlags,
    tags: u32,
}

impl PirType {
    fn raw(flags: TypeFlags, tags: u32) -> Self {
        Self { flags, tags }
    }

    fn r(tags: RTypeSet) -> Self {
        Self::raw(TypeFlags::RTYPE, tags.bits())
    }

    fn n(tags: NativeTypeSet) -> Self {
        Self::raw(TypeFlags::empty(), tags.bits())
    }

    /// The empty R-type set: the bottom element of the lattice.
    pub fn bottom() -> Self {
        Self::r(RTypeSet::empty())
    }

    /// The empty native-type set.
    pub fn voyd() -> Self {
        Self::n(NativeTypeSet::empty())
    }

    /// All non-lazy, non-missing, user-observable R-type tags.
    pub fn val() -> Self {
        Self::r(RTypeSet::all())
    }

    /// `val()`, plus lazy and missing.
    pub fn any() -> Self {
        Self::val().or_lazy().or_missing()
    }

    /// Numeric R types.
    pub fn num() -> Self {
        Self::r(RTypeSet::LOGICAL | RTypeSet::INTEGER | RTypeSet::REAL | RTypeSet::CPLX)
    }

    /// Numeric types plus vectors/strings.
    pub fn vecs() -> Self {
        let num = Self::num();
        Self::r(RTypeSet::from_bits_truncate(num.tags) | RTypeSet::STR | RTypeSet::VEC)
    }

    /// Pair-list types (supplemented: `cons | nil`, see SPEC_FULL.md §3).
    pub fn list() -> Self {
        Self::r(RTypeSet::CONS | RTypeSet::NIL)
    }

    pub fn closure() -> Self {
        RType::Closure.into()
    }

    pub fn is_r_type(&self) -> bool {
        self.flags.contains(TypeFlags::RTYPE)
    }

    pub fn maybe_lazy(&self) -> bool {
        self.flags.contains(TypeFlags::LAZY)
    }

    pub fn maybe_missing(&self) -> bool {
        self.flags.contains(TypeFlags::MISSING)
    }

    pub fn is_scalar(&self) -> bool {
        self.flags.contains(TypeFlags::SCALAR)
    }

    pub fn is_unboxed(&self) -> bool {
        self.flags.contains(TypeFlags::UNBOXED)
    }

    fn r_tags(&self) -> RTypeSet {
        debug_assert!(self.is_r_type());
        RTypeSet::from_bits_truncate(self.tags)
    }

    fn n_tags(&self) -> NativeTypeSet {
        debug_assert!(!self.is_r_type());
        NativeTypeSet::from_bits_truncate(self.tags)
    }

    pub fn maybe(&self, t: RType) -> bool {
        self.is_r_type() && self.r_tags().contains(t.bit())
    }

    /// Whether this type's possible values could carry attributes/a class
    /// (i.e. behave as an "object" for S3/S4 dispatch purposes). Resolution
    /// of an Open Question: see DESIGN.md. Scalars of atomic-only tags can
    /// never be objects; anything touching a container/closure/env tag
    /// might be.
    pub fn maybe_obj(&self) -> bool {
        if !self.is_r_type() {
            return false;
        }
        const NEVER_OBJECT: RTypeSet = RTypeSet::NIL
            .union(RTypeSet::SYM)
            .union(RTypeSet::CHR)
            .union(RTypeSet::LOGICAL)
            .union(RTypeSet::INTEGER)
            .union(RTypeSet::REAL);
        !self.r_tags().difference(NEVER_OBJECT).is_empty()
    }

    /// Refine: require a scalar (length-1) value.
    pub fn scalar(&self) -> Self {
        let mut t = *self;
        t.flags |= TypeFlags::SCALAR;
        t
    }

    /// Refine: allow a promise-wrapped (not-yet-forced) value.
    pub fn or_lazy(&self) -> Self {
        let mut t = *self;
        t.flags |= TypeFlags::LAZY;
        t
    }

    /// Refine: allow the R "missing argument" marker.
    pub fn or_missing(&self) -> Self {
        let mut t = *self;
        t.flags |= TypeFlags::MISSING;
        t
    }

    /// Refine: drop tags that could carry attributes/a class.
    pub fn not_object(&self) -> Self {
        if !self.is_r_type() {
            return *self;
        }
        const NEVER_OBJECT: RTypeSet = RTypeSet::NIL
            .union(RTypeSet::SYM)
            .union(RTypeSet::CHR)
            .union(RTypeSet::LOGICAL)
            .union(RTypeSet::INTEGER)
            .union(RTypeSet::REAL);
        Self::raw(self.flags, (self.r_tags() & NEVER_OBJECT).bits())
    }

    /// Refine: mark as statically known to be unboxed.
    pub fn unboxed(&self) -> Self {
        let mut t = *self;
        t.flags |= TypeFlags::UNBOXED;
        t
    }

    /// Refine: mark as (possibly) boxed, i.e. clear the unboxed refinement.
    pub fn boxed(&self) -> Self {
        let mut t = *self;
        t.flags.remove(TypeFlags::UNBOXED);
        t
    }

    /// `a.isA(b)`: see spec §3 for the formal statement.
    pub fn is_a(&self, other: &PirType) -> bool {
        other.is_super(self)
    }

    fn is_super(&self, sub: &PirType) -> bool {
        if self.is_r_type() != sub.is_r_type() {
            return false;
        }
        if !self.is_r_type() {
            return self.n_tags().contains(sub.n_tags());
        }
        if (!self.maybe_lazy() && sub.maybe_lazy())
            || (!self.maybe_missing() && sub.maybe_missing())
            || (self.is_scalar() && !sub.is_scalar())
        {
            return false;
        }
        self.r_tags().contains(sub.r_tags())
    }

    /// Fallible union: `Err(TypeMismatch)` if the two sides are from
    /// different universes (R-type vs. native-type).
    pub fn try_union(&self, other: &PirType) -> Result<PirType> {
        if self.is_r_type() != other.is_r_type() {
            return Err(Error::type_mismatch(self, other));
        }
        let mut flags = self.flags | other.flags;
        if !(self.is_scalar() && other.is_scalar()) {
            flags.remove(TypeFlags::SCALAR);
        }
        if !(self.is_unboxed() && other.is_unboxed()) {
            flags.remove(TypeFlags::UNBOXED);
        }
        Ok(Self::raw(flags, self.tags | other.tags))
    }
}

impl std::ops::BitOr for PirType {
    type Output = PirType;

    /// Panics on a cross-universe union: internal callers only ever union
    /// types derived from the same universe, so a mismatch here is an
    /// `InvariantViolation`, not a recoverable error. Use [`PirType::try_union`]
    /// at boundaries where that isn't already guaranteed (e.g. the textual parser).
    fn bitor(self, rhs: PirType) -> PirType {
        self.try_union(&rhs)
            .expect("PirType union across universes is an invariant violation")
    }
}

impl From<RType> for PirType {
    fn from(t: RType) -> Self {
        PirType::r(t.bit())
    }
}

impl From<NativeType> for PirType {
    fn from(t: NativeType) -> Self {
        PirType::n(t.bit())
    }
}

impl fmt::Display for PirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_r_type() {
            let tags = self.n_tags();
            if tags.is_empty() {
                return write!(f, "void");
            }
            let names: Vec<&str> = NativeType::ALL_VARIANTS
                .iter()
                .filter(|t| tags.contains(t.bit()))
                .map(|t| t.text())
                .collect();
            if names.len() > 1 {
                write!(f, "({})", names.join("|"))
            } else {
                write!(f, "{}", names.join("|"))
            }
        } else {
            if *self == PirType::val() {
                write!(f, "val")?;
            } else {
                let tags = self.r_tags();
                let names: Vec<&str> = RType::ALL
                    .iter()
                    .filter(|(_, bit, _)| tags.contains(*bit))
                    .map(|(_, _, name)| *name)
                    .collect();
                if names.len() > 1 {
                    write!(f, "({})", names.join("|"))?;
                } else if names.is_empty() {
                    write!(f, "bottom")?;
                } else {
                    write!(f, "{}", names.join("|"))?;
                }
            }
            if self.is_scalar() {
                write!(f, "$")?;
            }
            if self.is_unboxed() {
                write!(f, "#")?;
            }
            if self.maybe_lazy() {
                write!(f, "^")?;
            }
            if self.maybe_missing() {
                write!(f, "?")?;
            }
            Ok(())
        }
    }
}

impl NativeType {
    const ALL_VARIANTS: [NativeType; 3] =
        [NativeType::Test, NativeType::Checkpoint, NativeType::FrameState];
}

/// Parse the textual `PirType` grammar from spec §4.A, e.g. `"int|real$^?"`.
///
/// Grammar: `tags ('|' tags)* modifiers?` where `modifiers` is any of `$`
/// (scalar), `#` (unboxed, supplemented), `^` (lazy), `?` (missing), and
/// `tags` is one of the fixed tag spellings or the aliases `val`, `any`,
/// `num`, `vecs`, `void`, `list`.
pub fn parse(input: &str) -> Result<PirType> {
    let mut chars = input.trim();
    let mut flags = TypeFlags::empty();
    while let Some(last) = chars.chars().last() {
        match last {
            '$' => flags |= TypeFlags::SCALAR,
            '#' => flags |= TypeFlags::UNBOXED,
            '^' => flags |= TypeFlags::LAZY,
            '?' => flags |= TypeFlags::MISSING,
            _ => break,
        }
        chars = &chars[..chars.len() - 1];
    }

    if chars.is_empty() {
        return Err(Error::ParseError("empty PirType".into()));
    }

    let mut ty: Option<PirType> = None;
    for tok in chars.split('|') {
        let tok = tok.trim();
        let piece = match tok {
            "val" => PirType::val(),
            "any" => PirType::any(),
            "num" => PirType::num(),
            "vecs" => PirType::vecs(),
            "void" => PirType::voyd(),
            "list" => PirType::list(),
            _ => parse_single_tag(tok)?,
        };
        ty = Some(match ty {
            None => piece,
            Some(acc) => acc
                .try_union(&piece)
                .map_err(|_| Error::ParseError(format!("mixed-universe type expression '{input}'")))?,
        });
    }

    let mut ty = ty.ok_or_else(|| Error::ParseError(format!("empty type expression '{input}'")))?;
    ty.flags |= flags;
    Ok(ty)
}

fn parse_single_tag(tok: &str) -> Result<PirType> {
    for (variant, _, name) in RType::ALL {
        if name == tok {
            return Ok(variant.into());
        }
    }
    for variant in NativeType::ALL_VARIANTS {
        if variant.text() == tok {
            return Ok(variant.into());
        }
    }
    Err(Error::ParseError(format!("unknown PirType tag '{tok}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_laws() {
        let a = PirType::from(RType::Integer);
        let b = PirType::from(RType::Real);
        let c = PirType::from(RType::Str);

        assert_eq!(a | a, a);
        assert_eq!(a | b, b | a);
        assert_eq!((a | b) | c, a | (b | c));
        assert_eq!(PirType::bottom() | a, a);
        assert!(a.is_a(&a));

        let wide = a | b | c;
        assert!(a.is_a(&wide));
        assert!(wide.is_a(&PirType::val()));
    }

    #[test]
    fn is_a_respects_lazy_missing_scalar() {
        let strict = PirType::from(RType::Integer).scalar();
        let lazy = PirType::from(RType::Integer).or_lazy();
        let scalar_lazy = strict.or_lazy();

        // A concrete (non-lazy, scalar) value conforms to a looser type
        // that merely *allows* laziness or drops the scalar requirement.
        assert!(strict.is_a(&lazy));
        assert!(strict.is_a(&scalar_lazy));
        // The reverse does not hold: a type that allows laziness is not a
        // (non-lazy) strict type.
        assert!(!lazy.is_a(&strict));
        assert!(!scalar_lazy.is_a(&strict));

        assert!(strict.is_a(&PirType::from(RType::Integer)));
        assert!(!PirType::from(RType::Integer).is_a(&strict));
    }

    #[test]
    fn union_preserves_scalar_only_if_both_scalar() {
        let scalar = PirType::from(RType::Integer).scalar();
        let not_scalar = PirType::from(RType::Real);
        let u = scalar.try_union(&not_scalar).unwrap();
        assert!(!u.is_scalar());
        assert!((scalar | scalar).is_scalar());
    }

    #[test]
    fn union_across_universes_is_an_error() {
        let r = PirType::from(RType::Integer);
        let n = PirType::from(NativeType::Test);
        assert!(r.try_union(&n).is_err());
    }

    #[test]
    fn parses_textual_type() {
        let t = parse("int|real$^?").unwrap();
        assert!(t.maybe(RType::Integer));
        assert!(t.maybe(RType::Real));
        assert!(t.is_scalar());
        assert!(t.maybe_lazy());
        assert!(t.maybe_missing());
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(parse("any").unwrap(), PirType::any());
        assert_eq!(parse("val").unwrap(), PirType::val());
        assert_eq!(parse("void").unwrap(), PirType::voyd());
    }

    #[test]
    fn not_object_drops_container_tags() {
        let t = (PirType::from(RType::Integer) | RType::Vec.into()).not_object();
        assert!(t.maybe(RType::Integer));
        assert!(!t.maybe(RType::Vec));
    }
}
