//! String and function interning for efficient storage of literals and identifiers.
//!
//! The interner stores unique strings in a vector and returns `StringId`
//! indices for cheap storage and comparison across the AST, the environment
//! binding maps, and property keys. It is populated while building the typed
//! AST and is immutable during execution: lookups at runtime happen only for
//! property access, identifier resolution and error messages, so the table is
//! safe for concurrent reads.
//!
//! StringIds are laid out as follows:
//! * 0 to 128 - single character strings for all 128 ASCII characters
//! * 1000 to 1000+count(StaticStrings) - well-known engine strings
//! * 10_000+ - strings interned per script

use std::{str::FromStr, sync::LazyLock};

use ahash::AHashMap;
use strum::{EnumCount, EnumString, FromRepr, IntoStaticStr};

use crate::ast::FunctionDef;

/// Index into the string interner's storage.
///
/// Uses `u32` to save space. This limits us to ~4 billion unique interns,
/// which is more than sufficient for a single script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct StringId(u32);

impl StringId {
    /// Returns the StringId for an ASCII byte.
    #[must_use]
    pub fn from_ascii(byte: u8) -> Self {
        Self(u32::from(byte))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// StringId offsets
const STATIC_STRING_ID_OFFSET: u32 = 1000;
const INTERN_STRING_ID_OFFSET: usize = 10_000;

/// Static strings for all 128 ASCII characters, built once on first access.
///
/// Uses `LazyLock` to build the array at runtime (once), leaking the strings
/// to get `'static` lifetime. The leak is intentional and bounded (128
/// single-byte strings).
static ASCII_STRS: LazyLock<[&'static str; 128]> = LazyLock::new(|| {
    std::array::from_fn(|i| {
        let s = char::from(u8::try_from(i).expect("index out of u8 range")).to_string();
        &*Box::leak(s.into_boxed_str())
    })
});

/// Engine strings which are known at compile time and don't need to be interned.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, FromRepr, EnumString, EnumCount, IntoStaticStr, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum StaticStrings {
    #[strum(serialize = "")]
    EmptyString,
    #[strum(serialize = "<script>")]
    Script,
    #[strum(serialize = "<anonymous>")]
    Anonymous,

    // ==========================
    // Object protocol keys
    Prototype,
    Constructor,
    Length,
    Name,
    Message,
    Stack,
    ToString,
    ValueOf,
    HasOwnProperty,
    // property descriptor fields for defineProperty
    Value,
    Writable,
    Enumerable,
    Configurable,
    Get,
    Set,

    // ==========================
    // Iteration protocol keys
    Next,
    Done,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "throw")]
    Throw,

    // ==========================
    // Promise protocol keys
    Then,
    Catch,
    Finally,
    Resolve,
    Reject,

    // ==========================
    // Function/call keys
    Call,
    Apply,
    Bind,
    #[strum(serialize = "arguments")]
    Arguments,
    #[strum(serialize = "eval")]
    Eval,
    Callee,

    // ==========================
    // Array / string methods
    Push,
    Pop,
    Shift,
    Slice,
    Join,
    IndexOf,
    Includes,
    ForEach,
    Map,
    Filter,
    Concat,
    Keys,
    Values,
    Entries,
    CharAt,
    CharCodeAt,
    ToUpperCase,
    ToLowerCase,
    Split,
    Trim,
    Repeat,
    StartsWith,
    EndsWith,

    // ==========================
    // Object namespace methods
    Freeze,
    IsFrozen,
    GetPrototypeOf,
    DefineProperty,
    GetOwnPropertyNames,
    Create,
    Assign,
    IsArray,
    Of,

    // ==========================
    // Math members
    Floor,
    Ceil,
    Round,
    Abs,
    Max,
    Min,
    Pow,
    Sqrt,
    Trunc,
    Sign,
    #[strum(serialize = "PI")]
    Pi,
    #[strum(serialize = "E")]
    Euler,

    // ==========================
    // Number members
    IsNaN,
    IsFinite,
    IsInteger,
    #[strum(serialize = "MAX_SAFE_INTEGER")]
    MaxSafeInteger,
    #[strum(serialize = "EPSILON")]
    Epsilon,

    // ==========================
    // Global binding names
    #[strum(serialize = "globalThis")]
    GlobalThis,
    #[strum(serialize = "undefined")]
    Undefined,
    #[strum(serialize = "NaN")]
    NaN,
    #[strum(serialize = "Infinity")]
    Infinity,
    #[strum(serialize = "console")]
    Console,
    Log,
    #[strum(serialize = "error")]
    ErrorMethod,
    Warn,
    #[strum(serialize = "Object")]
    ObjectCtor,
    #[strum(serialize = "Array")]
    ArrayCtor,
    #[strum(serialize = "Function")]
    FunctionCtor,
    #[strum(serialize = "String")]
    StringCtor,
    #[strum(serialize = "Number")]
    NumberCtor,
    #[strum(serialize = "Boolean")]
    BooleanCtor,
    #[strum(serialize = "Symbol")]
    SymbolCtor,
    #[strum(serialize = "Promise")]
    PromiseCtor,
    #[strum(serialize = "Math")]
    MathNs,
    #[strum(serialize = "JSON")]
    JsonNs,
    #[strum(serialize = "RegExp")]
    RegExpCtor,
    #[strum(serialize = "Float64Array")]
    Float64ArrayCtor,
    #[strum(serialize = "Int32Array")]
    Int32ArrayCtor,
    #[strum(serialize = "Uint8Array")]
    Uint8ArrayCtor,
    #[strum(serialize = "parseInt")]
    ParseInt,
    #[strum(serialize = "parseFloat")]
    ParseFloat,

    // ==========================
    // typeof results
    #[strum(serialize = "object")]
    TypeofObject,
    #[strum(serialize = "boolean")]
    TypeofBoolean,
    #[strum(serialize = "number")]
    TypeofNumber,
    #[strum(serialize = "string")]
    TypeofString,
    #[strum(serialize = "symbol")]
    TypeofSymbol,
    #[strum(serialize = "function")]
    TypeofFunction,

    // ==========================
    // Error names
    #[strum(serialize = "Error")]
    Error,
    #[strum(serialize = "TypeError")]
    TypeError,
    #[strum(serialize = "RangeError")]
    RangeError,
    #[strum(serialize = "ReferenceError")]
    ReferenceError,
    #[strum(serialize = "SyntaxError")]
    SyntaxError,
    #[strum(serialize = "InternalError")]
    InternalError,

    // ==========================
    // Symbol namespace keys
    Iterator,
    AsyncIterator,
    HasInstance,
    ToPrimitive,
    Description,

    // ==========================
    // Regex fields
    Source,
    Flags,
    LastIndex,

    // ==========================
    // Template object fields
    Raw,

    // ==========================
    // Names synthesized by the async-to-promise lowering
    #[strum(serialize = "__awaitHelper")]
    AwaitHelper,
    #[strum(serialize = "__resolve")]
    CpsResolve,
    #[strum(serialize = "__reject")]
    CpsReject,
    #[strum(serialize = "__error")]
    CpsError,
    #[strum(serialize = "__value")]
    CpsValue,
}

impl StaticStrings {
    /// Returns the static string content for this entry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns the `StaticStrings` entry for a StringId in the static range.
    #[must_use]
    pub fn from_string_id(id: StringId) -> Option<Self> {
        let raw = id.0.checked_sub(STATIC_STRING_ID_OFFSET)?;
        Self::from_repr(u16::try_from(raw).ok()?)
    }
}

impl From<StaticStrings> for StringId {
    fn from(s: StaticStrings) -> Self {
        Self(STATIC_STRING_ID_OFFSET + s as u32)
    }
}

/// Identifier of an engine symbol value.
///
/// Well-known symbols occupy the low fixed indices; symbols created at
/// runtime by `Symbol(description)` are allocated from `DYNAMIC_SYMBOL_OFFSET`
/// upward and their descriptions live on the evaluation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct SymbolId(u32);

pub(crate) const DYNAMIC_SYMBOL_OFFSET: u32 = 16;

impl SymbolId {
    pub const ITERATOR: Self = Self(0);
    pub const ASYNC_ITERATOR: Self = Self(1);
    pub const HAS_INSTANCE: Self = Self(2);
    pub const TO_PRIMITIVE: Self = Self(3);
    pub const TO_STRING_TAG: Self = Self(4);

    pub fn dynamic(index: u32) -> Self {
        Self(DYNAMIC_SYMBOL_OFFSET + index)
    }

    /// Returns the dynamic-symbol index, or None for a well-known symbol.
    pub fn dynamic_index(self) -> Option<usize> {
        self.0.checked_sub(DYNAMIC_SYMBOL_OFFSET).map(|i| i as usize)
    }

    /// Description of a well-known symbol, e.g. `Symbol.iterator`.
    pub fn well_known_description(self) -> Option<&'static str> {
        match self {
            Self::ITERATOR => Some("Symbol.iterator"),
            Self::ASYNC_ITERATOR => Some("Symbol.asyncIterator"),
            Self::HAS_INSTANCE => Some("Symbol.hasInstance"),
            Self::TO_PRIMITIVE => Some("Symbol.toPrimitive"),
            Self::TO_STRING_TAG => Some("Symbol.toStringTag"),
            _ => None,
        }
    }
}

/// Identifier of a function definition stored in [`Interns`].
///
/// Function bodies are hoisted out of the AST into a flat table while
/// building, so AST nodes and function values stay small and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct FunctionId(u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("function table exceeds u32"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an external (host-registered) function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct ExtFunctionId(u32);

impl ExtFunctionId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("external function table exceeds u32"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Builder used while converting the parse tree into the typed AST.
///
/// Deduplicates strings as they are interned. Consumed into [`Interns`]
/// when the build finishes.
#[derive(Debug, Default)]
pub(crate) struct InternerBuilder {
    map: AHashMap<Box<str>, StringId>,
    strings: Vec<String>,
}

impl InternerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its id.
    ///
    /// Single ASCII characters and well-known engine strings resolve to their
    /// fixed ids without touching the per-script table.
    pub fn intern(&mut self, s: &str) -> StringId {
        if s.len() == 1 {
            let byte = s.as_bytes()[0];
            if byte < 128 {
                return StringId::from_ascii(byte);
            }
        }
        if let Ok(static_string) = StaticStrings::from_str(s) {
            return static_string.into();
        }
        if let Some(id) = self.map.get(s) {
            return *id;
        }
        let id = StringId(u32::try_from(INTERN_STRING_ID_OFFSET + self.strings.len()).expect("interner overflow"));
        self.map.insert(s.into(), id);
        self.strings.push(s.to_owned());
        id
    }

    /// Resolves an already-interned id back to its content; used by
    /// build-time passes (constant folding) before `Interns` exists.
    pub fn get_str(&self, id: StringId) -> &str {
        let raw = id.0;
        if raw < 128 {
            ASCII_STRS[raw as usize]
        } else if (raw as usize) < INTERN_STRING_ID_OFFSET {
            StaticStrings::from_string_id(id)
                .expect("invalid static StringId")
                .as_str()
        } else {
            &self.strings[raw as usize - INTERN_STRING_ID_OFFSET]
        }
    }

    fn into_strings(self) -> Vec<String> {
        self.strings
    }
}

/// Storage for all interned strings and function definitions of a script.
///
/// Owned by the executor; shared read-only with the evaluator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Interns {
    strings: Vec<String>,
    functions: Vec<FunctionDef>,
    external_function_names: Vec<String>,
}

impl Interns {
    pub fn new(builder: InternerBuilder, functions: Vec<FunctionDef>, external_function_names: Vec<String>) -> Self {
        Self {
            strings: builder.into_strings(),
            functions,
            external_function_names,
        }
    }

    /// Replaces the function table once post-build passes have run.
    pub fn set_functions(&mut self, functions: Vec<FunctionDef>) {
        self.functions = functions;
    }

    /// Returns the string content for an id.
    ///
    /// # Panics
    /// Panics if the id is not valid for this interner, which indicates a bug.
    pub fn get_str(&self, id: StringId) -> &str {
        let raw = id.0;
        if raw < 128 {
            ASCII_STRS[raw as usize]
        } else if (raw as usize) < INTERN_STRING_ID_OFFSET {
            StaticStrings::from_string_id(id)
                .expect("invalid static StringId")
                .as_str()
        } else {
            &self.strings[raw as usize - INTERN_STRING_ID_OFFSET]
        }
    }

    pub fn get_function(&self, id: FunctionId) -> &FunctionDef {
        &self.functions[id.index()]
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn get_external_function_name(&self, id: ExtFunctionId) -> &str {
        &self.external_function_names[id.index()]
    }

    pub fn external_function_names(&self) -> &[String] {
        &self.external_function_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_roundtrip() {
        let mut builder = InternerBuilder::new();
        let a = builder.intern("someVariable");
        let b = builder.intern("someVariable");
        let c = builder.intern("otherVariable");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let interns = Interns::new(builder, vec![], vec![]);
        assert_eq!(interns.get_str(a), "someVariable");
        assert_eq!(interns.get_str(c), "otherVariable");
    }

    #[test]
    fn ascii_and_static_ids_are_stable() {
        let mut builder = InternerBuilder::new();
        let x = builder.intern("x");
        assert_eq!(x, StringId::from_ascii(b'x'));

        let proto = builder.intern("prototype");
        assert_eq!(proto, StaticStrings::Prototype.into());

        let interns = Interns::new(builder, vec![], vec![]);
        assert_eq!(interns.get_str(x), "x");
        assert_eq!(interns.get_str(proto), "prototype");
        assert_eq!(interns.get_str(StaticStrings::MaxSafeInteger.into()), "MAX_SAFE_INTEGER");
    }

    #[test]
    fn well_known_symbols() {
        assert_eq!(SymbolId::ITERATOR.well_known_description(), Some("Symbol.iterator"));
        assert!(SymbolId::dynamic(0).well_known_description().is_none());
        assert_eq!(SymbolId::dynamic(3).dynamic_index(), Some(3));
    }
}
