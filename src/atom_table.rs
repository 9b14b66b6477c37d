use std::cmp::Ordering;
use std::fmt;
use std::mem;

use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use parking_lot::RwLock;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Atom {
    pub(crate) index: u32,
}

const_assert!(mem::size_of::<Atom>() == 4);

// the order of this table fixes the indices of the associated
// constants on Atom below.
pub(crate) static STRINGS: [&str; 32] = [
    "true", "fail", "false", ",", ";", "->", "!", ".", "[]", "call", ":-", "\\+", "=", "is", "-",
    "+", "/", "*", "//", "mod", "rem", "min", "max", "abs", "sign", "dynamic", "table",
    "discontiguous", "?-", "{}", "|", "not",
];

impl Atom {
    pub const TRUE: Atom = Atom { index: 0 };
    pub const FAIL: Atom = Atom { index: 1 };
    pub const FALSE: Atom = Atom { index: 2 };
    pub const COMMA: Atom = Atom { index: 3 };
    pub const SEMICOLON: Atom = Atom { index: 4 };
    pub const ARROW: Atom = Atom { index: 5 };
    pub const CUT: Atom = Atom { index: 6 };
    pub const DOT: Atom = Atom { index: 7 };
    pub const EMPTY_LIST: Atom = Atom { index: 8 };
    pub const CALL: Atom = Atom { index: 9 };
    pub const NECK: Atom = Atom { index: 10 };
    pub const NOT_PROVABLE: Atom = Atom { index: 11 };
    pub const UNIFY: Atom = Atom { index: 12 };
    pub const IS: Atom = Atom { index: 13 };
    pub const MINUS: Atom = Atom { index: 14 };
    pub const PLUS: Atom = Atom { index: 15 };
    pub const SLASH: Atom = Atom { index: 16 };
    pub const STAR: Atom = Atom { index: 17 };
    pub const INT_DIV: Atom = Atom { index: 18 };
    pub const MOD: Atom = Atom { index: 19 };
    pub const REM: Atom = Atom { index: 20 };
    pub const MIN: Atom = Atom { index: 21 };
    pub const MAX: Atom = Atom { index: 22 };
    pub const ABS: Atom = Atom { index: 23 };
    pub const SIGN: Atom = Atom { index: 24 };
    pub const DYNAMIC: Atom = Atom { index: 25 };
    pub const TABLE: Atom = Atom { index: 26 };
    pub const DISCONTIGUOUS: Atom = Atom { index: 27 };
    pub const QUERY: Atom = Atom { index: 28 };
    pub const CURLY: Atom = Atom { index: 29 };
    pub const BAR: Atom = Atom { index: 30 };
    pub const NOT: Atom = Atom { index: 31 };
}

/// Maps a string literal to its interned atom, resolving the static
/// atoms at compile time.
#[macro_export]
macro_rules! atom {
    ("true") => { $crate::atom_table::Atom::TRUE };
    ("fail") => { $crate::atom_table::Atom::FAIL };
    ("false") => { $crate::atom_table::Atom::FALSE };
    (",") => { $crate::atom_table::Atom::COMMA };
    (";") => { $crate::atom_table::Atom::SEMICOLON };
    ("->") => { $crate::atom_table::Atom::ARROW };
    ("!") => { $crate::atom_table::Atom::CUT };
    (".") => { $crate::atom_table::Atom::DOT };
    ("[]") => { $crate::atom_table::Atom::EMPTY_LIST };
    ("call") => { $crate::atom_table::Atom::CALL };
    (":-") => { $crate::atom_table::Atom::NECK };
    ("\\+") => { $crate::atom_table::Atom::NOT_PROVABLE };
    ("=") => { $crate::atom_table::Atom::UNIFY };
    ("is") => { $crate::atom_table::Atom::IS };
    ("-") => { $crate::atom_table::Atom::MINUS };
    ("+") => { $crate::atom_table::Atom::PLUS };
    ("/") => { $crate::atom_table::Atom::SLASH };
    ("*") => { $crate::atom_table::Atom::STAR };
    ("//") => { $crate::atom_table::Atom::INT_DIV };
    ("mod") => { $crate::atom_table::Atom::MOD };
    ("rem") => { $crate::atom_table::Atom::REM };
    ("min") => { $crate::atom_table::Atom::MIN };
    ("max") => { $crate::atom_table::Atom::MAX };
    ("abs") => { $crate::atom_table::Atom::ABS };
    ("sign") => { $crate::atom_table::Atom::SIGN };
    ("dynamic") => { $crate::atom_table::Atom::DYNAMIC };
    ("table") => { $crate::atom_table::Atom::TABLE };
    ("discontiguous") => { $crate::atom_table::Atom::DISCONTIGUOUS };
    ("?-") => { $crate::atom_table::Atom::QUERY };
    ("{}") => { $crate::atom_table::Atom::CURLY };
    ("|") => { $crate::atom_table::Atom::BAR };
    ("not") => { $crate::atom_table::Atom::NOT };
    ($name:expr) => { $crate::atom_table::Atom::intern($name) };
}

// atoms live for the lifetime of the process. the table only ever
// grows, so the leaked strings are reachable through it forever.
lazy_static! {
    static ref ATOM_TABLE: RwLock<IndexSet<&'static str, FxBuildHasher>> = {
        let mut table = IndexSet::with_capacity_and_hasher(1 << 10, FxBuildHasher::default());

        for s in STRINGS {
            table.insert(s);
        }

        RwLock::new(table)
    };
}

impl Atom {
    pub fn intern(name: &str) -> Self {
        if let Some(index) = ATOM_TABLE.read().get_index_of(name) {
            return Atom { index: index as u32 };
        }

        let mut table = ATOM_TABLE.write();

        // lost the race to another writer.
        if let Some(index) = table.get_index_of(name) {
            return Atom { index: index as u32 };
        }

        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let (index, _) = table.insert_full(leaked);

        Atom { index: index as u32 }
    }

    #[inline(always)]
    pub fn is_static(self) -> bool {
        (self.index as usize) < STRINGS.len()
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        if self.is_static() {
            return STRINGS[self.index as usize];
        }

        ATOM_TABLE
            .read()
            .get_index(self.index as usize)
            .copied()
            .unwrap_or("")
    }

    pub fn as_char(self) -> Option<char> {
        let mut it = self.as_str().chars();

        let c1 = it.next();
        let c2 = it.next();

        if c2.is_none() { c1 } else { None }
    }

    /// Whether the atom can be written without quotes.
    pub(crate) fn needs_quotes(self) -> bool {
        let s = self.as_str();
        let mut chars = s.chars();

        match chars.next() {
            None => true,
            Some(c) if c.is_ascii_lowercase() => {
                !chars.all(|c| c.is_alphanumeric() || c == '_')
            }
            Some(_) if matches!(s, "[]" | "!" | ";" | "{}") => false,
            Some(_) => !s.chars().all(is_symbol_char),
        }
    }
}

#[inline]
pub(crate) fn is_symbol_char(c: char) -> bool {
    "+-*/\\^<>=~:.?@#&$".contains(c)
}

impl From<bool> for Atom {
    #[inline]
    fn from(value: bool) -> Self {
        if value { atom!("true") } else { atom!("false") }
    }
}

impl PartialOrd for Atom {
    #[inline]
    fn partial_cmp(&self, other: &Atom) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    #[inline]
    fn cmp(&self, other: &Atom) -> Ordering {
        if self.index == other.index {
            Ordering::Equal
        } else {
            self.as_str().cmp(other.as_str())
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_atoms_resolve_to_their_strings() {
        assert_eq!(atom!("true").as_str(), "true");
        assert_eq!(atom!("\\+").as_str(), "\\+");
        assert_eq!(atom!("not").as_str(), "not");

        for (index, s) in STRINGS.iter().enumerate() {
            assert_eq!(Atom::intern(s), Atom { index: index as u32 });
        }
    }

    #[test]
    fn interning_is_idempotent() {
        let a = atom!("some_fresh_atom");
        let b = Atom::intern("some_fresh_atom");

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "some_fresh_atom");
        assert!(!a.is_static());
    }

    #[test]
    fn quoting() {
        assert!(!atom!("foo_bar1").needs_quotes());
        assert!(!atom!("=..").needs_quotes());
        assert!(!atom!("[]").needs_quotes());
        assert!(atom!("Foo").needs_quotes());
        assert!(atom!(",").needs_quotes());
        assert!(atom!("hello world").needs_quotes());
        assert!(atom!("").needs_quotes());
    }
}
