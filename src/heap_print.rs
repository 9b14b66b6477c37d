use crate::atom_table::*;
use crate::forms::*;
use crate::types::*;

use std::fmt;

fn fmt_atom(atom: Atom, f: &mut fmt::Formatter) -> fmt::Result {
    if !atom.needs_quotes() {
        return f.write_str(atom.as_str());
    }

    f.write_str("'")?;

    for c in atom.as_str().chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }

    f.write_str("'")
}

fn fmt_float(n: f64, f: &mut fmt::Formatter) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{:.1}", n)
    } else {
        write!(f, "{:?}", n)
    }
}

/// Terms are written in canonical notation: operators in functional
/// form, lists in bracket syntax, atoms quoted where they would not
/// read back as the same atom.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "{}", var),
            Term::Atom(atom) => fmt_atom(*atom, f),
            Term::Integer(n) => write!(f, "{}", n),
            Term::Float(n) => fmt_float(n.into_inner(), f),
            Term::EmptyList => f.write_str("[]"),
            Term::Compound(c) => {
                fmt_atom(c.name(), f)?;
                f.write_str("(")?;

                for (i, arg) in c.args().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }

                    write!(f, "{}", arg)?;
                }

                f.write_str(")")
            }
            Term::List(_) => {
                f.write_str("[")?;

                let mut iter = self.list_iter();

                if let Some(head) = iter.next() {
                    write!(f, "{}", head)?;
                }

                for item in iter.by_ref() {
                    write!(f, ",{}", item)?;
                }

                match iter.rest() {
                    Term::EmptyList => {}
                    tail => write!(f, "|{}", tail)?,
                }

                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_fact() {
            write!(f, "{}", self.head())
        } else {
            write!(f, "{} :- {}", self.head(), self.body())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_term;

    fn round(src: &str) -> String {
        read_term(src).unwrap().term.to_string()
    }

    #[test]
    fn canonical_output() {
        assert_eq!(round("f(X, 'A b', [1, 2 | T], \"hi\")."), "f(_0,'A b',[1,2|_1],[104,105])");
        assert_eq!(round("X = 1 + 2.5."), "=(_0,+(1,2.5))");
        assert_eq!(round("'don''t'."), "'don\\'t'");
        assert_eq!(round("[]."), "[]");
        assert_eq!(round("(a , b)."), "','(a,b)");
    }

    #[test]
    fn clauses() {
        let clause = crate::parser::read_clause("p(X) :- q(X), !.").unwrap();
        assert_eq!(clause.to_string(), "p(_0) :- ','(q(_0),!)");
    }
}
