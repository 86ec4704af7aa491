//! Labels and macros collected by the assembler.

use std::collections::HashMap;
use std::rc::Rc;

use edit_distance::edit_distance;

use crate::error::{AssemblyError, AssemblyErrorKind};
use crate::instruction::Instruction;
use crate::parsing::Span;
use crate::symbolic::ast::{Entry, Number};

/// Index of a label in a [SymbolTable].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A location in the memory: labels, sub-labels and variables.
    Address,

    /// A value bound with `=`. Not memory resident.
    Constant,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,

    /// The address of the label, or the value of a constant.
    pub address: u16,

    /// Width of the value in bytes. Zero for plain labels.
    pub width: u8,

    pub kind: SymbolKind,
    pub references: u32,
    pub defined: Option<Span>,
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub body: Rc<Vec<Entry>>,
    pub references: u32,
    pub defined: Option<Span>,
}

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Label(usize),
    Macro(usize),
}

/// Labels and macros in the order of their definition. Labels and macros share a namespace.
#[derive(Default, Debug, Clone)]
pub struct SymbolTable {
    labels: Vec<Label>,
    macros: Vec<Macro>,
    names: HashMap<String, Symbol>,
}

/// Checks that `name` can't be mistaken for a number or an instruction.
pub fn validate_name(name: &str) -> Result<(), AssemblyErrorKind> {
    let number = Number::parse(name).is_some();

    if name.is_empty() || number || name.parse::<Instruction>().is_ok() {
        return Err(AssemblyErrorKind::InvalidLabelName(name.to_string()));
    }

    Ok(())
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    fn check_name(&self, name: &str, span: &Option<Span>) -> Result<(), AssemblyError> {
        validate_name(name)
            .map_err(|kind| AssemblyError::new(kind, span.clone()))?;

        match self.names.get(name) {
            Some(Symbol::Label(_)) => Err(AssemblyError::new(
                AssemblyErrorKind::DuplicateLabel(name.to_string()),
                span.clone(),
            )),
            Some(Symbol::Macro(_)) => Err(AssemblyError::new(
                AssemblyErrorKind::DuplicateMacro(name.to_string()),
                span.clone(),
            )),
            None => Ok(()),
        }
    }

    /// Adds a label.
    ///
    /// # Errors
    /// Fails if the name is invalid or already taken by a label or a macro.
    pub fn define_symbol(
        &mut self,
        name: &str,
        address: u16,
        width: u8,
        kind: SymbolKind,
        span: Option<Span>,
    ) -> Result<SymbolId, AssemblyError> {
        self.check_name(name, &span)?;

        let id = self.labels.len();

        self.labels.push(Label {
            name: name.to_string(),
            address,
            width,
            kind,
            references: 0,
            defined: span,
        });

        self.names.insert(name.to_string(), Symbol::Label(id));

        Ok(SymbolId(id))
    }

    /// Adds a macro. The same naming rules as for labels apply.
    pub fn define_macro(
        &mut self,
        name: &str,
        body: Vec<Entry>,
        span: Option<Span>,
    ) -> Result<(), AssemblyError> {
        self.check_name(name, &span)?;

        let id = self.macros.len();

        self.macros.push(Macro {
            name: name.to_string(),
            body: Rc::new(body),
            references: 0,
            defined: span,
        });

        self.names.insert(name.to_string(), Symbol::Macro(id));

        Ok(())
    }

    pub fn get_symbol(&self, id: SymbolId) -> &Label {
        &self.labels[id.0]
    }

    pub fn get_symbol_by_label<S: AsRef<str>>(&self, name: S) -> Option<&Label> {
        match self.names.get(name.as_ref()) {
            Some(Symbol::Label(id)) => Some(&self.labels[*id]),
            _ => None,
        }
    }

    /// Looks up a label and counts the reference.
    pub fn reference_symbol<S: AsRef<str>>(&mut self, name: S) -> Option<&Label> {
        match self.names.get(name.as_ref()) {
            Some(Symbol::Label(id)) => {
                let label = &mut self.labels[*id];
                label.references += 1;
                Some(label)
            },
            _ => None,
        }
    }

    pub fn get_macro<S: AsRef<str>>(&self, name: S) -> Option<&Macro> {
        match self.names.get(name.as_ref()) {
            Some(Symbol::Macro(id)) => Some(&self.macros[*id]),
            _ => None,
        }
    }

    /// Looks up a macro and counts the invocation.
    pub fn reference_macro<S: AsRef<str>>(&mut self, name: S) -> Option<&Macro> {
        match self.names.get(name.as_ref()) {
            Some(Symbol::Macro(id)) => {
                let mac = &mut self.macros[*id];
                mac.references += 1;
                Some(mac)
            },
            _ => None,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item=&Label> {
        self.labels.iter()
    }

    pub fn macros(&self) -> impl Iterator<Item=&Macro> {
        self.macros.iter()
    }

    pub fn unused_labels(&self) -> impl Iterator<Item=&Label> {
        self.labels.iter().filter(|label| label.references == 0)
    }

    pub fn unused_macros(&self) -> impl Iterator<Item=&Macro> {
        self.macros.iter().filter(|mac| mac.references == 0)
    }

    /// Finds the label whose name is closest to `name`, if any is close enough to be a typo.
    pub fn suggest(&self, name: &str) -> Option<String> {
        let limit = std::cmp::max(2, name.len() / 3);

        self.labels.iter()
            .map(|label| (edit_distance(name, &label.name), label))
            .filter(|(distance, _)| *distance <= limit)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, label)| label.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("ab").is_err());
        assert!(validate_name("beef").is_err());
        assert!(validate_name("ADD2k").is_err());
        assert!(validate_name("abc").is_ok());
        assert!(validate_name("abcdef").is_ok());
        assert!(validate_name("c0ffee00").is_ok());
        assert!(validate_name("on-reset").is_ok());
    }

    #[test]
    fn test_duplicates() {
        let mut table = SymbolTable::new();

        table.define_symbol("main", 0x100, 0, SymbolKind::Address, None).unwrap();
        table.define_macro("EMIT", Vec::new(), None).unwrap();

        let err = table.define_symbol("main", 0x200, 0, SymbolKind::Address, None).unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::DuplicateLabel("main".into()));

        let err = table.define_symbol("EMIT", 0x200, 0, SymbolKind::Address, None).unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::DuplicateMacro("EMIT".into()));
    }

    #[test]
    fn test_references() {
        let mut table = SymbolTable::new();

        table.define_symbol("used", 0x100, 0, SymbolKind::Address, None).unwrap();
        table.define_symbol("unused", 0x104, 0, SymbolKind::Address, None).unwrap();

        assert_eq!(table.reference_symbol("used").map(|l| l.address), Some(0x100));
        assert!(table.reference_symbol("missing").is_none());

        let unused: Vec<_> = table.unused_labels().map(|l| l.name.as_str()).collect();
        assert_eq!(unused, vec!["unused"]);
    }

    #[test]
    fn test_suggest() {
        let mut table = SymbolTable::new();

        table.define_symbol("print-string", 0x100, 0, SymbolKind::Address, None).unwrap();
        table.define_symbol("loop", 0x104, 0, SymbolKind::Address, None).unwrap();

        assert_eq!(table.suggest("print-strng"), Some("print-string".into()));
        assert_eq!(table.suggest("lop"), Some("loop".into()));
        assert_eq!(table.suggest("zzzzzzzzzz"), None);
    }
}
