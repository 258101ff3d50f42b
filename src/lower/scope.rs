use crate::{
    error::{LoweringError, SymbolKind},
    ir::ValueId,
};

pub const SCOPE_CAPACITY: usize = 128;

/// Flat list of live variable bindings, newest last.
///
/// There is no nesting: a binding made inside an `if` or `while` body stays
/// visible after the body. Only function bodies and `for` loops remove their
/// bindings again, by truncating back to a [`ScopeMark`].
#[derive(Debug, Default)]
pub struct ScopeTable {
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    /// The `alloca` slot holding the variable
    pub slot: ValueId,
}

/// Length of the table at some point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark(usize);

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, slot: ValueId) -> Result<(), LoweringError> {
        if self.bindings.len() >= SCOPE_CAPACITY {
            return Err(LoweringError::CapacityExceeded {
                limit: SCOPE_CAPACITY,
            });
        }

        self.bindings.push(Binding {
            name: name.to_owned(),
            slot,
        });

        Ok(())
    }

    /// Most recent binding of `name`
    pub fn lookup(&self, name: &str) -> Result<ValueId, LoweringError> {
        self.bindings
            .iter()
            .rev()
            .find(|binding| binding.name == name)
            .map(|binding| binding.slot)
            .ok_or_else(|| LoweringError::UndefinedSymbol {
                kind: SymbolKind::Variable,
                name: name.to_owned(),
            })
    }

    pub fn mark(&self) -> ScopeMark {
        ScopeMark(self.bindings.len())
    }

    pub fn restore(&mut self, mark: ScopeMark) {
        self.bindings.truncate(mark.0);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    fn slot(index: usize) -> ValueId {
        ValueId::new(index)
    }

    #[test]
    fn latest_binding_wins() {
        let mut scopes = ScopeTable::new();

        scopes.bind("x", slot(0)).unwrap();
        scopes.bind("y", slot(1)).unwrap();
        scopes.bind("x", slot(2)).unwrap();

        assert_eq!(scopes.lookup("x").unwrap(), slot(2));
        assert_eq!(scopes.lookup("y").unwrap(), slot(1));
    }

    #[test]
    fn restore_drops_later_bindings() {
        let mut scopes = ScopeTable::new();

        scopes.bind("x", slot(0)).unwrap();
        let mark = scopes.mark();
        scopes.bind("x", slot(1)).unwrap();
        scopes.bind("i", slot(2)).unwrap();
        scopes.restore(mark);

        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes.lookup("x").unwrap(), slot(0));
        assert!(matches!(
            scopes.lookup("i"),
            Err(LoweringError::UndefinedSymbol {
                kind: SymbolKind::Variable,
                ..
            })
        ));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut scopes = ScopeTable::new();

        for index in 0..SCOPE_CAPACITY {
            scopes.bind(&format!("v{index}"), slot(index)).unwrap();
        }

        assert!(matches!(
            scopes.bind("overflow", slot(SCOPE_CAPACITY)),
            Err(LoweringError::CapacityExceeded { limit: 128 })
        ));
        assert_eq!(scopes.len(), SCOPE_CAPACITY);
    }
}
