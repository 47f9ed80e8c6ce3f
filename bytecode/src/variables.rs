use std::collections::HashMap;

/// One declared name of a function or script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub is_parameter: bool,
    /// Set by a parameter that repeats an earlier parameter's name. It keeps
    /// its positional slot but is never found by name.
    pub is_shadowed: bool,
    index: Option<usize>,
}

impl Variable {
    /// Final slot index, available after [`VariableTable::establish_indices`].
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// Outcome of [`VariableTable::add_parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDecl {
    Added,
    /// A local of the same name was dropped in favour of the parameter.
    EvictedLocal,
    /// The name repeats an earlier parameter.
    Duplicate,
}

/// Ordered slot assignment for the parameters and locals of one unit.
///
/// Parameters occupy `[0, param_count)` in declaration order. A local
/// sharing a parameter's name is absorbed into the parameter's slot, and a
/// parameter declared after a same-named local evicts that local.
#[derive(Debug, Default, Clone)]
pub struct VariableTable {
    vars: Vec<Variable>,
    by_name: HashMap<String, usize>,
    param_count: usize,
    established: bool,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, name: &str) -> ParameterDecl {
        self.invalidate();
        let mut outcome = ParameterDecl::Added;
        if let Some(&pos) = self.by_name.get(name) {
            if self.vars[pos].is_parameter {
                log::warn!("duplicate parameter name `{name}`");
                let insert_at = self.param_count;
                self.vars.insert(insert_at, Variable {
                    name: name.to_string(),
                    is_parameter: true,
                    is_shadowed: true,
                    index: None,
                });
                self.param_count += 1;
                self.rebuild_names();
                return ParameterDecl::Duplicate;
            }
            self.vars.remove(pos);
            outcome = ParameterDecl::EvictedLocal;
        }
        let insert_at = self.param_count;
        self.vars.insert(insert_at, Variable {
            name: name.to_string(),
            is_parameter: true,
            is_shadowed: false,
            index: None,
        });
        self.param_count += 1;
        self.rebuild_names();
        outcome
    }

    /// Declare a local. Returns `false` when the name was already bound.
    pub fn add_local(&mut self, name: &str) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        self.invalidate();
        self.by_name.insert(name.to_string(), self.vars.len());
        self.vars.push(Variable {
            name: name.to_string(),
            is_parameter: false,
            is_shadowed: false,
            index: None,
        });
        true
    }

    /// Freeze the slot numbers. Safe to call repeatedly.
    pub fn establish_indices(&mut self) {
        if self.established {
            return;
        }
        for (i, var) in self.vars.iter_mut().enumerate() {
            var.index = Some(i);
        }
        self.established = true;
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Slot of `name`, or `None` if undeclared or indices are not yet
    /// established.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let pos = *self.by_name.get(name)?;
        self.vars[pos].index
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|&pos| self.vars[pos].is_parameter)
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// Slot names in slot order.
    pub fn names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }

    /// Drop slot numbers until the next [`establish_indices`](Self::establish_indices).
    fn invalidate(&mut self) {
        self.established = false;
        for var in &mut self.vars {
            var.index = None;
        }
    }

    fn rebuild_names(&mut self) {
        self.by_name.clear();
        for (pos, var) in self.vars.iter().enumerate() {
            if var.is_shadowed {
                continue;
            }
            self.by_name.entry(var.name.clone()).or_insert(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_sharing_parameter_name_is_absorbed() {
        let mut table = VariableTable::new();
        table.add_parameter("a");
        table.add_parameter("b");
        assert!(!table.add_local("a"));
        assert!(table.add_local("c"));
        table.establish_indices();

        assert_eq!(table.len(), 3);
        assert_eq!(table.names(), vec!["a", "b", "c"]);
        assert!(table.is_parameter("a"));
        assert_eq!(table.index_of("a"), Some(0));
        assert_eq!(table.index_of("b"), Some(1));
        assert_eq!(table.index_of("c"), Some(2));
        assert_eq!(table.param_count(), 2);
    }

    #[test]
    fn declarations_after_establishing_hide_old_slots() {
        let mut table = VariableTable::new();
        table.add_local("x");
        table.establish_indices();
        assert_eq!(table.index_of("x"), Some(0));

        table.add_parameter("p");
        assert!(!table.is_established());
        assert_eq!(table.index_of("x"), None);
        assert_eq!(table.index_of("p"), None);

        table.establish_indices();
        assert_eq!(table.index_of("p"), Some(0));
        assert_eq!(table.index_of("x"), Some(1));

        table.add_local("y");
        assert_eq!(table.index_of("x"), None);
    }

    #[test]
    fn late_parameter_evicts_local() {
        let mut table = VariableTable::new();
        table.add_local("x");
        table.add_local("y");
        assert_eq!(table.add_parameter("y"), ParameterDecl::EvictedLocal);
        table.establish_indices();

        assert_eq!(table.len(), 2);
        assert_eq!(table.index_of("y"), Some(0));
        assert_eq!(table.index_of("x"), Some(1));
        assert!(table.is_parameter("y"));
    }

    #[test]
    fn duplicate_parameter_keeps_first_slot() {
        let mut table = VariableTable::new();
        table.add_parameter("a");
        assert_eq!(table.add_parameter("a"), ParameterDecl::Duplicate);
        table.add_parameter("b");
        table.establish_indices();

        assert_eq!(table.param_count(), 3);
        assert_eq!(table.index_of("a"), Some(0));
        assert_eq!(table.index_of("b"), Some(2));
        assert!(table.variables()[1].is_shadowed);
    }

    #[test]
    fn indices_only_after_establish() {
        let mut table = VariableTable::new();
        table.add_parameter("p");
        assert_eq!(table.index_of("p"), None);
        table.establish_indices();
        table.establish_indices();
        assert_eq!(table.index_of("p"), Some(0));
        assert_eq!(table.variables()[0].index(), Some(0));
    }
}
