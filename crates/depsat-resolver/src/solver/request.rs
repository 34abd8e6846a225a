use depsat_atom::Atom;

/// A request specifies what the user asked for in this resolution.
///
/// Packages that are installed or in the world set are picked up from the
/// environment; only changes to the selection are part of the request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Atoms to install or keep, in the order given
    pub selected: Vec<Atom>,

    /// Atoms to remove
    pub deselected: Vec<Atom>,
}

impl Request {
    /// Create a new empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a package to be installed
    pub fn select(&mut self, atom: Atom) -> &mut Self {
        self.selected.push(atom);
        self
    }

    /// Ask for a package to be removed
    pub fn deselect(&mut self, atom: Atom) -> &mut Self {
        self.deselected.push(atom);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty() && self.deselected.is_empty()
    }
}
