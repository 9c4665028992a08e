use std::collections::BTreeMap;

/// The client-requested projection: a tree mirroring the resource shape.
/// Scopes descend through it by link name; an unselected link is still
/// validated but produces no output.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedProperties {
    /// The entire sub-tree at this position is selected.
    Entire,
    /// Only the named children are selected, each with its own sub-tree.
    Partial(BTreeMap<String, SelectedProperties>),
}

impl Default for SelectedProperties {
    fn default() -> Self {
        SelectedProperties::Entire
    }
}

impl SelectedProperties {
    /// Build a projection from `/`-separated select paths, e.g.
    /// `["Name", "Orders/Amount"]`.
    pub fn from_paths<'a, I>(paths: I) -> SelectedProperties
    where
        I: IntoIterator<Item = &'a str>,
    {
        fn insert(children: &mut BTreeMap<String, SelectedProperties>, path: &str) {
            let (head, rest) = match path.split_once('/') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let entry = children
                .entry(head.to_string())
                .or_insert_with(|| SelectedProperties::Partial(BTreeMap::new()));
            match (rest, entry) {
                // A leaf selects its entire sub-tree.
                (None, entry) => *entry = SelectedProperties::Entire,
                (Some(rest), SelectedProperties::Partial(children)) => insert(children, rest),
                // An already-entire sub-tree subsumes the narrower path.
                (Some(_), SelectedProperties::Entire) => {}
            }
        }

        let mut root = BTreeMap::new();
        for path in paths {
            insert(&mut root, path);
        }
        SelectedProperties::Partial(root)
    }

    /// Descend through a link or property name. None means the name is not
    /// selected at this position.
    pub fn child(&self, name: &str) -> Option<SelectedProperties> {
        match self {
            SelectedProperties::Entire => Some(SelectedProperties::Entire),
            SelectedProperties::Partial(children) => children.get(name).cloned(),
        }
    }
}
