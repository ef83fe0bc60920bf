//! Minimal semantic model of analyzed packages.
//!
//! The loader produces one [`Package`] graph per analysis of a package; the
//! runner and analyzers navigate it read-only. Object identity within one
//! analysis is `Arc` identity. Across the cache boundary objects are referred
//! to by their stable [`ObjectPath`], which only exported entities have.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::files::Span;

/// The stable path of an object within its package.
///
/// Paths are opaque to the runner; the loader guarantees that a path resolves
/// to the same entity across loads of an unchanged package.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Func,
    Type,
    Var,
    Const,
}

/// A named entity declared in a package.
#[derive(Clone, Debug)]
pub struct Object {
    /// Import path of the owning package.
    pub package: String,
    pub name: String,
    pub kind: ObjectKind,
    /// Stable path within the owning package; `None` for entities that cannot
    /// be referenced from other packages.
    pub path: Option<ObjectPath>,
    pub span: Option<Span>,
}

impl Object {
    pub fn new(
        package: impl Into<String>,
        name: impl Into<String>,
        kind: ObjectKind,
        path: Option<ObjectPath>,
    ) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            kind,
            path,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// A package's semantic shape: its declared objects and its imports.
#[derive(Clone, Debug)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub objects: Vec<Arc<Object>>,
    pub imports: Vec<Arc<Package>>,
}

impl Package {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            objects: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Resolves an object path within this package.
    pub fn resolve(&self, path: &ObjectPath) -> Option<&Arc<Object>> {
        self.objects
            .iter()
            .find(|obj| obj.path.as_ref() == Some(path))
    }

    /// The transitive import closure of this package, keyed by import path
    /// and including the package itself.
    pub fn transitive_imports(self: &Arc<Self>) -> HashMap<String, Arc<Package>> {
        let mut out = HashMap::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(pkg) = stack.pop() {
            if out.contains_key(&pkg.path) {
                continue;
            }
            stack.extend(pkg.imports.iter().cloned());
            out.insert(pkg.path.clone(), pkg);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(path: &str, imports: Vec<Arc<Package>>) -> Arc<Package> {
        Arc::new(Package {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            objects: Vec::new(),
            imports,
        })
    }

    #[test]
    fn transitive_imports_cover_a_diamond() {
        let d = pkg("d", vec![]);
        let b = pkg("b", vec![Arc::clone(&d)]);
        let c = pkg("c", vec![Arc::clone(&d)]);
        let a = pkg("a", vec![b, c]);

        let closure = a.transitive_imports();
        let mut paths: Vec<_> = closure.keys().cloned().collect();
        paths.sort();
        assert_eq!(paths, ["a", "b", "c", "d"]);
        assert!(Arc::ptr_eq(&closure["d"], &d));
    }

    #[test]
    fn resolve_finds_only_pathed_objects() {
        let exported = Arc::new(Object::new(
            "p",
            "Exported",
            ObjectKind::Func,
            Some(ObjectPath::new("Exported")),
        ));
        let local = Arc::new(Object::new("p", "local", ObjectKind::Var, None));
        let mut package = Package::new("p", "p");
        package.objects = vec![Arc::clone(&exported), local];

        assert!(package
            .resolve(&ObjectPath::new("Exported"))
            .is_some_and(|obj| Arc::ptr_eq(obj, &exported)));
        assert!(package.resolve(&ObjectPath::new("local")).is_none());
    }
}
