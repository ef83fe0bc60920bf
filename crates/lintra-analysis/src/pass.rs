//! The per-(package, analyzer) context handed to an analyzer's `run`.

use std::any::Any;
use std::sync::Arc;

use lintra_core::sem::{Object, Package};
use lintra_core::FileSet;

use crate::diagnostic::Diagnostic;
use crate::fact::Fact;

/// A borrowed view of one object fact.
pub struct ObjectFactView<'a> {
    pub object: &'a Arc<Object>,
    pub fact: &'a dyn Fact,
}

/// A borrowed view of one package fact.
pub struct PackageFactView<'a> {
    pub package: &'a Arc<Package>,
    pub fact: &'a dyn Fact,
}

/// Everything an analyzer may see and do while analyzing one package.
///
/// All calls are serialized: an analyzer runs on a single task and is the
/// only user of its pass. Fact lookups consult the analyzer's own exports
/// first, then facts ingested from dependency packages. Exported facts become
/// visible to dependent packages only after the whole package has been
/// analyzed and persisted.
pub trait Pass {
    /// The semantic package under analysis.
    fn package(&self) -> &Arc<Package>;

    /// The package's source files, for span resolution and raw text access.
    fn files(&self) -> &FileSet;

    /// Reports a diagnostic. Ignored when the package is analyzed only as a
    /// dependency. A diagnostic with an empty category is stamped with the
    /// analyzer's name.
    fn report(&mut self, diagnostic: Diagnostic);

    /// The result of a direct dependency analyzer in this same package run.
    fn result_of(&self, analyzer: &str) -> Option<&(dyn Any + Send + Sync)>;

    /// Looks up a fact about an object, by fact type name.
    fn import_object_fact(&self, object: &Arc<Object>, type_name: &str) -> Option<&dyn Fact>;

    /// Looks up a fact about a package, by fact type name.
    fn import_package_fact(&self, package: &Arc<Package>, type_name: &str) -> Option<&dyn Fact>;

    /// Exports a fact about an object. A later export for the same
    /// (object, fact type) replaces the earlier one.
    fn export_object_fact(&mut self, object: &Arc<Object>, fact: Box<dyn Fact>);

    /// Exports a fact about the package under analysis. Facts about other
    /// packages cannot be exported.
    fn export_package_fact(&mut self, fact: Box<dyn Fact>);

    /// All object facts visible to this analyzer (imported and own), filtered
    /// to the fact types the analyzer declares.
    fn all_object_facts(&self) -> Vec<ObjectFactView<'_>>;

    /// All package facts visible to this analyzer (imported and own),
    /// unfiltered.
    fn all_package_facts(&self) -> Vec<PackageFactView<'_>>;
}
