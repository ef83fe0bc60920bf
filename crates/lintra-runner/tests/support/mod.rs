//! In-memory loader and analyzers for driving the runner in tests.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lintra_analysis::fact::{encode_fact, Fact, FactError, FactType};
use lintra_analysis::unused::UnusedResult;
use lintra_analysis::{Analyzer, AnalyzerError, AnalyzerResult, Diagnostic, Pass};
use lintra_cache::KeyHasher;
use lintra_core::sem::{self, ObjectKind, ObjectPath};
use lintra_core::{Config, FileId, FileSet, Span};
use lintra_runner::{LoadError, LoadedPackage, PackageLoader, PackageSpec};
use serde::{Deserialize, Serialize};

/// Definition of one fabricated package.
pub struct PackageDef {
    pub path: &'static str,
    pub source: String,
    pub imports: Vec<&'static str>,
    pub config: Config,
    pub spec_errors: Vec<String>,
    pub load_errors: Vec<String>,
    /// (name, exported) pairs; exported objects get a stable object path.
    pub objects: Vec<(&'static str, bool)>,
}

impl PackageDef {
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            source: format!("package {path}\nfn Exported() {{}}\n"),
            imports: Vec::new(),
            config: Config::default(),
            spec_errors: Vec::new(),
            load_errors: Vec::new(),
            objects: vec![("Exported", true)],
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_imports(mut self, imports: &[&'static str]) -> Self {
        self.imports = imports.to_vec();
        self
    }

    pub fn with_spec_error(mut self, message: &str) -> Self {
        self.spec_errors.push(message.to_string());
        self
    }

    pub fn with_load_error(mut self, message: &str) -> Self {
        self.load_errors.push(message.to_string());
        self
    }

    pub fn with_objects(mut self, objects: &[(&'static str, bool)]) -> Self {
        self.objects = objects.to_vec();
        self
    }
}

/// A loader over fabricated packages that counts `load` calls per package.
pub struct TestLoader {
    packages: HashMap<&'static str, PackageDef>,
    specs: Mutex<HashMap<&'static str, Arc<PackageSpec>>>,
    load_counts: Mutex<HashMap<String, usize>>,
}

impl TestLoader {
    pub fn new(defs: Vec<PackageDef>) -> Self {
        Self {
            packages: defs.into_iter().map(|def| (def.path, def)).collect(),
            specs: Mutex::new(HashMap::new()),
            load_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn load_count(&self, path: &str) -> usize {
        self.load_counts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    fn spec(&self, path: &'static str) -> Arc<PackageSpec> {
        if let Some(spec) = self.specs.lock().unwrap().get(path) {
            return Arc::clone(spec);
        }
        let def = &self.packages[path];
        let imports: Vec<Arc<PackageSpec>> =
            def.imports.iter().map(|dep| self.spec(dep)).collect();

        // Like a real loader, the package hash is transitive: it covers the
        // package's own sources and the hashes of everything it imports, so
        // a change anywhere below invalidates every dependent.
        let mut hasher = KeyHasher::new(&format!("testpkg {path}"));
        hasher.line(&def.source);
        for (name, exported) in &def.objects {
            hasher.line(&format!("obj {name} {exported}"));
        }
        for dep in &imports {
            hasher.line(&format!("dep {} {}", dep.path, dep.hash.to_hex()));
        }

        let spec = Arc::new(PackageSpec {
            id: path.to_string(),
            path: path.to_string(),
            hash: hasher.finish(),
            imports,
            config: def.config.clone(),
            errors: def.spec_errors.iter().map(LoadError::new).collect(),
        });
        self.specs.lock().unwrap().insert(path, Arc::clone(&spec));
        spec
    }

    fn build_sem(&self, path: &str, with_spans: bool) -> Arc<sem::Package> {
        let def = &self.packages[path];
        let mut package = sem::Package::new(path, path.rsplit('/').next().unwrap());
        package.objects = def
            .objects
            .iter()
            .map(|&(name, exported)| {
                let mut object = sem::Object::new(
                    path,
                    name,
                    ObjectKind::Func,
                    exported.then(|| ObjectPath::new(name)),
                );
                if with_spans {
                    object = object.with_span(Span::new(FileId::new(0), 0, 1));
                }
                Arc::new(object)
            })
            .collect();
        package.imports = def
            .imports
            .iter()
            .map(|dep| self.build_sem(dep, false))
            .collect();
        Arc::new(package)
    }
}

impl PackageLoader for TestLoader {
    fn graph(&self, patterns: &[String]) -> Result<Vec<Arc<PackageSpec>>, LoadError> {
        patterns
            .iter()
            .map(|pattern| {
                self.packages
                    .get_key_value(pattern.as_str())
                    .map(|(&path, _)| self.spec(path))
                    .ok_or_else(|| LoadError::new(format!("no packages matched {pattern}")))
            })
            .collect()
    }

    fn load(&self, spec: &PackageSpec) -> Result<LoadedPackage, LoadError> {
        *self
            .load_counts
            .lock()
            .unwrap()
            .entry(spec.path.clone())
            .or_insert(0) += 1;

        let (&path, def) = self
            .packages
            .get_key_value(spec.path.as_str())
            .ok_or_else(|| LoadError::new(format!("unknown package {}", spec.path)))?;

        let mut files = FileSet::new();
        files.add(format!("{path}/lib.x"), def.source.clone());

        Ok(LoadedPackage {
            spec: self.spec(path),
            files,
            types: self.build_sem(path, true),
            errors: def.load_errors.iter().map(LoadError::new).collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkFact {
    pub origin: String,
}

impl Fact for MarkFact {
    fn type_name(&self) -> &'static str {
        "test:mark"
    }

    fn encode(&self) -> Result<Vec<u8>, FactError> {
        encode_fact(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn here() -> Span {
    Span::new(FileId::new(0), 0, 1)
}

/// Exports a `MarkFact` about every package and exported object it analyzes,
/// and reports which dependency facts it observed.
pub struct MarkAnalyzer;

impl Analyzer for MarkAnalyzer {
    fn name(&self) -> &'static str {
        "mark"
    }

    fn fact_types(&self) -> Vec<FactType> {
        vec![FactType::of::<MarkFact>("test:mark")]
    }

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        let package = Arc::clone(pass.package());

        pass.export_package_fact(Box::new(MarkFact {
            origin: package.path.clone(),
        }));
        for object in &package.objects {
            if object.path.is_some() {
                pass.export_object_fact(
                    object,
                    Box::new(MarkFact {
                        origin: format!("{}:{}", package.path, object.name),
                    }),
                );
            }
        }

        let closure = package.transitive_imports();
        let mut seen: Vec<&str> = closure
            .values()
            .filter(|dep| dep.path != package.path)
            .filter(|dep| pass.import_package_fact(dep, "test:mark").is_some())
            .map(|dep| dep.path.as_str())
            .collect();
        seen.sort_unstable();

        let mut object_facts = 0;
        for dep in closure.values() {
            if dep.path == package.path {
                continue;
            }
            for object in &dep.objects {
                if pass.import_object_fact(object, "test:mark").is_some() {
                    object_facts += 1;
                }
            }
        }

        pass.report(Diagnostic::new(here(), format!("pkgfacts: {}", seen.join(","))));
        pass.report(Diagnostic::new(here(), format!("objfacts: {object_facts}")));
        Ok(Box::new(()))
    }
}

/// Fails on one specific package and succeeds everywhere else. Declares a
/// fact type so it also runs on dependency-only packages.
pub struct FailOn {
    pub target: &'static str,
}

impl Analyzer for FailOn {
    fn name(&self) -> &'static str {
        "failon"
    }

    fn fact_types(&self) -> Vec<FactType> {
        vec![FactType::of::<MarkFact>("test:mark")]
    }

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        if pass.package().path == self.target {
            return Err(AnalyzerError::new(format!("refusing {}", self.target)));
        }
        Ok(Box::new(()))
    }
}

#[derive(Default)]
pub struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Tracks how many analyzer bodies run concurrently.
pub struct ProbeAnalyzer {
    pub gauge: Arc<Gauge>,
}

impl Analyzer for ProbeAnalyzer {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn fact_types(&self) -> Vec<FactType> {
        vec![FactType::of::<MarkFact>("test:mark")]
    }

    fn run(&self, _pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        let now = self.gauge.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(2));
        self.gauge.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Box::new(()))
    }
}

/// Produces an `UnusedResult` marking the first object used and the rest
/// unused.
pub struct UnusedAnalyzer;

impl Analyzer for UnusedAnalyzer {
    fn name(&self) -> &'static str {
        "unused"
    }

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        let objects = &pass.package().objects;
        let result = UnusedResult {
            used: objects.first().cloned().into_iter().collect(),
            unused: objects.iter().skip(1).cloned().collect(),
        };
        Ok(Box::new(result))
    }
}

/// An analyzer named "unused" that produces the wrong result type.
pub struct BogusUnusedAnalyzer;

impl Analyzer for BogusUnusedAnalyzer {
    fn name(&self) -> &'static str {
        "unused"
    }

    fn run(&self, _pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        Ok(Box::new(()))
    }
}

/// Counts the package's objects; consumed by [`ReportCount`] via
/// `result_of`.
pub struct CountObjects;

impl Analyzer for CountObjects {
    fn name(&self) -> &'static str {
        "count-objects"
    }

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        Ok(Box::new(pass.package().objects.len()))
    }
}

/// Reports the object count computed by its required analyzer.
pub struct ReportCount;

impl Analyzer for ReportCount {
    fn name(&self) -> &'static str {
        "report-count"
    }

    fn requires(&self) -> Vec<Arc<dyn Analyzer>> {
        vec![Arc::new(CountObjects)]
    }

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
        let count = pass
            .result_of("count-objects")
            .and_then(|result| result.downcast_ref::<usize>())
            .copied()
            .ok_or_else(|| AnalyzerError::new("count-objects result missing"))?;
        pass.report(Diagnostic::new(here(), format!("objects: {count}")));
        Ok(Box::new(()))
    }
}
