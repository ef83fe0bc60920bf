//! Analyzer actions: the per-package analyzer DAG and the pass handed to
//! each analyzer.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use lintra_analysis::unused::{serialize_unused, SerializedUnusedResult, UNUSED_ANALYZER_NAME};
use lintra_analysis::{
    Analyzer, AnalyzerResult, Diagnostic, Fact, ObjectFactView, PackageFactView, Pass,
};
use lintra_core::sem::{Object, Package};
use lintra_core::FileSet;

use crate::error::RunnerError;
use crate::facts_io::{
    ingest_facts, ObjKey, ObjectFactKey, ObjectFactMap, PackageFactKey, PackageFactMap, PkgKey,
};
use crate::graph::{drive, AcquireMode, ActionGraph, GraphBuilder, NodeId};
use crate::loader::LoadedPackage;
use crate::package::{PackageData, PackageRun};
use crate::stats::Stats;

/// The payload of one analyzer action. Discarded when the enclosing package
/// action completes, so holding real results here is fine.
pub(crate) struct AnalyzerData {
    analyzer: Arc<dyn Analyzer>,
    result: OnceLock<AnalyzerResult>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    object_facts: Mutex<ObjectFactMap>,
    package_facts: Mutex<PackageFactMap>,
}

impl AnalyzerData {
    fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            result: OnceLock::new(),
            diagnostics: Mutex::new(Vec::new()),
            object_facts: Mutex::new(ObjectFactMap::new()),
            package_facts: Mutex::new(PackageFactMap::new()),
        }
    }
}

/// Everything one package's analyzer run produced.
#[derive(Default)]
pub(crate) struct AnalysisOutput {
    pub object_facts: ObjectFactMap,
    pub package_facts: PackageFactMap,
    pub diagnostics: Vec<Diagnostic>,
    pub unused: SerializedUnusedResult,
}

/// Runs the analyzer DAG for one loaded package.
///
/// Analyzer failures are recorded on the package action (which is then
/// marked failed); only infrastructure problems (unreadable dependency
/// facts, a cyclic `requires` relation) surface as errors.
pub(crate) fn run_analyzers(
    run: &PackageRun<'_>,
    pkg_graph: &ActionGraph<PackageData>,
    pkg_id: NodeId,
    loaded: &LoadedPackage,
) -> Result<AnalysisOutput, RunnerError> {
    let pkg_node = pkg_graph.node(pkg_id);
    let facts_only = pkg_node.payload().facts_only;

    // Facts of all dependency packages, re-read from disk. Nothing keeps
    // them in memory between packages: an arbitrary amount of time may pass
    // between analyzing a dependency and its dependents.
    let mut dep_object_facts = ObjectFactMap::new();
    let mut dep_package_facts = PackageFactMap::new();
    for &dep_id in pkg_node.deps() {
        let dep = pkg_graph.node(dep_id).payload();
        let dep_artifacts = dep
            .artifacts
            .get()
            .expect("dependency completed without artifacts");
        ingest_facts(
            &dep_artifacts.facts,
            &loaded.types,
            &mut dep_object_facts,
            &mut dep_package_facts,
        )?;
    }

    // Build the analyzer graph. For dependency-only packages, analyzers
    // that cannot produce facts are dropped: their diagnostics would be
    // discarded anyway. Their requirements are still added transitively.
    let mut builder = GraphBuilder::new();
    let mut memo = HashMap::new();
    let mut in_progress = HashSet::new();
    let mut top = Vec::new();
    for analyzer in run.analyzers {
        if facts_only && analyzer.fact_types().is_empty() {
            continue;
        }
        let id = add_analyzer(&mut builder, &mut memo, &mut in_progress, analyzer)?;
        top.push(id);
    }
    let graph = builder.finish(&top);
    let order = graph.topo_order();

    let ctx = AnalyzerRun {
        loaded,
        facts_only,
        dep_object_facts: &dep_object_facts,
        dep_package_facts: &dep_package_facts,
        stats: run.stats,
    };
    // Non-blocking acquisition: when the gate is exhausted, the analyzer
    // runs inline under the package's own permit.
    drive(&graph, &order, run.semaphore, AcquireMode::NonBlocking, |id| {
        exec_analyzer(&ctx, &graph, id)
    });

    let mut failed = false;
    for &id in &order {
        if id == graph.root() {
            continue;
        }
        let node = graph.node(id);
        if node.is_failed() {
            failed = true;
            for err in node.take_errors() {
                pkg_node.push_error(err);
            }
        }
    }
    if failed {
        pkg_node.mark_failed();
        return Ok(AnalysisOutput::default());
    }

    let mut output = AnalysisOutput {
        object_facts: dep_object_facts,
        package_facts: dep_package_facts,
        ..AnalysisOutput::default()
    };
    for &id in &order {
        if id == graph.root() {
            continue;
        }
        let data = graph.node(id).payload();

        if data.analyzer.name() == UNUSED_ANALYZER_NAME {
            // The unused analysis produces a structured result serialized on
            // its own; see lintra_analysis::unused for why it is special.
            let result = data
                .result
                .get()
                .expect("successful analyzer without a result");
            let typed = result.downcast_ref().ok_or(RunnerError::UnexpectedResultType {
                analyzer: UNUSED_ANALYZER_NAME,
            })?;
            output.unused = serialize_unused(typed, &loaded.files);
        }

        // Merge exports into the dependency maps: this is what gets
        // persisted and what downstream packages will see.
        output.object_facts.extend(
            data.object_facts
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .drain(),
        );
        output.package_facts.extend(
            data.package_facts
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .drain(),
        );
        output.diagnostics.append(
            &mut data
                .diagnostics
                .lock()
                .unwrap_or_else(|err| err.into_inner()),
        );
    }
    Ok(output)
}

fn add_analyzer(
    builder: &mut GraphBuilder<AnalyzerData>,
    memo: &mut HashMap<&'static str, NodeId>,
    in_progress: &mut HashSet<&'static str>,
    analyzer: &Arc<dyn Analyzer>,
) -> Result<NodeId, RunnerError> {
    let name = analyzer.name();
    if let Some(&id) = memo.get(name) {
        return Ok(id);
    }
    if !in_progress.insert(name) {
        return Err(RunnerError::AnalyzerCycle { analyzer: name });
    }
    let mut dep_ids = Vec::new();
    for dep in analyzer.requires() {
        dep_ids.push(add_analyzer(builder, memo, in_progress, &dep)?);
    }
    in_progress.remove(name);

    let id = builder.add(AnalyzerData::new(Arc::clone(analyzer)));
    memo.insert(name, id);
    for dep_id in dep_ids {
        builder.add_dep(id, dep_id);
    }
    builder.sort_deps_by_key(id, |data| data.analyzer.name());
    Ok(id)
}

struct AnalyzerRun<'a> {
    loaded: &'a LoadedPackage,
    facts_only: bool,
    dep_object_facts: &'a ObjectFactMap,
    dep_package_facts: &'a PackageFactMap,
    stats: &'a Stats,
}

fn exec_analyzer(
    ctx: &AnalyzerRun<'_>,
    graph: &ActionGraph<AnalyzerData>,
    id: NodeId,
) -> Result<(), RunnerError> {
    let node = graph.node(id);
    let data = node.payload();

    // Results of direct dependencies, by analyzer name.
    let mut dep_results = HashMap::new();
    for &dep_id in node.deps() {
        let dep = graph.node(dep_id).payload();
        if let Some(result) = dep.result.get() {
            dep_results.insert(dep.analyzer.name(), &**result as &(dyn Any + Send + Sync));
        }
    }

    let mut pass = AnalyzerPass {
        analyzer_name: data.analyzer.name(),
        declared_fact_types: data
            .analyzer
            .fact_types()
            .iter()
            .map(|fact_type| fact_type.name)
            .collect(),
        loaded: ctx.loaded,
        facts_only: ctx.facts_only,
        dep_results,
        dep_object_facts: ctx.dep_object_facts,
        dep_package_facts: ctx.dep_package_facts,
        diagnostics: Vec::new(),
        object_facts: ObjectFactMap::new(),
        package_facts: PackageFactMap::new(),
    };

    let started = Instant::now();
    let result = data.analyzer.run(&mut pass);
    ctx.stats.measure_analyzer(data.analyzer.name(), started.elapsed());

    let result = result.map_err(|err| RunnerError::Analyzer {
        analyzer: data.analyzer.name(),
        source: err,
    })?;

    let _ = data.result.set(result);
    *data
        .diagnostics
        .lock()
        .unwrap_or_else(|err| err.into_inner()) = pass.diagnostics;
    *data
        .object_facts
        .lock()
        .unwrap_or_else(|err| err.into_inner()) = pass.object_facts;
    *data
        .package_facts
        .lock()
        .unwrap_or_else(|err| err.into_inner()) = pass.package_facts;
    Ok(())
}

/// The pass handed to one analyzer for one package.
struct AnalyzerPass<'a> {
    analyzer_name: &'static str,
    declared_fact_types: HashSet<&'static str>,
    loaded: &'a LoadedPackage,
    facts_only: bool,
    dep_results: HashMap<&'static str, &'a (dyn Any + Send + Sync)>,
    dep_object_facts: &'a ObjectFactMap,
    dep_package_facts: &'a PackageFactMap,
    diagnostics: Vec<Diagnostic>,
    object_facts: ObjectFactMap,
    package_facts: PackageFactMap,
}

impl Pass for AnalyzerPass<'_> {
    fn package(&self) -> &Arc<Package> {
        &self.loaded.types
    }

    fn files(&self) -> &FileSet {
        &self.loaded.files
    }

    fn report(&mut self, mut diagnostic: Diagnostic) {
        if self.facts_only {
            // Dependency-only analysis: diagnostics are discarded.
            return;
        }
        if diagnostic.category.is_empty() {
            diagnostic.category = self.analyzer_name.to_string();
        }
        self.diagnostics.push(diagnostic);
    }

    fn result_of(&self, analyzer: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.dep_results.get(analyzer).copied()
    }

    fn import_object_fact(&self, object: &Arc<Object>, type_name: &str) -> Option<&dyn Fact> {
        let key = ObjectFactKey {
            object: ObjKey(Arc::clone(object)),
            fact_type: type_name.to_string(),
        };
        if let Some(fact) = self.object_facts.get(&key) {
            return Some(&**fact);
        }
        self.dep_object_facts.get(&key).map(|fact| &**fact)
    }

    fn import_package_fact(&self, package: &Arc<Package>, type_name: &str) -> Option<&dyn Fact> {
        let key = PackageFactKey {
            package: PkgKey(Arc::clone(package)),
            fact_type: type_name.to_string(),
        };
        if let Some(fact) = self.package_facts.get(&key) {
            return Some(&**fact);
        }
        self.dep_package_facts.get(&key).map(|fact| &**fact)
    }

    fn export_object_fact(&mut self, object: &Arc<Object>, fact: Box<dyn Fact>) {
        self.object_facts.insert(
            ObjectFactKey {
                object: ObjKey(Arc::clone(object)),
                fact_type: fact.type_name().to_string(),
            },
            fact,
        );
    }

    fn export_package_fact(&mut self, fact: Box<dyn Fact>) {
        // Facts may only be exported about the package under analysis.
        self.package_facts.insert(
            PackageFactKey {
                package: PkgKey(Arc::clone(&self.loaded.types)),
                fact_type: fact.type_name().to_string(),
            },
            fact,
        );
    }

    fn all_object_facts(&self) -> Vec<ObjectFactView<'_>> {
        let mut out = Vec::new();
        for (key, fact) in self.dep_object_facts.iter().chain(self.object_facts.iter()) {
            if self.declared_fact_types.contains(key.fact_type.as_str()) {
                out.push(ObjectFactView {
                    object: &key.object.0,
                    fact: &**fact,
                });
            }
        }
        out
    }

    fn all_package_facts(&self) -> Vec<PackageFactView<'_>> {
        self.dep_package_facts
            .iter()
            .chain(self.package_facts.iter())
            .map(|(key, fact)| PackageFactView {
                package: &key.package.0,
                fact: &**fact,
            })
            .collect()
    }
}
