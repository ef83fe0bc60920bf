//! Package actions: cache key composition, cached lookup, and the uncached
//! load-analyze-persist path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use bincode::Options;
use lintra_analysis::directive::{parse_directives, serialize_directive};
use lintra_analysis::Analyzer;
use lintra_cache::{file_digest, ActionId, Cache, KeyHasher};
use lintra_core::codec::bincode_options;
use lintra_core::Config;
use serde::Serialize;

use crate::analyzers::run_analyzers;
use crate::error::RunnerError;
use crate::facts_io::encode_facts;
use crate::graph::{ActionGraph, GraphBuilder, NodeId};
use crate::loader::{PackageLoader, PackageSpec};
use crate::result::Diagnostic;
use crate::semaphore::Semaphore;
use crate::stats::Stats;

/// Cache kind tags, one per artifact a package action produces. "vetx" is
/// the serialized fact stream consumed by dependents.
pub(crate) const KIND_FACTS: &str = "vetx";
pub(crate) const KIND_DIRECTIVES: &str = "directives";
pub(crate) const KIND_DIAGNOSTICS: &str = "diagnostics";
pub(crate) const KIND_UNUSED: &str = "unused";

/// The payload of one package action.
pub(crate) struct PackageData {
    pub spec: Arc<PackageSpec>,
    /// True iff this package is only a transitive dependency of a requested
    /// root: its facts are needed, its diagnostics are not.
    pub facts_only: bool,
    /// The merged configuration; set once by the executing worker.
    pub cfg: OnceLock<Config>,
    /// The action's cache id; set once by the executing worker.
    pub hash: OnceLock<ActionId>,
    /// Cache paths of the action's artifacts; set once on success.
    pub artifacts: OnceLock<Artifacts>,
}

impl PackageData {
    fn new(spec: Arc<PackageSpec>) -> Self {
        Self {
            spec,
            facts_only: true,
            cfg: OnceLock::new(),
            hash: OnceLock::new(),
            artifacts: OnceLock::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Artifacts {
    /// The serialized fact stream; always present on success.
    pub facts: PathBuf,
    pub directives: Option<PathBuf>,
    pub diagnostics: Option<PathBuf>,
    pub unused: Option<PathBuf>,
}

/// Builds the package action graph for the requested roots.
///
/// One action per spec, memoized by package id; dependencies are sorted by
/// id because their order participates in the cache key. Packages whose spec
/// carries errors are failed up front and their imports are not built.
pub(crate) fn build_package_graph(roots: &[Arc<PackageSpec>]) -> ActionGraph<PackageData> {
    let mut builder = GraphBuilder::new();
    let mut memo = HashMap::new();
    let mut root_deps = Vec::new();
    for spec in roots {
        let id = add_spec(&mut builder, &mut memo, spec);
        builder.payload_mut(id).facts_only = false;
        if !root_deps.contains(&id) {
            root_deps.push(id);
        }
    }
    builder.finish(&root_deps)
}

fn add_spec(
    builder: &mut GraphBuilder<PackageData>,
    memo: &mut HashMap<String, NodeId>,
    spec: &Arc<PackageSpec>,
) -> NodeId {
    if let Some(&id) = memo.get(&spec.id) {
        return id;
    }
    let id = builder.add(PackageData::new(Arc::clone(spec)));
    memo.insert(spec.id.clone(), id);

    if !spec.errors.is_empty() {
        for err in &spec.errors {
            builder.push_error(id, RunnerError::Load(err.clone()));
        }
        builder.mark_failed(id);
        // A broken package is never analyzed; its imports don't matter.
        return id;
    }

    for dep in &spec.imports {
        let dep_id = add_spec(builder, memo, dep);
        builder.add_dep(id, dep_id);
        if builder.is_failed(dep_id) {
            builder.mark_failed(id);
        }
    }
    builder.sort_deps_by_key(id, |data| data.spec.id.clone());
    id
}

/// Composes a package action's cache id from everything that must invalidate
/// it. `deps` are `(import path, fact-stream digest)` pairs in the action's
/// sorted dependency order.
pub(crate) fn compose_action_id(
    tool_salt: &str,
    pkg_path: &str,
    cfg: &Config,
    pkg_hash: ActionId,
    analyzer_names: &str,
    lang_minor: u32,
    deps: &[(String, ActionId)],
) -> ActionId {
    let mut hasher = KeyHasher::new(&format!("{tool_salt} {pkg_path}"));
    hasher.line(&format!("cfg {}", cfg.hash_repr()));
    hasher.line(&format!("pkg {}", pkg_hash.to_hex()));
    hasher.line(&format!("analyzers {analyzer_names}"));
    hasher.line(&format!("lang 1.{lang_minor}"));
    for (dep_path, digest) in deps {
        hasher.line(&format!("vetout {dep_path:?} {}", digest.to_hex()));
    }
    hasher.finish()
}

/// Everything shared by the package actions of one `run` invocation.
pub(crate) struct PackageRun<'a> {
    pub cache: &'a Cache,
    pub semaphore: &'a Semaphore,
    pub stats: &'a Stats,
    pub loader: &'a dyn PackageLoader,
    /// The requires-closed analyzer set.
    pub analyzers: &'a [Arc<dyn Analyzer>],
    /// Comma-joined sorted analyzer names; part of every cache key.
    pub analyzer_names: String,
    pub base_config: &'a Config,
    pub tool_salt: &'a str,
    pub lang_minor: u32,
}

impl PackageRun<'_> {
    pub(crate) fn exec_package(
        &self,
        graph: &ActionGraph<PackageData>,
        id: NodeId,
    ) -> Result<(), RunnerError> {
        let node = graph.node(id);
        let data = node.payload();

        // The analyzer set is never filtered by configuration here: all
        // analyzers always run and diagnostics are filtered downstream, so
        // cached entries stay valid across check-selection changes.
        let cfg = Config::merge(self.base_config, &data.spec.config);

        let mut deps = Vec::with_capacity(node.deps().len());
        for &dep_id in node.deps() {
            let dep = graph.node(dep_id).payload();
            let dep_artifacts = dep
                .artifacts
                .get()
                .expect("dependency completed without artifacts");
            // Hash the bytes actually on disk. The dependency may have hit
            // its own cache, in which case its action id says nothing about
            // the stream we are going to ingest.
            deps.push((dep.spec.path.clone(), file_digest(&dep_artifacts.facts)?));
        }
        let hash = compose_action_id(
            self.tool_salt,
            &data.spec.path,
            &cfg,
            data.spec.hash,
            &self.analyzer_names,
            self.lang_minor,
            &deps,
        );
        let _ = data.hash.set(hash);
        let _ = data.cfg.set(cfg);

        if let Some(artifacts) = self.lookup_cached(hash, data.facts_only) {
            tracing::debug!(
                target = "lintra.runner",
                package = data.spec.path,
                action = %hash,
                "cache hit"
            );
            let _ = data.artifacts.set(artifacts);
            return Ok(());
        }
        tracing::debug!(
            target = "lintra.runner",
            package = data.spec.path,
            action = %hash,
            "cache miss; analyzing"
        );
        self.exec_uncached(graph, id)
    }

    /// Returns the action's artifacts iff every required kind is cached.
    fn lookup_cached(&self, hash: ActionId, facts_only: bool) -> Option<Artifacts> {
        let (facts, _) = self.cache.get_file(hash.subkey(KIND_FACTS))?;
        if facts_only {
            return Some(Artifacts {
                facts,
                directives: None,
                diagnostics: None,
                unused: None,
            });
        }
        let (directives, _) = self.cache.get_file(hash.subkey(KIND_DIRECTIVES))?;
        let (diagnostics, _) = self.cache.get_file(hash.subkey(KIND_DIAGNOSTICS))?;
        let (unused, _) = self.cache.get_file(hash.subkey(KIND_UNUSED))?;
        Some(Artifacts {
            facts,
            directives: Some(directives),
            diagnostics: Some(diagnostics),
            unused: Some(unused),
        })
    }

    fn exec_uncached(
        &self,
        graph: &ActionGraph<PackageData>,
        id: NodeId,
    ) -> Result<(), RunnerError> {
        let node = graph.node(id);
        let data = node.payload();
        let hash = *data.hash.get().expect("action executed without a hash");

        let loaded = self.loader.load(&data.spec)?;
        if !loaded.errors.is_empty() {
            // Load/type-check errors belong to the package, not the runner:
            // the action fails, the run continues.
            for err in &loaded.errors {
                node.push_error(RunnerError::Load(err.clone()));
            }
            node.mark_failed();
            return Ok(());
        }

        let directives = parse_directives(&loaded.files);
        let output = run_analyzers(self, graph, id, &loaded)?;
        if node.is_failed() {
            // An analyzer failed; its error is already recorded on the node
            // and nothing gets persisted.
            return Ok(());
        }

        let fact_bytes = encode_facts(&output.object_facts, &output.package_facts)?;
        let facts = self.cache.put_bytes(hash.subkey(KIND_FACTS), &fact_bytes)?;
        let mut artifacts = Artifacts {
            facts,
            directives: None,
            diagnostics: None,
            unused: None,
        };

        if !data.facts_only {
            let serialized: Vec<_> = directives
                .iter()
                .map(|directive| serialize_directive(directive, &loaded.files))
                .collect();
            artifacts.directives = Some(self.write_value(hash, KIND_DIRECTIVES, &serialized)?);

            // Diagnostics are resolved to file/line/column before anything is
            // written; spans never cross the cache boundary.
            let mut diag_bytes = Vec::new();
            for raw in &output.diagnostics {
                let resolved = Diagnostic::resolve(raw, &loaded.files);
                bincode_options().serialize_into(&mut diag_bytes, &resolved)?;
            }
            artifacts.diagnostics =
                Some(self.cache.put_bytes(hash.subkey(KIND_DIAGNOSTICS), &diag_bytes)?);

            artifacts.unused = Some(self.write_value(hash, KIND_UNUSED, &output.unused)?);
        }

        let _ = data.artifacts.set(artifacts);
        Ok(())
    }

    fn write_value<T: Serialize>(
        &self,
        hash: ActionId,
        kind: &str,
        value: &T,
    ) -> Result<PathBuf, RunnerError> {
        let mut bytes = Vec::new();
        bincode_options().serialize_into(&mut bytes, value)?;
        Ok(self.cache.put_bytes(hash.subkey(kind), &bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lintra_cache::ACTION_ID_LEN;
    use lintra_core::Config;

    fn pkg_hash(byte: u8) -> ActionId {
        ActionId::from_bytes([byte; ACTION_ID_LEN])
    }

    fn base_inputs() -> (Config, Vec<(String, ActionId)>) {
        let mut cfg = Config::default();
        cfg.settings.insert("mode".to_string(), "strict".to_string());
        let deps = vec![
            ("dep/one".to_string(), pkg_hash(0x11)),
            ("dep/two".to_string(), pkg_hash(0x22)),
        ];
        (cfg, deps)
    }

    #[test]
    fn action_ids_are_deterministic() {
        let (cfg, deps) = base_inputs();
        let compose = || {
            compose_action_id("lintra 0.1.0", "pkg/a", &cfg, pkg_hash(1), "s1,s2", 42, &deps)
        };
        assert_eq!(compose(), compose());
    }

    #[test]
    fn every_input_except_checks_changes_the_id() {
        let (cfg, deps) = base_inputs();
        let base = compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1,s2", 42, &deps);

        assert_ne!(
            base,
            compose_action_id("other", "pkg/a", &cfg, pkg_hash(1), "s1,s2", 42, &deps)
        );
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/b", &cfg, pkg_hash(1), "s1,s2", 42, &deps)
        );
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &cfg, pkg_hash(2), "s1,s2", 42, &deps)
        );
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1,s2,s3", 42, &deps)
        );
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1,s2", 43, &deps)
        );

        let mut other_settings = cfg.clone();
        other_settings
            .settings
            .insert("mode".to_string(), "lax".to_string());
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &other_settings, pkg_hash(1), "s1,s2", 42, &deps)
        );

        let mut reordered = deps.clone();
        reordered.swap(0, 1);
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1,s2", 42, &reordered)
        );
    }

    #[test]
    fn check_selection_does_not_change_the_id() {
        let (mut cfg, deps) = base_inputs();
        let with_all = compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1", 1, &deps);
        cfg.checks = vec!["ST1000".to_string(), "SA4006".to_string()];
        let with_some = compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1", 1, &deps);
        assert_eq!(with_all, with_some);
    }

    #[test]
    fn dep_digest_changes_the_id() {
        let (cfg, mut deps) = base_inputs();
        let base = compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1", 1, &deps);
        deps[0].1 = pkg_hash(0x99);
        assert_ne!(
            base,
            compose_action_id("salt", "pkg/a", &cfg, pkg_hash(1), "s1", 1, &deps)
        );
    }
}
