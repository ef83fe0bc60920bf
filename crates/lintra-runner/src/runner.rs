//! The runner façade: analyzer closure, fact-type registration, package DAG
//! construction, and result assembly.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use lintra_analysis::{register_fact_type, Analyzer};
use lintra_cache::Cache;
use lintra_core::{Config, LINTRA_VERSION};

use crate::error::RunnerError;
use crate::graph::{drive, AcquireMode};
use crate::loader::PackageLoader;
use crate::package::{build_package_graph, PackageRun};
use crate::result::AnalysisResult;
use crate::semaphore::Semaphore;
use crate::stats::{RunnerState, Stats};

/// Construction options for a [`Runner`].
#[derive(Clone, Debug)]
pub struct RunnerOptions {
    /// Base configuration; per-package fragments are merged over it.
    pub config: Config,
    /// Language target minor version. Folded into every cache key and handed
    /// to analyzers before the run starts.
    pub lang_minor: u32,
    /// Tool identity salt separating this tool's cache keys from other tools
    /// (and versions) sharing the cache.
    pub tool_salt: String,
    /// Cache root override; defaults to the per-user cache directory.
    pub cache_root: Option<PathBuf>,
    /// Permit count of the concurrency gate; defaults to the logical CPU
    /// count.
    pub parallelism: Option<usize>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            config: Config::default(),
            lang_minor: 0,
            tool_salt: format!("lintra {LINTRA_VERSION}"),
            cache_root: None,
            parallelism: None,
        }
    }
}

/// Executes analyzers on packages.
///
/// `run` can be called multiple times on the same runner and is safe for
/// concurrent use; all runs share the cache and the concurrency gate.
pub struct Runner {
    config: Config,
    lang_minor: u32,
    tool_salt: String,
    cache: Cache,
    semaphore: Semaphore,
    stats: Stats,
}

impl Runner {
    pub fn new(options: RunnerOptions) -> Result<Self, RunnerError> {
        let cache = match options.cache_root {
            Some(root) => Cache::open(root)?,
            None => Cache::open_default()?,
        };
        let parallelism = options.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Ok(Self {
            config: options.config,
            lang_minor: options.lang_minor,
            tool_salt: options.tool_salt,
            cache,
            semaphore: Semaphore::new(parallelism),
            stats: Stats::new(),
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Number of currently running workers.
    pub fn active_workers(&self) -> usize {
        self.semaphore.in_use()
    }

    /// Maximum number of concurrent workers.
    pub fn total_workers(&self) -> usize {
        self.semaphore.capacity()
    }

    /// Loads the packages matched by `patterns`, runs `analyzers` on them,
    /// and returns one result per package, dependencies included, in
    /// dependency-first order.
    ///
    /// Errors specific to a package are reported on its result; `run` itself
    /// fails only when the package graph cannot be computed.
    pub fn run(
        &self,
        loader: &dyn PackageLoader,
        analyzers: &[Arc<dyn Analyzer>],
        patterns: &[String],
    ) -> Result<Vec<AnalysisResult>, RunnerError> {
        let analyzers = close_over_requires(analyzers)?;
        let lang_version = format!("1.{}", self.lang_minor);
        for analyzer in &analyzers {
            for fact_type in analyzer.fact_types() {
                register_fact_type(fact_type);
            }
            analyzer.set_lang_version(&lang_version);
        }
        let mut names: Vec<&str> = analyzers.iter().map(|analyzer| analyzer.name()).collect();
        names.sort_unstable();
        let analyzer_names = names.join(",");

        self.stats.set_state(RunnerState::LoadPackageGraph);
        let specs = loader.graph(patterns)?;
        self.stats.set_initial_packages(specs.len());

        self.stats.set_state(RunnerState::BuildActionGraph);
        let graph = build_package_graph(&specs);
        let order = graph.topo_order();
        self.stats.set_total_packages(order.len() - 1);

        tracing::debug!(
            target = "lintra.runner",
            initial = specs.len(),
            total = order.len() - 1,
            analyzers = analyzer_names,
            "analyzing packages"
        );

        self.stats.set_state(RunnerState::Processing);
        let run = PackageRun {
            cache: &self.cache,
            semaphore: &self.semaphore,
            stats: &self.stats,
            loader,
            analyzers: &analyzers,
            analyzer_names,
            base_config: &self.config,
            tool_salt: &self.tool_salt,
            lang_minor: self.lang_minor,
        };
        drive(&graph, &order, &self.semaphore, AcquireMode::Blocking, |id| {
            let result = run.exec_package(&graph, id);
            self.stats.finish_package();
            if !graph.node(id).payload().facts_only {
                self.stats.finish_initial_package();
            }
            result
        });

        self.stats.set_state(RunnerState::Finalizing);
        let mut results = Vec::with_capacity(order.len().saturating_sub(1));
        for &id in &order {
            if id == graph.root() {
                continue;
            }
            let node = graph.node(id);
            let data = node.payload();
            let artifacts = data.artifacts.get();
            results.push(AnalysisResult::new(
                Arc::clone(&data.spec),
                data.cfg.get().cloned().unwrap_or_default(),
                node.is_failed(),
                node.take_errors(),
                artifacts.and_then(|a| a.diagnostics.clone()),
                artifacts.and_then(|a| a.directives.clone()),
                artifacts.and_then(|a| a.unused.clone()),
            ));
        }
        Ok(results)
    }
}

/// Closes the analyzer set under `requires`, preserving first-seen order and
/// refusing cycles.
fn close_over_requires(
    analyzers: &[Arc<dyn Analyzer>],
) -> Result<Vec<Arc<dyn Analyzer>>, RunnerError> {
    fn visit(
        analyzer: &Arc<dyn Analyzer>,
        done: &mut HashSet<&'static str>,
        in_progress: &mut HashSet<&'static str>,
        out: &mut Vec<Arc<dyn Analyzer>>,
    ) -> Result<(), RunnerError> {
        let name = analyzer.name();
        if done.contains(name) {
            return Ok(());
        }
        if !in_progress.insert(name) {
            return Err(RunnerError::AnalyzerCycle { analyzer: name });
        }
        out.push(Arc::clone(analyzer));
        for dep in analyzer.requires() {
            visit(&dep, done, in_progress, out)?;
        }
        in_progress.remove(name);
        done.insert(name);
        Ok(())
    }

    let mut done = HashSet::new();
    let mut in_progress = HashSet::new();
    let mut out = Vec::new();
    for analyzer in analyzers {
        visit(analyzer, &mut done, &mut in_progress, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lintra_analysis::{AnalyzerError, AnalyzerResult, Pass};

    struct Named {
        name: &'static str,
        requires: Vec<Arc<dyn Analyzer>>,
    }

    impl Analyzer for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn requires(&self) -> Vec<Arc<dyn Analyzer>> {
            self.requires.clone()
        }

        fn run(&self, _pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
            Ok(Box::new(()))
        }
    }

    #[test]
    fn closure_expands_requires_once() {
        let base: Arc<dyn Analyzer> = Arc::new(Named {
            name: "base",
            requires: Vec::new(),
        });
        let left: Arc<dyn Analyzer> = Arc::new(Named {
            name: "left",
            requires: vec![Arc::clone(&base)],
        });
        let right: Arc<dyn Analyzer> = Arc::new(Named {
            name: "right",
            requires: vec![Arc::clone(&base)],
        });

        let closed = close_over_requires(&[left, right]).unwrap();
        let names: Vec<_> = closed.iter().map(|a| a.name()).collect();
        assert_eq!(names, ["left", "base", "right"]);
    }

    #[test]
    fn cycles_are_refused() {
        // Two analyzers requiring each other by constructing the cycle
        // through a shared name: "a" requires "b" requires "a".
        struct Cyclic {
            name: &'static str,
            other: &'static str,
        }

        impl Analyzer for Cyclic {
            fn name(&self) -> &'static str {
                self.name
            }

            fn requires(&self) -> Vec<Arc<dyn Analyzer>> {
                vec![Arc::new(Cyclic {
                    name: self.other,
                    other: self.name,
                })]
            }

            fn run(&self, _pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError> {
                Ok(Box::new(()))
            }
        }

        let a: Arc<dyn Analyzer> = Arc::new(Cyclic {
            name: "a",
            other: "b",
        });
        let err = close_over_requires(&[a]).unwrap_err();
        assert!(matches!(err, RunnerError::AnalyzerCycle { analyzer: "a" }));
    }
}
