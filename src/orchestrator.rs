//! The two operations every build-step adapter calls
//!
//! [`CacheOrchestrator`] composes a [`DependencyResolver`] with the hash
//! engine, the staleness fast path and the artifact store. Errors the
//! propagation policy marks non-fatal never escape: they disable caching for
//! the step and come back as a `Skipped` status, and the step builds
//! normally.

use crate::config::schema::{CacheConfig, Config};
use crate::error::MinBuildResult;
use crate::fileops;
use crate::fileset::FileSet;
use crate::hash::{CacheKey, HashEngine, PrecomputedHashes};
use crate::resolve::{DependencyResolver, Resolution};
use crate::staleness::Staleness;
use crate::store::{ArtifactStore, CacheLayout, CommitOutcome, MissReason, RestoreOutcome, SourceMap};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Per-step switches taken from the cache configuration
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub project: String,
    pub always_restore: bool,
    pub skip_projects: String,
    pub create_missing_inputs: bool,
    pub show_recompile_reason: bool,
}

impl StepOptions {
    pub fn from_config(project: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            project: project.into(),
            always_restore: config.always_restore,
            skip_projects: config.skip_projects.clone(),
            create_missing_inputs: config.create_missing_inputs,
            show_recompile_reason: config.show_recompile_reason,
        }
    }

    /// The `#`-delimited skip-list fragment matching this project, if any
    pub fn skip_match(&self) -> Option<&str> {
        let project = self.project.to_lowercase();
        self.skip_projects
            .split('#')
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .find(|fragment| project.contains(&fragment.to_lowercase()))
    }

    /// Why caching is disabled for this project, if it is
    pub fn skip_reason(&self) -> Option<String> {
        self.skip_match().map(|fragment| {
            info!("Skipping cache for {} (matches {:?})", self.project, fragment);
            format!("project matches skip list entry {fragment:?}")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "detail")]
pub enum CheckStatus {
    /// Outputs are newer than every input; nothing was hashed
    UpToDate,
    /// Outputs were materialized from the cache
    Restored(Vec<PathBuf>),
    /// Not in the cache; the step must build
    Miss(String),
    /// Caching is disabled for this invocation
    Skipped(String),
}

impl CheckStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpToDate => "up-to-date",
            Self::Restored(_) => "hit",
            Self::Miss(_) => "miss",
            Self::Skipped(_) => "skipped",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of [`CacheOrchestrator::check_and_restore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// Key to commit under after building; absent when nothing was hashed
    pub key: Option<CacheKey>,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl CheckOutcome {
    pub fn new(key: Option<CacheKey>, status: CheckStatus) -> Self {
        Self { key, status }
    }

    /// Whether the step's outputs are in place and the build can be skipped
    pub fn is_hit(&self) -> bool {
        matches!(self.status, CheckStatus::UpToDate | CheckStatus::Restored(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "detail")]
pub enum CommitStatus {
    Committed { entry: PathBuf, files: usize },
    AlreadyPresent(PathBuf),
    Skipped(String),
}

impl From<CommitOutcome> for CommitStatus {
    fn from(outcome: CommitOutcome) -> Self {
        match outcome {
            CommitOutcome::Committed { entry, files } => Self::Committed { entry, files },
            CommitOutcome::AlreadyPresent(entry) => Self::AlreadyPresent(entry),
        }
    }
}

/// Split non-fatal errors off into a skip reason
fn tolerate<T>(result: MinBuildResult<T>) -> MinBuildResult<Result<T, String>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if !e.is_fatal() => {
            info!("Caching disabled: {}", e);
            Ok(Err(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Cache check and commit for one build step
pub struct CacheOrchestrator<R> {
    resolver: R,
    engine: HashEngine,
    store: ArtifactStore,
    options: StepOptions,
}

impl<R: DependencyResolver> CacheOrchestrator<R> {
    /// Wire the engine and store for `resolver`'s cache kind from `config`
    pub fn new(resolver: R, config: &Config, project: &str) -> Self {
        let kind = resolver.kind();
        let layout = CacheLayout::from_config(&config.cache);
        let retry = config.retry.policy();

        let engine = HashEngine::new(config.hash.clone(), retry)
            .with_precomputed(PrecomputedHashes::new(layout.precomputed_dir(kind)))
            .show_hashes(config.cache.show_content_hashes);
        let store = ArtifactStore::new(layout.entries_dir(kind), retry)
            .with_uncacheable(config.cache.uncacheable_outputs.clone())
            .with_branch_name(config.cache.branch_name.clone());

        Self::with_parts(resolver, engine, store, StepOptions::from_config(project, &config.cache))
    }

    pub fn with_parts(resolver: R, engine: HashEngine, store: ArtifactStore, options: StepOptions) -> Self {
        Self {
            resolver,
            engine,
            store,
            options,
        }
    }

    pub fn engine(&self) -> &HashEngine {
        &self.engine
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn report_recompile(&self, staleness: &Staleness) {
        if self.options.show_recompile_reason {
            info!("{}: recompiling, {}", self.options.project, staleness);
        } else {
            debug!("{}: recompiling, {}", self.options.project, staleness);
        }
    }

    /// Resolve and validate the step's inputs
    fn resolve(&self) -> MinBuildResult<Result<Resolution, String>> {
        let resolution = match tolerate(self.resolver.resolve())? {
            Ok(resolution) => resolution,
            Err(reason) => return Ok(Err(reason)),
        };
        fileops::ensure_inputs(&resolution.inputs, self.options.create_missing_inputs)?;
        Ok(Ok(resolution))
    }

    /// Decide whether the step can be skipped, restoring outputs from the
    /// cache when possible.
    ///
    /// The returned key lets the caller commit after building without
    /// rehashing.
    pub fn check_and_restore(&self, build_config: &str) -> MinBuildResult<CheckOutcome> {
        if let Some(reason) = self.options.skip_reason() {
            return Ok(CheckOutcome::new(None, CheckStatus::Skipped(reason)));
        }
        let resolution = match self.resolve()? {
            Ok(resolution) => resolution,
            Err(reason) => return Ok(CheckOutcome::new(None, CheckStatus::Skipped(reason))),
        };

        let staleness = Staleness::check(&resolution.inputs, &resolution.outputs);
        if staleness.is_up_to_date() && !self.options.always_restore {
            debug!("{}: {}", self.options.project, staleness);
            return Ok(CheckOutcome::new(None, CheckStatus::UpToDate));
        }
        self.report_recompile(&staleness);

        let key = self.engine.cache_key(&resolution.inputs, build_config)?;
        info!("{}: cache key {}", self.options.project, key);

        let status = match tolerate(self.store.try_restore(&key, &resolution.outputs))? {
            Ok(RestoreOutcome::Hit { restored }) => CheckStatus::Restored(restored),
            Ok(RestoreOutcome::Miss(reason)) => {
                self.report_miss(&reason);
                CheckStatus::Miss(reason.to_string())
            }
            Err(reason) => CheckStatus::Skipped(reason),
        };
        Ok(CheckOutcome::new(Some(key), status))
    }

    fn report_miss(&self, reason: &MissReason) {
        if self.options.show_recompile_reason {
            info!("{}: cache miss, {}", self.options.project, reason);
        } else {
            debug!("{}: cache miss, {}", self.options.project, reason);
        }
    }

    /// Store `outputs` under a key from an earlier check
    pub fn commit(
        &self,
        key: &CacheKey,
        outputs: &FileSet,
        source_map: Option<&SourceMap>,
    ) -> MinBuildResult<CommitStatus> {
        if let Some(reason) = self.options.skip_reason() {
            return Ok(CommitStatus::Skipped(reason));
        }
        Ok(match tolerate(self.store.commit(key, outputs, source_map))? {
            Ok(outcome) => outcome.into(),
            Err(reason) => CommitStatus::Skipped(reason),
        })
    }

    /// Resolve again and commit, computing the key unless one is given.
    ///
    /// A source map is stored when the resolver knows the workspace root.
    pub fn commit_resolved(&self, build_config: &str, key: Option<CacheKey>) -> MinBuildResult<CommitStatus> {
        if let Some(reason) = self.options.skip_reason() {
            return Ok(CommitStatus::Skipped(reason));
        }
        let resolution = match self.resolve()? {
            Ok(resolution) => resolution,
            Err(reason) => return Ok(CommitStatus::Skipped(reason)),
        };
        let key = match key {
            Some(key) => key,
            None => self.engine.cache_key(&resolution.inputs, build_config)?,
        };
        let source_map = self
            .resolver
            .root_dir()
            .map(|root| SourceMap::new(&resolution.inputs, &resolution.outputs, root));

        self.commit(&key, &resolution.outputs, source_map.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HashConfig;
    use crate::resolve::ListResolver;
    use crate::retry::RetryPolicy;
    use crate::store::COMPLETE_MARKER;
    use filetime::FileTime;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Step {
        dir: TempDir,
        a: PathBuf,
        b: PathBuf,
        out: PathBuf,
    }

    impl Step {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let a = dir.path().join("a.cpp");
            let b = dir.path().join("b.h");
            let out = dir.path().join("bin").join("out.lib");
            fs::write(&a, "X").unwrap();
            fs::write(&b, "Y").unwrap();
            Self { dir, a, b, out }
        }

        fn build(&self, content: &str) {
            fs::create_dir_all(self.out.parent().unwrap()).unwrap();
            fs::write(&self.out, content).unwrap();
        }

        fn set_mtime(path: &Path, secs: i64) {
            filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
        }

        fn orchestrator(&self, options: StepOptions) -> CacheOrchestrator<ListResolver> {
            let inputs = format!("{};{}", self.b.display(), self.a.display());
            let resolver = ListResolver::new(inputs, self.out.display().to_string(), Default::default());
            let retry = RetryPolicy::immediate(1);
            let engine = HashEngine::new(HashConfig::default(), retry);
            let store = ArtifactStore::new(self.dir.path().join("cache").join("list"), retry);
            CacheOrchestrator::with_parts(resolver, engine, store, options)
        }
    }

    fn options() -> StepOptions {
        StepOptions {
            project: "Core.Engine".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn skip_list_matches_case_insensitively() {
        let options = StepOptions {
            project: "Core.Engine".to_string(),
            skip_projects: "#Tools##engine#".to_string(),
            ..Default::default()
        };
        assert_eq!(options.skip_match(), Some("engine"));
        assert_eq!(StepOptions { skip_projects: String::new(), ..options }.skip_match(), None);
    }

    #[test]
    fn up_to_date_outputs_skip_hashing() {
        let step = Step::new();
        step.build("lib");
        Step::set_mtime(&step.a, 1_000);
        Step::set_mtime(&step.b, 1_000);
        Step::set_mtime(&step.out, 2_000);

        let orchestrator = step.orchestrator(options());
        let outcome = orchestrator.check_and_restore("Debug").unwrap();
        assert_eq!(outcome.status, CheckStatus::UpToDate);
        assert!(outcome.is_hit());
        assert_eq!(outcome.key, None);
        assert_eq!(orchestrator.engine().files_hashed(), 0);
    }

    #[test]
    fn always_restore_forces_hashing() {
        let step = Step::new();
        step.build("lib");
        Step::set_mtime(&step.a, 1_000);
        Step::set_mtime(&step.b, 1_000);
        Step::set_mtime(&step.out, 2_000);

        let orchestrator = step.orchestrator(StepOptions {
            always_restore: true,
            ..options()
        });
        let outcome = orchestrator.check_and_restore("Debug").unwrap();
        assert!(matches!(outcome.status, CheckStatus::Miss(_)));
        assert!(outcome.key.is_some());
        assert_eq!(orchestrator.engine().files_hashed(), 2);
    }

    #[test]
    fn commit_then_check_restores_identical_outputs() {
        let step = Step::new();
        let orchestrator = step.orchestrator(options());

        let first = orchestrator.check_and_restore("Debug").unwrap();
        assert!(matches!(first.status, CheckStatus::Miss(_)));
        let k1 = first.key.unwrap();

        step.build("library bytes");
        let outputs = FileSet::ordered(vec![step.out.clone()]);
        let committed = orchestrator.commit(&k1, &outputs, None).unwrap();
        assert!(matches!(committed, CommitStatus::Committed { files: 1, .. }));

        fs::remove_file(&step.out).unwrap();
        let second = orchestrator.check_and_restore("Debug").unwrap();
        assert_eq!(second.key, Some(k1));
        assert!(matches!(second.status, CheckStatus::Restored(ref paths) if paths == &[step.out.clone()]));
        assert_eq!(fs::read_to_string(&step.out).unwrap(), "library bytes");

        fs::write(&step.a, "X changed").unwrap();
        Step::set_mtime(&step.a, 4_000_000_000);
        let third = orchestrator.check_and_restore("Debug").unwrap();
        assert_ne!(third.key, Some(k1));
        assert!(matches!(third.status, CheckStatus::Miss(_)));
    }

    #[test]
    fn configurations_never_share_keys() {
        let step = Step::new();
        let orchestrator = step.orchestrator(options());
        let debug = orchestrator.check_and_restore("Debug").unwrap().key;
        let release = orchestrator.check_and_restore("Release").unwrap().key;
        assert_ne!(debug, release);
    }

    #[test]
    fn incomplete_entry_is_a_miss() {
        let step = Step::new();
        let orchestrator = step.orchestrator(options());
        let key = orchestrator.check_and_restore("Debug").unwrap().key.unwrap();

        step.build("lib");
        let outputs = FileSet::ordered(vec![step.out.clone()]);
        orchestrator.commit(&key, &outputs, None).unwrap();
        fs::remove_file(orchestrator.store().entry_dir(&key).join(COMPLETE_MARKER)).unwrap();

        fs::write(&step.out, "local").unwrap();
        Step::set_mtime(&step.out, 1);
        let outcome = orchestrator.check_and_restore("Debug").unwrap();
        assert!(matches!(outcome.status, CheckStatus::Miss(_)));
        assert_eq!(fs::read_to_string(&step.out).unwrap(), "local");
    }

    #[test]
    fn skipped_project_never_resolves() {
        let step = Step::new();
        let orchestrator = step.orchestrator(StepOptions {
            skip_projects: "engine".to_string(),
            ..options()
        });
        let outcome = orchestrator.check_and_restore("Debug").unwrap();
        assert!(matches!(outcome.status, CheckStatus::Skipped(_)));
        assert_eq!(orchestrator.engine().files_hashed(), 0);
    }

    #[test]
    fn duplicate_output_basenames_are_skipped() {
        let step = Step::new();
        let orchestrator = step.orchestrator(options());
        let key = orchestrator.check_and_restore("Debug").unwrap().key.unwrap();

        let other = step.dir.path().join("other").join("out.lib");
        fs::create_dir_all(other.parent().unwrap()).unwrap();
        fs::write(&other, "b").unwrap();
        step.build("a");

        let outputs = FileSet::ordered(vec![step.out.clone(), other]);
        let status = orchestrator.commit(&key, &outputs, None).unwrap();
        assert!(matches!(status, CommitStatus::Skipped(ref reason) if reason.contains("duplicate")));
        assert!(!orchestrator.store().entry_dir(&key).exists());
    }

    #[test]
    fn missing_input_aborts_the_check() {
        let step = Step::new();
        fs::remove_file(&step.b).unwrap();
        let orchestrator = step.orchestrator(options());
        assert!(orchestrator.check_and_restore("Debug").is_err());

        let tolerant = step.orchestrator(StepOptions {
            create_missing_inputs: true,
            ..options()
        });
        assert!(tolerant.check_and_restore("Debug").is_ok());
        assert!(step.b.is_file());
    }

    #[test]
    fn commit_resolved_computes_the_checked_key() {
        let step = Step::new();
        let orchestrator = step.orchestrator(options());
        let key = orchestrator.check_and_restore("Debug").unwrap().key.unwrap();

        step.build("lib");
        let status = orchestrator.commit_resolved("Debug", None).unwrap();
        match status {
            CommitStatus::Committed { entry, .. } => assert_eq!(entry, orchestrator.store().entry_dir(&key)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
